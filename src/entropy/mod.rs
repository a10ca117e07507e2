//! Shannon entropy over byte buffers.
//!
//! Used by `File_Info` for the whole target and by `PE_Info` per section;
//! high values (>7.2) usually indicate packed or encrypted content.

/// Entropy above which a region is flagged as likely packed or encrypted.
pub const HIGH_ENTROPY_THRESHOLD: f64 = 7.2;

/// Calculates the Shannon entropy of a byte slice.
///
/// Returns a value between 0.0 and 8.0, where:
/// - 0.0 represents no randomness (e.g., all bytes are the same)
/// - 8.0 represents maximum randomness (uniform distribution)
#[inline]
pub fn shannon_entropy(data: &[u8]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }

    let mut histogram = [0usize; 256];
    for &byte in data {
        histogram[byte as usize] += 1;
    }

    let len = data.len() as f64;
    let mut entropy = 0.0;

    for &count in &histogram {
        if count == 0 {
            continue;
        }
        let p = (count as f64) / len;
        entropy -= p * p.log2();
    }

    entropy
}

/// Entropy rounded to three decimals, for stable report payloads.
pub fn rounded_entropy(data: &[u8]) -> f64 {
    (shannon_entropy(data) * 1000.0).round() / 1000.0
}
