//! Centralized module for content digests.
//!
//! MD5 is the job-wide content identifier: it is computed once by the target
//! resolver and reused by every analyzer (remote lookups key on it). The
//! stronger digests are reported by `File_Info`.

use sha2::{Digest, Sha256, Sha512};

/// Computes the 128-bit MD5 digest of the given data as a lowercase hex string.
pub fn md5_digest(data: &[u8]) -> String {
    format!("{:032x}", md5::compute(data))
}

/// Computes the SHA-256 digest of the given data and returns it as a hex string.
pub fn sha256_digest(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Computes the SHA-512 digest of the given data and returns it as a hex string.
pub fn sha512_digest(data: &[u8]) -> String {
    let mut hasher = Sha512::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Computes the BLAKE3 digest of the given data and returns it as a hex string.
pub fn blake3_digest(data: &[u8]) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(data);
    hasher.finalize().to_hex().to_string()
}

/// Returns true when `value` looks like a hex digest of `hex_len` characters.
pub fn is_hex_digest(value: &str, hex_len: usize) -> bool {
    value.len() == hex_len && value.bytes().all(|b| b.is_ascii_hexdigit())
}
