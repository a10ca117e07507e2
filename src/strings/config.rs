//! Configuration for bounded string extraction.

use serde::{Deserialize, Serialize};

/// Chunk size between cancellation checks (1 MiB).
pub const DEFAULT_CHUNK_SIZE: usize = 1_048_576;

/// Extraction limits; also the parameter bag of `Strings_Info_Classic`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StringsConfig {
    /// Minimum length for a string candidate (in characters)
    pub min_length: usize,
    /// Maximum number of strings kept in the report
    pub max_number_of_strings: usize,
    /// Longer strings are truncated to this many characters
    pub max_characters_for_string: usize,
    /// Whether to run IOC classification over the kept strings
    pub classify: bool,
    /// Bytes scanned between cancellation checks
    pub chunk_size: usize,
}

impl Default for StringsConfig {
    fn default() -> Self {
        Self {
            min_length: 4,
            max_number_of_strings: 500,
            max_characters_for_string: 1000,
            classify: true,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl StringsConfig {
    pub(crate) fn effective_chunk_size(&self) -> usize {
        self.chunk_size.max(2)
    }

    pub(crate) fn effective_min_length(&self) -> usize {
        self.min_length.max(1)
    }
}
