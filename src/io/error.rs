//! Custom error types for the storage module.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum IoError {
    #[error("File size of {found} bytes exceeds the maximum allowed size of {limit} bytes.")]
    FileTooLarge { limit: u64, found: u64 },

    #[error("File reference '{0}' was not found in storage.")]
    NotFound(String),

    #[error("File reference '{0}' escapes the storage root.")]
    InvalidReference(String),

    #[error("An underlying I/O error occurred: {0}")]
    StdIo(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, IoError>;
