//! Error definitions for the privacy primitives.
use thiserror::Error;

/// Errors raised by commitment, key and encryption operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PrivacyError {
    /// Bytes do not decode to a point of the prime-order subgroup
    #[error("Invalid curve point encoding")]
    InvalidPoint,

    /// Hash-to-curve exhausted its attempts
    #[error("Failed to derive generator for {0}")]
    GeneratorDerivation(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Memo longer than an output can carry
    #[error("Memo of {len} bytes exceeds {max}")]
    MemoTooLong { len: usize, max: usize },

    /// Asset encryption failed
    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    /// Key bytes are not usable
    #[error("Invalid key material: {0}")]
    InvalidKey(String),
}

/// Result type for privacy operations
pub type Result<T> = std::result::Result<T, PrivacyError>;
