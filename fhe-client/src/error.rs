use thiserror::Error;

/// Error type for the FHE client
#[derive(Debug, Error)]
pub enum FheClientError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Encryption backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Transport error: {0}")]
    Transport(String),

    /// Well-formed error reply from the coprocessor, surfaced verbatim.
    #[error("Coprocessor error {code}: {message}")]
    Remote { code: i64, message: String },

    #[error("Decrypt polling timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },

    /// A signature we just produced does not recover to our own address.
    /// Always a local bug, never caused by remote data.
    #[error("Signature consistency fault: {0}")]
    SignatureConsistency(String),

    #[error("Invalid handle: {0}")]
    InvalidHandle(String),

    #[error("Signer error: {0}")]
    Signer(#[from] alloy_signer::Error),

    #[error("Hex decoding error: {0}")]
    Hex(#[from] hex::FromHexError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for the FHE client
pub type Result<T> = std::result::Result<T, FheClientError>;
