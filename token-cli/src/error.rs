use fhe_client::FheClientError;
use thiserror::Error;

/// Error type for the token CLI
#[derive(Debug, Error)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("token '{token}' does not support {operation} ({capability} capability missing)")]
    Unsupported {
        token: String,
        operation: String,
        capability: String,
    },

    #[error("Contract error: {0}")]
    Contract(String),

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Unit conversion error: {0}")]
    Units(#[from] alloy::primitives::utils::UnitsError),

    #[error(transparent)]
    Fhe(#[from] FheClientError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<alloy::contract::Error> for CliError {
    fn from(e: alloy::contract::Error) -> Self {
        CliError::Contract(e.to_string())
    }
}

impl From<alloy::providers::PendingTransactionError> for CliError {
    fn from(e: alloy::providers::PendingTransactionError) -> Self {
        CliError::Contract(e.to_string())
    }
}

impl<T> From<alloy::transports::RpcError<T>> for CliError
where
    T: std::fmt::Display,
{
    fn from(e: alloy::transports::RpcError<T>) -> Self {
        CliError::Rpc(e.to_string())
    }
}

/// Result type for the token CLI
pub type Result<T> = std::result::Result<T, CliError>;
