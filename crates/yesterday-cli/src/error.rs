use thiserror::Error;
use yesterday_core::{CacheError, ClientError, DateError};
use yesterday_store::StoreError;

/// CLI-level error categories mapped to exit codes.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Date(#[from] DateError),

    #[error("{}", .0.user_message())]
    Client(#[from] ClientError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Date(_) => 2,
            Self::Client(ClientError::RateLimited { .. }) => 6,
            Self::Client(ClientError::ServiceUnavailable) => 7,
            Self::Client(_) => 3,
            Self::Serialization(_) => 4,
            Self::Cache(_) | Self::Store(_) | Self::Io(_) => 10,
        }
    }
}
