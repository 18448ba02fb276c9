use thiserror::Error;

#[derive(Debug, Error)]
pub enum SdkError {
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    #[error("store error: {0}")]
    Store(#[from] dax_store::StoreError),

    #[error("dictionary error: {0}")]
    Dict(#[from] dax_dict::DictError),

    #[error("config error: {0}")]
    Config(#[from] dax_config::ConfigError),
}

impl SdkError {
    /// Whether the underlying condition is "dataset absent".
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Store(e) if e.is_not_found())
    }
}

pub type SdkResult<T> = Result<T, SdkError>;
