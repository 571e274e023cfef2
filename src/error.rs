use thiserror::Error;

/// Every failure a provisioning invocation can run into. The `Display` text is
/// what ends up in the `Reason` field of a FAILED callback.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProvisionError {
    #[error("invalid request: {0}")]
    Validation(String),
    #[error("key generation failed: {0}")]
    Generation(String),
    #[error("{0}")]
    StoreConflict(String),
    #[error("{0}")]
    StoreUnavailable(String),
    #[error("callback delivery failed: {0}")]
    Delivery(String),
}

impl ProvisionError {
    pub fn validation(message: impl Into<String>) -> Self {
        ProvisionError::Validation(message.into())
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        ProvisionError::StoreUnavailable(message.into())
    }

    pub fn is_delivery(&self) -> bool {
        matches!(self, ProvisionError::Delivery(_))
    }
}

impl From<reqwest::Error> for ProvisionError {
    fn from(error: reqwest::Error) -> Self {
        ProvisionError::StoreUnavailable(error.to_string())
    }
}

pub type ProvisionResult<T> = Result<T, ProvisionError>;
