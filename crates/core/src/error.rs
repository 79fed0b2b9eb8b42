use thiserror::Error;

pub type CrmResult<T> = Result<T, CrmError>;

#[derive(Error, Debug)]
pub enum CrmError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Invalid state transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Step execution error: {0}")]
    Step(String),

    #[error("Webhook delivery error: {0}")]
    Webhook(String),

    #[error("Timed out after {0} ms")]
    Timeout(u64),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl CrmError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        CrmError::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Whether the error was caused by the caller rather than the service.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            CrmError::Validation(_)
                | CrmError::NotFound { .. }
                | CrmError::InvalidTransition { .. }
                | CrmError::Unauthorized(_)
        )
    }
}
