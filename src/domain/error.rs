use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed or missing input. Rejected before any side effect.
    #[error("validation: {0}")]
    Validation(String),

    /// Price mismatch, already-paid guard, concurrent state change.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// Restaurant mismatch or unowned order/refund.
    #[error("authorization: {0}")]
    Authorization(String),

    /// Auth or HTTP failure talking to a card gateway.
    #[error("gateway: {0}")]
    Gateway(String),

    #[error("webhook signature: {0}")]
    WebhookSignature(String),

    #[error("database: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("crypto: {0}")]
    Crypto(String),
}

impl EngineError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }
}
