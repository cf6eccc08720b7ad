use crate::settlement::SettlementError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RedemptionError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Delegation cannot be serialized: {0}")]
    Delegation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{entity} '{id}' not found")]
    NotFound { entity: &'static str, id: String },

    #[error("Settlement failed: {0}")]
    Settlement(#[from] SettlementError),

    /// Bookkeeping failed after funds already moved. Unwinds the batch.
    #[error("CRITICAL: subscription {subscription_id}: {reason}")]
    Critical { subscription_id: String, reason: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl RedemptionError {
    pub fn critical(subscription_id: &str, reason: impl Into<String>) -> Self {
        Self::Critical {
            subscription_id: subscription_id.to_string(),
            reason: reason.into(),
        }
    }

    pub fn is_critical(&self) -> bool {
        matches!(self, Self::Critical { .. })
    }
}

pub type RedemptionResult<T> = Result<T, RedemptionError>;
