//! Billing errors

use bizreport_shared::StoreError;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum BillingError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Team not found: {0}")]
    TeamNotFound(Uuid),

    #[error("Failed to increment usage for team {team_id}: {reason}")]
    IncrementFailed { team_id: Uuid, reason: String },

    #[error("Invalid tier configuration: {0}")]
    InvalidTier(String),
}

impl From<StoreError> for BillingError {
    fn from(e: StoreError) -> Self {
        BillingError::Database(e.to_string())
    }
}

pub type BillingResult<T> = Result<T, BillingError>;
