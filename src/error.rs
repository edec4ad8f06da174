//! Error taxonomy for the ingestion path, the reducer, and configuration.

use crate::model::InvalidReason;

pub type Result<T> = std::result::Result<T, LedgerError>;

#[derive(thiserror::Error, Debug)]
pub enum LedgerError {
    #[error("event_type '{0}' is not registered")]
    UnrecognizedEventType(String),

    #[error("schema_version '{found}' is not supported (expected '{expected}')")]
    UnsupportedSchemaVersion { found: String, expected: String },

    #[error("validation failed: {0}")]
    ValidationFailed(String),

    #[error("asset is frozen and cannot accept new verification grants")]
    AssetFrozen,

    #[error("asset is revoked and cannot accept new verification grants")]
    AssetRevoked,

    #[error("ledger write failed: {0}")]
    LedgerWriteFailed(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("database error")]
    Database(#[from] sqlx::Error),

    #[error("database migration error")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl LedgerError {
    /// The stable error code surfaced in the user-visible `{error: {code, ...}}` envelope.
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::UnrecognizedEventType(_) => "UNRECOGNIZED_LEDGER_EVENT_TYPE",
            LedgerError::UnsupportedSchemaVersion { .. } => "UNSUPPORTED_SCHEMA_VERSION",
            LedgerError::ValidationFailed(_) => "VALIDATION_FAILED",
            LedgerError::AssetFrozen => "ASSET_FROZEN",
            LedgerError::AssetRevoked => "ASSET_REVOKED",
            LedgerError::LedgerWriteFailed(_) => "LEDGER_WRITE_FAILED",
            LedgerError::Database(_) | LedgerError::Migration(_) => "LEDGER_WRITE_FAILED",
            LedgerError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

/// A proof-validation outcome is never an error — it is a tagged result.
/// This mirrors `InvalidReason` so callers can match on a single type.
impl From<InvalidReason> for &'static str {
    fn from(reason: InvalidReason) -> Self {
        match reason {
            InvalidReason::ProofExpired => "PROOF_EXPIRED",
            InvalidReason::ProofRevoked => "PROOF_REVOKED",
            InvalidReason::NotActiveGrant => "NOT_ACTIVE_GRANT",
            InvalidReason::Invalidated => "INVALIDATED",
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("missing required environment variable '{0}'")]
    Missing(&'static str),

    #[error("invalid value for '{name}': {reason}")]
    Invalid { name: &'static str, reason: String },
}
