//! Issuance policy gate (spec §4.8): before appending a verification-granted
//! event, replay the asset's history inside a short-lived read transaction
//! and refuse issuance if the derived status is FROZEN or REVOKED.

use sqlx::PgPool;

use crate::error::{LedgerError, Result};
use crate::model::VerificationStatus;
use crate::reducer::reduce;
use crate::registry::EventClassifier;
use crate::store;

pub struct IssuancePolicy<'a> {
    pool: &'a PgPool,
}

impl<'a> IssuancePolicy<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Returns `Ok(())` if `asset_id` may accept a new verification-granted
    /// entry, `Err(AssetFrozen)` / `Err(AssetRevoked)` otherwise. Runs in its
    /// own read transaction, separate from `LedgerService::ingest` — freeze
    /// and revoke are themselves committed entries subject to the same
    /// chain serialization, so this separation preserves correctness.
    pub async fn check(&self, asset_id: &str, classifier: &dyn EventClassifier) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let events = store::entries_for_asset_ordered_tx(&mut tx, asset_id).await?;
        tx.commit().await?;

        let state = reduce(asset_id, &events, classifier);
        match state.status {
            VerificationStatus::Frozen => Err(LedgerError::AssetFrozen),
            VerificationStatus::Revoked => Err(LedgerError::AssetRevoked),
            _ => Ok(()),
        }
    }
}
