//! Read-model rebuild (spec §4.6): truncate the derived cache and
//! repopulate it by full replay, partitioned by asset.

use std::collections::BTreeMap;

use sqlx::PgPool;
use tracing::info;

use crate::error::Result;
use crate::model::LedgerEntry;
use crate::reducer::reduce;
use crate::registry::EventClassifier;
use crate::store;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RebuildReport {
    pub ok: bool,
    pub rebuilt_assets: usize,
}

pub struct RebuildService<'a> {
    pool: &'a PgPool,
}

impl<'a> RebuildService<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Truncate `derived_verification_state` and repopulate it from a full
    /// replay of `ledger_entries`, ordered by `sequence_number` and
    /// partitioned by `asset_id`. Pure function of the immutable log:
    /// repeated runs produce byte-identical rows.
    pub async fn rebuild(&self, classifier: &dyn EventClassifier) -> Result<RebuildReport> {
        store::truncate_derived_state(self.pool).await?;

        let all = store::all_entries_ordered(self.pool).await?;
        let mut by_asset: BTreeMap<String, Vec<LedgerEntry>> = BTreeMap::new();
        for entry in all {
            by_asset.entry(entry.subject.asset_id.clone()).or_default().push(entry);
        }

        let mut rebuilt_assets = 0usize;
        for (asset_id, events) in &by_asset {
            let state = reduce(asset_id, events, classifier);
            store::upsert_derived_state(self.pool, &state).await?;
            rebuilt_assets += 1;
        }

        info!(event = "rebuild_complete", rebuilt_assets, "derived-state rebuild finished");

        Ok(RebuildReport { ok: true, rebuilt_assets })
    }
}
