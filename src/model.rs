//! Data model (spec §3): `LedgerEntry`, `DerivedVerificationState`, `ProofView`,
//! and the producer-facing ingestion envelope.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Structured reference to the thing an event concerns.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Subject {
    pub asset_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anchor_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shipment_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claim_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub envelope_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
}

/// A single immutable, committed row on the ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub sequence_number: i64,
    pub event_id: String,
    pub source: String,
    pub producer_version: String,
    pub event_type: String,
    #[serde(default)]
    pub correlation_id: Option<String>,
    #[serde(default)]
    pub actor_id: Option<String>,
    pub subject: Subject,
    pub payload: Value,
    pub payload_hash: String,
    #[serde(default)]
    pub previous_hash: Option<String>,
    pub entry_hash: String,
    pub signatures: BTreeMap<String, String>,
    #[serde(default)]
    pub signature_key_id: Option<String>,
    #[serde(default)]
    pub idempotency_key: Option<String>,
    #[serde(default)]
    pub canonical_hash_hex: Option<String>,
    pub schema_version: String,
    pub occurred_at: DateTime<Utc>,
    pub committed_at: DateTime<Utc>,
    pub ruleset_version: String,
    #[serde(default)]
    pub asset_state_hash: Option<String>,
    #[serde(default)]
    pub evidence_set_hash: Option<String>,
    #[serde(default)]
    pub verification_tier: Option<String>,
}

/// Per-asset derived verification status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerificationStatus {
    None,
    VerifiedActive,
    Invalidated,
    Frozen,
    Revoked,
}

/// Observability / causal reason attached to the current derived status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReasonCode {
    VerificationGranted,
    StateHashMismatch,
    EvidenceFrozen,
    VerificationRevoked,
    NoEvents,
}

/// Per-asset, rebuildable derived-state cache row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DerivedVerificationState {
    pub asset_id: String,
    pub status: VerificationStatus,
    pub reason_code: ReasonCode,
    pub last_verification_event_id: Option<String>,
    pub asset_state_hash_current: Option<String>,
    pub evidence_set_hash_current: Option<String>,
}

impl DerivedVerificationState {
    /// The state of an asset with no committed events.
    pub fn empty(asset_id: impl Into<String>) -> Self {
        Self {
            asset_id: asset_id.into(),
            status: VerificationStatus::None,
            reason_code: ReasonCode::NoEvents,
            last_verification_event_id: None,
            asset_state_hash_current: None,
            evidence_set_hash_current: None,
        }
    }
}

/// Snapshot-bound, TTL- and revocation-gated attestation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProofView {
    pub proof_id: String,
    pub asset_id: String,
    pub verification_event_id: String,
    pub snapshot_hash: String,
    pub asset_state_hash: String,
    pub evidence_set_hash: String,
    pub ruleset_version: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub revoked_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub scope_json: Option<Value>,
    #[serde(default)]
    pub created_by: Option<String>,
}

/// Why a proof view failed validation. Never an error — a tagged outcome.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvalidReason {
    ProofExpired,
    ProofRevoked,
    NotActiveGrant,
    Invalidated,
}

/// Pure result of `validate(proof, now, derived)`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValidationOutcome {
    pub ok: bool,
    pub reason: Option<InvalidReason>,
}

impl ValidationOutcome {
    pub fn ok() -> Self {
        Self { ok: true, reason: None }
    }

    pub fn invalid(reason: InvalidReason) -> Self {
        Self { ok: false, reason: Some(reason) }
    }
}

/// Producer-facing ingestion input envelope (spec §4.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestInput {
    pub event_id: String,
    pub source: String,
    pub producer_version: String,
    pub schema_version: String,
    pub event_type: String,
    #[serde(default)]
    pub correlation_id: Option<String>,
    #[serde(default)]
    pub occurred_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub idempotency_key: Option<String>,
    pub subject: Subject,
    pub payload: Value,
    #[serde(default)]
    pub signatures: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub canonical_hash_hex: Option<String>,
}

/// Result of `ingest`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IngestResult {
    pub deduped: bool,
    pub sequence_number: i64,
    pub entry_hash: String,
    pub committed_at: DateTime<Utc>,
}

/// Extracted/computed provenance columns (spec §4.3 step 7).
#[derive(Debug, Clone)]
pub struct ProvenanceColumns {
    pub ruleset_version: String,
    pub evidence_set_hash: Option<String>,
    pub asset_state_hash: Option<String>,
    pub signature_key_id: Option<String>,
    pub verification_tier: Option<String>,
    pub actor_id: Option<String>,
}

pub const DEFAULT_RULESET_VERSION: &str = "v1.0.0";
