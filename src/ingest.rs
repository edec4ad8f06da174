//! Ingestion transaction (spec §4.3): the single-writer-serialized write
//! path that assigns a sequence number, links the hash chain, enforces
//! idempotency, signs the payload, and persists provenance columns.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use sqlx::PgPool;
use tracing::{error, info};

use crate::canonical::{asset_state_hash, canonical_bytes, evidence_set_hash, sha256_hex};
use crate::error::{LedgerError, Result};
use crate::model::{IngestInput, IngestResult, LedgerEntry, ProvenanceColumns, DEFAULT_RULESET_VERSION};
use crate::registry::{matches_event_type_shape, EventTypeRegistry};
use crate::signer::{Signer, PROVIDER_SIG_NAME};
use crate::store;

/// `pg_advisory_xact_lock` takes two 32-bit keys. Derived once from the
/// fixed constants `"PRVN"` and `"LEDG"` by reading each 4-byte ASCII tag
/// as a big-endian `u32` and reinterpreting the bits as `i32` — stable
/// across calls and processes, which is all `pg_advisory_xact_lock` needs.
pub fn advisory_lock_keys() -> (i32, i32) {
    fn tag_to_key(tag: &[u8; 4]) -> i32 {
        u32::from_be_bytes(*tag) as i32
    }
    (tag_to_key(b"PRVN"), tag_to_key(b"LEDG"))
}

pub struct LedgerService {
    pool: PgPool,
    signer: Arc<dyn Signer>,
    registry: Arc<dyn EventTypeRegistry>,
    current_schema_version: String,
}

impl LedgerService {
    pub fn new(
        pool: PgPool,
        signer: Arc<dyn Signer>,
        registry: Arc<dyn EventTypeRegistry>,
        current_schema_version: impl Into<String>,
    ) -> Self {
        Self { pool, signer, registry, current_schema_version: current_schema_version.into() }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run the ten-step ingestion algorithm from spec §4.3.
    pub async fn ingest(&self, input: IngestInput) -> Result<IngestResult> {
        let client_id = input.source.clone();
        let event_id = input.event_id.clone();

        let canonical_event_type = self
            .registry
            .canonicalize(&input.event_type)
            .ok_or_else(|| LedgerError::UnrecognizedEventType(input.event_type.clone()))?;
        if !matches_event_type_shape(&canonical_event_type) {
            return Err(LedgerError::ValidationFailed(format!(
                "event_type '{canonical_event_type}' does not match ^[A-Z]+(_[A-Z]+)+$"
            )));
        }
        if input.schema_version != self.current_schema_version {
            return Err(LedgerError::UnsupportedSchemaVersion {
                found: input.schema_version.clone(),
                expected: self.current_schema_version.clone(),
            });
        }

        let result = self.ingest_inner(input, canonical_event_type).await;

        match &result {
            Ok(r) if r.deduped => { /* already logged inside ingest_inner with the specific reason */ }
            Ok(r) => info!(
                event = "ingest_success",
                client_id = %client_id,
                event_id = %event_id,
                sequence_number = r.sequence_number,
                previous_hash = tracing::field::Empty,
                timestamp = %Utc::now().to_rfc3339(),
                "ledger entry committed"
            ),
            Err(e) => error!(
                event = "ingest_failed",
                client_id = %client_id,
                event_id = %event_id,
                error = %e,
                timestamp = %Utc::now().to_rfc3339(),
                "ingestion failed"
            ),
        }

        result
    }

    async fn ingest_inner(&self, input: IngestInput, event_type: String) -> Result<IngestResult> {
        let mut tx = self.pool.begin().await?;

        // Step 1: acquire the process-wide advisory lock. Transaction-scoped;
        // released automatically on commit or rollback.
        let (k1, k2) = advisory_lock_keys();
        sqlx::query("SELECT pg_advisory_xact_lock($1, $2)")
            .bind(k1)
            .bind(k2)
            .execute(&mut *tx)
            .await?;

        // Step 2: dedupe by event_id.
        if let Some(existing) = store::find_entry_by_event_id(&mut tx, &input.event_id).await? {
            tx.commit().await?;
            info!(
                event = "deduped_by_event_id",
                client_id = %input.source,
                event_id = %input.event_id,
                sequence_number = existing.sequence_number,
                timestamp = %Utc::now().to_rfc3339(),
                "ingest deduped by event_id"
            );
            return Ok(IngestResult {
                deduped: true,
                sequence_number: existing.sequence_number,
                entry_hash: existing.entry_hash,
                committed_at: existing.committed_at,
            });
        }

        // Step 3: dedupe by (source, idempotency_key).
        if let Some(key) = &input.idempotency_key {
            if let Some(existing) =
                store::find_entry_by_idempotency_key(&mut tx, &input.source, key).await?
            {
                tx.commit().await?;
                info!(
                    event = "deduped_by_idempotency_key",
                    client_id = %input.source,
                    event_id = %input.event_id,
                    sequence_number = existing.sequence_number,
                    timestamp = %Utc::now().to_rfc3339(),
                    "ingest deduped by idempotency_key"
                );
                return Ok(IngestResult {
                    deduped: true,
                    sequence_number: existing.sequence_number,
                    entry_hash: existing.entry_hash,
                    committed_at: existing.committed_at,
                });
            }
        }

        // Step 4: read the tip.
        let tip = store::find_tip(&mut tx).await?;
        let previous_hash = tip.as_ref().map(|t| t.entry_hash.clone());
        let next_seq = tip.as_ref().map(|t| t.sequence_number + 1).unwrap_or(0);

        // Step 5: payload hash.
        let payload_hash = sha256_hex(&canonical_bytes(&input.payload)?);

        // A producer-supplied `canonical_hash_hex` is an independent claim
        // about the payload's content hash; if present it must agree with
        // what we just computed, or the entry is rejected before any write.
        if let Some(claimed) = &input.canonical_hash_hex {
            if claimed != &payload_hash {
                return Err(LedgerError::ValidationFailed(format!(
                    "canonical_hash_hex '{claimed}' does not match computed payload_hash '{payload_hash}'"
                )));
            }
        }

        // Step 6: entry hash.
        let entry_hash_input = serde_json::json!({
            "previous_hash": previous_hash,
            "payload_hash": payload_hash,
            "sequence_number": next_seq,
            "event_id": input.event_id,
        });
        let entry_hash = sha256_hex(&canonical_bytes(&entry_hash_input)?);

        // Step 7: provenance columns.
        let provenance = extract_provenance_columns(&input)?;

        // Step 8: sign and merge provider_sig.
        let mut signatures: BTreeMap<String, String> = input.signatures.clone().unwrap_or_default();
        if !signatures.contains_key(PROVIDER_SIG_NAME) {
            let payload_bytes = canonical_bytes(&input.payload)?;
            let sig = self.signer.sign(&payload_bytes);
            signatures.insert(PROVIDER_SIG_NAME.to_string(), hex::encode(sig));
        }

        let occurred_at = input.occurred_at.unwrap_or_else(Utc::now);
        let committed_at = Utc::now();

        let candidate = LedgerEntry {
            sequence_number: next_seq,
            event_id: input.event_id.clone(),
            source: input.source.clone(),
            producer_version: input.producer_version.clone(),
            event_type,
            correlation_id: input.correlation_id.clone(),
            actor_id: provenance.actor_id.clone(),
            subject: input.subject.clone(),
            payload: input.payload.clone(),
            payload_hash: payload_hash.clone(),
            previous_hash,
            entry_hash: entry_hash.clone(),
            signatures,
            signature_key_id: provenance.signature_key_id.clone().or_else(|| Some(self.signer.key_id().to_string())),
            idempotency_key: input.idempotency_key.clone(),
            canonical_hash_hex: Some(payload_hash),
            schema_version: input.schema_version.clone(),
            occurred_at,
            committed_at,
            ruleset_version: provenance.ruleset_version.clone(),
            asset_state_hash: provenance.asset_state_hash.clone(),
            evidence_set_hash: provenance.evidence_set_hash.clone(),
            verification_tier: provenance.verification_tier.clone(),
        };

        // Step 9: insert with ON CONFLICT ... DO NOTHING, refetch on race.
        match store::insert_entry(&mut tx, &candidate).await? {
            Some(inserted) => {
                tx.commit().await?;
                Ok(IngestResult {
                    deduped: false,
                    sequence_number: inserted.sequence_number,
                    entry_hash: inserted.entry_hash,
                    committed_at: inserted.committed_at,
                })
            }
            None => {
                let key = input.idempotency_key.as_deref().ok_or_else(|| {
                    LedgerError::Internal(
                        "insert conflicted without an idempotency_key to refetch by".into(),
                    )
                })?;
                let existing = store::find_entry_by_idempotency_key(&mut tx, &input.source, key)
                    .await?
                    .ok_or_else(|| {
                        LedgerError::Internal("lost the insert race but found no conflicting row".into())
                    })?;
                tx.commit().await?;
                info!(
                    event = "deduped_by_conflict",
                    client_id = %input.source,
                    event_id = %input.event_id,
                    sequence_number = existing.sequence_number,
                    attempted_hash = %entry_hash,
                    timestamp = %Utc::now().to_rfc3339(),
                    "ingest deduped by unique-constraint conflict"
                );
                Ok(IngestResult {
                    deduped: true,
                    sequence_number: existing.sequence_number,
                    entry_hash: existing.entry_hash,
                    committed_at: existing.committed_at,
                })
            }
        }
    }
}

fn extract_provenance_columns(input: &IngestInput) -> Result<ProvenanceColumns> {
    let payload = &input.payload;

    let ruleset_version = payload
        .get("ruleset_version")
        .and_then(Value::as_str)
        .unwrap_or(DEFAULT_RULESET_VERSION)
        .to_string();

    let evidence_hashes: Vec<String> = payload
        .get("evidence_hashes")
        .and_then(|v| v.as_array())
        .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default();

    let evidence_hash = match payload.get("evidence_set_hash").and_then(Value::as_str) {
        Some(h) => Some(h.to_string()),
        None if !evidence_hashes.is_empty() => Some(evidence_set_hash(&evidence_hashes)),
        None => None,
    };

    let computed_asset_state_hash = match payload.get("asset_state_hash").and_then(Value::as_str) {
        Some(h) => Some(h.to_string()),
        None => match payload.get("claim_json") {
            Some(claim_json) => Some(asset_state_hash(claim_json, &evidence_hashes, &ruleset_version)?),
            None => None,
        },
    };

    Ok(ProvenanceColumns {
        ruleset_version,
        evidence_set_hash: evidence_hash,
        asset_state_hash: computed_asset_state_hash,
        signature_key_id: payload.get("signature_key_id").and_then(Value::as_str).map(str::to_string),
        verification_tier: payload.get("verification_tier").and_then(Value::as_str).map(str::to_string),
        actor_id: payload.get("actor_id").and_then(Value::as_str).map(str::to_string),
    })
}
