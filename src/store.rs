//! Ledger store schema (spec §4.4 entity storage / §6 persistent layout).
//!
//! Thin, explicit `sqlx` query functions over the three Postgres tables.
//! Kept deliberately free of transaction-boundary decisions — those live in
//! `ingest`, `rebuild`, and `policy`, which compose these functions inside
//! their own `sqlx::Transaction`s.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{PgPool, Postgres, Transaction};

use crate::error::Result;
use crate::model::{DerivedVerificationState, LedgerEntry, ProofView, ReasonCode, Subject, VerificationStatus};

pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub async fn find_entry_by_event_id(
    tx: &mut Transaction<'_, Postgres>,
    event_id: &str,
) -> Result<Option<LedgerEntry>> {
    let row = sqlx::query_as::<_, EntryRow>(
        r#"SELECT * FROM ledger_entries WHERE id = $1"#,
    )
    .bind(event_id)
    .fetch_optional(&mut **tx)
    .await?;
    Ok(row.map(EntryRow::into_model))
}

pub async fn find_entry_by_idempotency_key(
    tx: &mut Transaction<'_, Postgres>,
    source: &str,
    idempotency_key: &str,
) -> Result<Option<LedgerEntry>> {
    let row = sqlx::query_as::<_, EntryRow>(
        r#"SELECT * FROM ledger_entries WHERE source = $1 AND idempotency_key = $2"#,
    )
    .bind(source)
    .bind(idempotency_key)
    .fetch_optional(&mut **tx)
    .await?;
    Ok(row.map(EntryRow::into_model))
}

pub async fn find_tip(tx: &mut Transaction<'_, Postgres>) -> Result<Option<LedgerEntry>> {
    let row = sqlx::query_as::<_, EntryRow>(
        r#"SELECT * FROM ledger_entries ORDER BY sequence_number DESC LIMIT 1"#,
    )
    .fetch_optional(&mut **tx)
    .await?;
    Ok(row.map(EntryRow::into_model))
}

/// Insert a new entry with the race-safe `ON CONFLICT ... DO NOTHING` clause
/// from spec §4.3 step 9. Returns `None` if the conflicting row won the race.
pub async fn insert_entry(
    tx: &mut Transaction<'_, Postgres>,
    entry: &LedgerEntry,
) -> Result<Option<LedgerEntry>> {
    let signatures_json = serde_json::to_value(&entry.signatures)
        .map_err(|e| crate::error::LedgerError::Internal(e.to_string()))?;
    let subject_json = serde_json::to_value(&entry.subject)
        .map_err(|e| crate::error::LedgerError::Internal(e.to_string()))?;

    let row = sqlx::query_as::<_, EntryRow>(
        r#"
        INSERT INTO ledger_entries (
            id, sequence_number, source, event_type, correlation_id,
            asset_id, anchor_id, actor_id, subject, payload, payload_hash,
            previous_hash, entry_hash, created_at, schema_version,
            producer_version, occurred_at, signatures, idempotency_key,
            canonical_hash_hex, ruleset_version, asset_state_hash, evidence_set_hash,
            signature_key_id, verification_tier
        ) VALUES (
            $1, $2, $3, $4, $5,
            $6, $7, $8, $9, $10, $11,
            $12, $13, $14, $15,
            $16, $17, $18, $19,
            $20, $21, $22, $23,
            $24, $25
        )
        ON CONFLICT (source, idempotency_key) WHERE idempotency_key IS NOT NULL DO NOTHING
        RETURNING *
        "#,
    )
    .bind(&entry.event_id)
    .bind(entry.sequence_number)
    .bind(&entry.source)
    .bind(&entry.event_type)
    .bind(&entry.correlation_id)
    .bind(&entry.subject.asset_id)
    .bind(&entry.subject.anchor_id)
    .bind(&entry.actor_id)
    .bind(subject_json)
    .bind(&entry.payload)
    .bind(&entry.payload_hash)
    .bind(&entry.previous_hash)
    .bind(&entry.entry_hash)
    .bind(entry.committed_at)
    .bind(&entry.schema_version)
    .bind(&entry.producer_version)
    .bind(entry.occurred_at)
    .bind(signatures_json)
    .bind(&entry.idempotency_key)
    .bind(&entry.canonical_hash_hex)
    .bind(&entry.ruleset_version)
    .bind(&entry.asset_state_hash)
    .bind(&entry.evidence_set_hash)
    .bind(&entry.signature_key_id)
    .bind(&entry.verification_tier)
    .fetch_optional(&mut **tx)
    .await?;

    Ok(row.map(EntryRow::into_model))
}

pub async fn entries_for_asset_ordered(
    pool: &PgPool,
    asset_id: &str,
) -> Result<Vec<LedgerEntry>> {
    let rows = sqlx::query_as::<_, EntryRow>(
        r#"SELECT * FROM ledger_entries WHERE asset_id = $1 ORDER BY sequence_number ASC"#,
    )
    .bind(asset_id)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(EntryRow::into_model).collect())
}

pub async fn entries_for_asset_ordered_tx(
    tx: &mut Transaction<'_, Postgres>,
    asset_id: &str,
) -> Result<Vec<LedgerEntry>> {
    let rows = sqlx::query_as::<_, EntryRow>(
        r#"SELECT * FROM ledger_entries WHERE asset_id = $1 ORDER BY sequence_number ASC"#,
    )
    .bind(asset_id)
    .fetch_all(&mut **tx)
    .await?;
    Ok(rows.into_iter().map(EntryRow::into_model).collect())
}

pub async fn all_entries_ordered(pool: &PgPool) -> Result<Vec<LedgerEntry>> {
    let rows = sqlx::query_as::<_, EntryRow>(
        r#"SELECT * FROM ledger_entries ORDER BY sequence_number ASC"#,
    )
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(EntryRow::into_model).collect())
}

pub async fn truncate_derived_state(pool: &PgPool) -> Result<()> {
    sqlx::query(r#"TRUNCATE TABLE derived_verification_state"#).execute(pool).await?;
    Ok(())
}

pub async fn upsert_derived_state(pool: &PgPool, state: &DerivedVerificationState) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO derived_verification_state (
            asset_id, status, reason_code, last_verification_event_id,
            asset_state_hash_current, evidence_set_hash_current
        ) VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (asset_id) DO UPDATE SET
            status = EXCLUDED.status,
            reason_code = EXCLUDED.reason_code,
            last_verification_event_id = EXCLUDED.last_verification_event_id,
            asset_state_hash_current = EXCLUDED.asset_state_hash_current,
            evidence_set_hash_current = EXCLUDED.evidence_set_hash_current
        "#,
    )
    .bind(&state.asset_id)
    .bind(status_str(state.status))
    .bind(reason_str(state.reason_code))
    .bind(&state.last_verification_event_id)
    .bind(&state.asset_state_hash_current)
    .bind(&state.evidence_set_hash_current)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn get_derived_state(pool: &PgPool, asset_id: &str) -> Result<Option<DerivedVerificationState>> {
    let row = sqlx::query_as::<_, DerivedStateRow>(
        r#"SELECT * FROM derived_verification_state WHERE asset_id = $1"#,
    )
    .bind(asset_id)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(DerivedStateRow::into_model))
}

pub async fn insert_proof_view(pool: &PgPool, proof: &ProofView) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO proof_views (
            proof_id, asset_id, verification_event_id, snapshot_hash,
            asset_state_hash, evidence_set_hash, ruleset_version,
            created_at, expires_at, revoked_at, scope_json, created_by
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        "#,
    )
    .bind(&proof.proof_id)
    .bind(&proof.asset_id)
    .bind(&proof.verification_event_id)
    .bind(&proof.snapshot_hash)
    .bind(&proof.asset_state_hash)
    .bind(&proof.evidence_set_hash)
    .bind(&proof.ruleset_version)
    .bind(proof.created_at)
    .bind(proof.expires_at)
    .bind(proof.revoked_at)
    .bind(&proof.scope_json)
    .bind(&proof.created_by)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn get_proof_view(pool: &PgPool, proof_id: &str) -> Result<Option<ProofView>> {
    let row = sqlx::query_as::<_, ProofRow>(r#"SELECT * FROM proof_views WHERE proof_id = $1"#)
        .bind(proof_id)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(ProofRow::into_model))
}

pub async fn revoke_proof_view(pool: &PgPool, proof_id: &str, revoked_at: DateTime<Utc>) -> Result<()> {
    sqlx::query(r#"UPDATE proof_views SET revoked_at = $2 WHERE proof_id = $1 AND revoked_at IS NULL"#)
        .bind(proof_id)
        .bind(revoked_at)
        .execute(pool)
        .await?;
    Ok(())
}

fn status_str(status: VerificationStatus) -> &'static str {
    match status {
        VerificationStatus::None => "NONE",
        VerificationStatus::VerifiedActive => "VERIFIED_ACTIVE",
        VerificationStatus::Invalidated => "INVALIDATED",
        VerificationStatus::Frozen => "FROZEN",
        VerificationStatus::Revoked => "REVOKED",
    }
}

fn reason_str(reason: ReasonCode) -> &'static str {
    match reason {
        ReasonCode::VerificationGranted => "VERIFICATION_GRANTED",
        ReasonCode::StateHashMismatch => "STATE_HASH_MISMATCH",
        ReasonCode::EvidenceFrozen => "EVIDENCE_FROZEN",
        ReasonCode::VerificationRevoked => "VERIFICATION_REVOKED",
        ReasonCode::NoEvents => "NO_EVENTS",
    }
}

fn status_from_str(s: &str) -> VerificationStatus {
    match s {
        "VERIFIED_ACTIVE" => VerificationStatus::VerifiedActive,
        "INVALIDATED" => VerificationStatus::Invalidated,
        "FROZEN" => VerificationStatus::Frozen,
        "REVOKED" => VerificationStatus::Revoked,
        _ => VerificationStatus::None,
    }
}

fn reason_from_str(s: &str) -> ReasonCode {
    match s {
        "VERIFICATION_GRANTED" => ReasonCode::VerificationGranted,
        "STATE_HASH_MISMATCH" => ReasonCode::StateHashMismatch,
        "EVIDENCE_FROZEN" => ReasonCode::EvidenceFrozen,
        "VERIFICATION_REVOKED" => ReasonCode::VerificationRevoked,
        _ => ReasonCode::NoEvents,
    }
}

#[derive(sqlx::FromRow)]
struct EntryRow {
    id: String,
    sequence_number: i64,
    source: String,
    event_type: String,
    correlation_id: Option<String>,
    #[allow(dead_code)]
    asset_id: String,
    #[allow(dead_code)]
    anchor_id: Option<String>,
    actor_id: Option<String>,
    subject: Value,
    payload: Value,
    payload_hash: String,
    previous_hash: Option<String>,
    entry_hash: String,
    created_at: DateTime<Utc>,
    schema_version: String,
    producer_version: Option<String>,
    occurred_at: Option<DateTime<Utc>>,
    signatures: Option<Value>,
    idempotency_key: Option<String>,
    canonical_hash_hex: Option<String>,
    ruleset_version: String,
    asset_state_hash: Option<String>,
    evidence_set_hash: Option<String>,
    signature_key_id: Option<String>,
    verification_tier: Option<String>,
}

impl EntryRow {
    fn into_model(self) -> LedgerEntry {
        let subject: Subject = serde_json::from_value(self.subject).unwrap_or_default();
        let signatures: BTreeMap<String, String> = self
            .signatures
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default();

        LedgerEntry {
            sequence_number: self.sequence_number,
            event_id: self.id,
            source: self.source,
            producer_version: self.producer_version.unwrap_or_default(),
            event_type: self.event_type,
            correlation_id: self.correlation_id,
            actor_id: self.actor_id,
            subject,
            payload: self.payload,
            payload_hash: self.payload_hash,
            previous_hash: self.previous_hash,
            entry_hash: self.entry_hash,
            signatures,
            signature_key_id: self.signature_key_id,
            idempotency_key: self.idempotency_key,
            canonical_hash_hex: self.canonical_hash_hex,
            schema_version: self.schema_version,
            occurred_at: self.occurred_at.unwrap_or(self.created_at),
            committed_at: self.created_at,
            ruleset_version: self.ruleset_version,
            asset_state_hash: self.asset_state_hash,
            evidence_set_hash: self.evidence_set_hash,
            verification_tier: self.verification_tier,
        }
    }
}

#[derive(sqlx::FromRow)]
struct DerivedStateRow {
    asset_id: String,
    status: String,
    reason_code: String,
    last_verification_event_id: Option<String>,
    asset_state_hash_current: Option<String>,
    evidence_set_hash_current: Option<String>,
}

impl DerivedStateRow {
    fn into_model(self) -> DerivedVerificationState {
        DerivedVerificationState {
            asset_id: self.asset_id,
            status: status_from_str(&self.status),
            reason_code: reason_from_str(&self.reason_code),
            last_verification_event_id: self.last_verification_event_id,
            asset_state_hash_current: self.asset_state_hash_current,
            evidence_set_hash_current: self.evidence_set_hash_current,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ProofRow {
    proof_id: String,
    asset_id: String,
    verification_event_id: String,
    snapshot_hash: String,
    asset_state_hash: String,
    evidence_set_hash: String,
    ruleset_version: String,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    revoked_at: Option<DateTime<Utc>>,
    scope_json: Option<Value>,
    created_by: Option<String>,
}

impl ProofRow {
    fn into_model(self) -> ProofView {
        ProofView {
            proof_id: self.proof_id,
            asset_id: self.asset_id,
            verification_event_id: self.verification_event_id,
            snapshot_hash: self.snapshot_hash,
            asset_state_hash: self.asset_state_hash,
            evidence_set_hash: self.evidence_set_hash,
            ruleset_version: self.ruleset_version,
            created_at: self.created_at,
            expires_at: self.expires_at,
            revoked_at: self.revoked_at,
            scope_json: self.scope_json,
            created_by: self.created_by,
        }
    }
}
