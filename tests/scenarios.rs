//! Concrete scenarios from the specification's testable-properties section.
//!
//! Scenarios 1-5 exercise the pure reducer and proof-validation functions
//! directly. Scenario 6 (race-safe dedupe) needs a real Postgres instance to
//! observe the unique-constraint race, so it runs against an ephemeral
//! `sqlx::test` database.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{Duration, Utc};
use provenance_ledger::canonical::asset_state_hash;
use provenance_ledger::ingest::LedgerService;
use provenance_ledger::model::{DerivedVerificationState, IngestInput, InvalidReason, LedgerEntry, ReasonCode, Subject, ValidationOutcome, VerificationStatus};
use provenance_ledger::policy::IssuancePolicy;
use provenance_ledger::proof::{issue, snapshot_hash, validate, GrantSnapshot};
use provenance_ledger::reducer::reduce;
use provenance_ledger::registry::{EventClassifier, EventTypeRegistry, EventSemantic, StaticClassifier};
use provenance_ledger::signer::Ed25519Signer;
use serde_json::json;

fn classifier() -> StaticClassifier {
    StaticClassifier::new([
        ("VERIFICATION_GRANTED".to_string(), EventSemantic::VerificationGranted),
        ("CLAIM_UPDATED".to_string(), EventSemantic::ClaimUpdated),
        ("EVIDENCE_ADDED".to_string(), EventSemantic::EvidenceChanged),
        ("EVIDENCE_FROZEN".to_string(), EventSemantic::EvidenceFrozen),
        ("VERIFICATION_REVOKED".to_string(), EventSemantic::VerificationRevoked),
    ])
}

fn entry(seq: i64, event_id: &str, event_type: &str) -> LedgerEntry {
    LedgerEntry {
        sequence_number: seq,
        event_id: event_id.to_string(),
        source: "verification-svc".into(),
        producer_version: "1.0.0".into(),
        event_type: event_type.to_string(),
        correlation_id: None,
        actor_id: None,
        subject: Subject { asset_id: "asset-1".into(), ..Default::default() },
        payload: json!({}),
        payload_hash: "hash".into(),
        previous_hash: None,
        entry_hash: format!("entry-{seq}"),
        signatures: BTreeMap::new(),
        signature_key_id: None,
        idempotency_key: None,
        canonical_hash_hex: None,
        schema_version: "1".into(),
        occurred_at: Utc::now(),
        committed_at: Utc::now(),
        ruleset_version: "v1.0.0".into(),
        asset_state_hash: None,
        evidence_set_hash: None,
        verification_tier: None,
    }
}

/// Scenario 1: mutation invalidates verification.
#[test]
fn mutation_invalidates_verification() {
    let mut grant = entry(1, "grant-1", "VERIFICATION_GRANTED");
    grant.asset_state_hash = Some("ash".into());
    grant.evidence_set_hash = Some("esh".into());

    let mut claim_update = entry(2, "claim-upd-1", "CLAIM_UPDATED");
    let new_hash = asset_state_hash(&json!({"owner": "bob"}), &[], "v1.0.0").unwrap();
    claim_update.asset_state_hash = Some(new_hash);
    claim_update.payload = json!({"claim_json": {"owner": "bob"}, "evidence_hashes": []});

    let evidence_added = entry(3, "ev-add-1", "EVIDENCE_ADDED");

    let state = reduce("asset-1", &[grant, claim_update, evidence_added], &classifier());

    assert_eq!(state.status, VerificationStatus::Invalidated);
    assert_eq!(state.reason_code, ReasonCode::StateHashMismatch);
    assert_eq!(state.last_verification_event_id.as_deref(), Some("grant-1"));
}

/// Scenario 2: freeze blocks issuance. The policy gate's decision is a pure
/// function of the reducer's output, so this is exercised directly here;
/// the DB-backed wiring is covered by `ingestion_integration.rs`.
#[test]
fn freeze_blocks_issuance_decision() {
    let freeze = entry(1, "freeze-1", "EVIDENCE_FROZEN");
    let state = reduce("asset-1", std::slice::from_ref(&freeze), &classifier());
    assert_eq!(state.status, VerificationStatus::Frozen);
}

/// Scenario 3: expired proof rejected, `now == expires_at` boundary.
#[test]
fn expired_proof_rejected_at_exact_boundary() {
    let now = Utc::now();
    let grant = GrantSnapshot {
        verification_event_id: "grant-1".into(),
        asset_id: "asset-1".into(),
        asset_state_hash: "ash".into(),
        evidence_set_hash: "esh".into(),
        ruleset_version: "v1.0.0".into(),
    };
    let proof = issue(&grant, Duration::seconds(0), now, None).unwrap();

    let derived = DerivedVerificationState {
        asset_id: "asset-1".into(),
        status: VerificationStatus::VerifiedActive,
        reason_code: ReasonCode::VerificationGranted,
        last_verification_event_id: Some("grant-1".into()),
        asset_state_hash_current: Some("ash".into()),
        evidence_set_hash_current: Some("esh".into()),
    };

    let outcome = validate(&proof, proof.expires_at, &derived);
    assert_eq!(outcome, ValidationOutcome::invalid(InvalidReason::ProofExpired));
}

/// Scenario 4: snapshot drift rejected before expiry.
#[test]
fn snapshot_drift_rejected_before_expiry() {
    let now = Utc::now();
    let grant = GrantSnapshot {
        verification_event_id: "grant-1".into(),
        asset_id: "asset-1".into(),
        asset_state_hash: "ash".into(),
        evidence_set_hash: "esh".into(),
        ruleset_version: "v1.0.0".into(),
    };
    let proof = issue(&grant, Duration::hours(1), now, None).unwrap();

    let derived = DerivedVerificationState {
        asset_id: "asset-1".into(),
        status: VerificationStatus::VerifiedActive,
        reason_code: ReasonCode::VerificationGranted,
        last_verification_event_id: Some("grant-1".into()),
        asset_state_hash_current: Some("ash_changed".into()),
        evidence_set_hash_current: Some("esh".into()),
    };

    let outcome = validate(&proof, now, &derived);
    assert_eq!(outcome, ValidationOutcome::invalid(InvalidReason::Invalidated));
}

/// Scenario 5: grant supersession.
#[test]
fn grant_supersession_rejected() {
    let now = Utc::now();
    let grant = GrantSnapshot {
        verification_event_id: "grant-1".into(),
        asset_id: "asset-1".into(),
        asset_state_hash: "ash".into(),
        evidence_set_hash: "esh".into(),
        ruleset_version: "v1.0.0".into(),
    };
    let proof = issue(&grant, Duration::hours(1), now, None).unwrap();

    let derived = DerivedVerificationState {
        asset_id: "asset-1".into(),
        status: VerificationStatus::VerifiedActive,
        reason_code: ReasonCode::VerificationGranted,
        last_verification_event_id: Some("grant-2".into()),
        asset_state_hash_current: Some("ash".into()),
        evidence_set_hash_current: Some("esh".into()),
    };

    let outcome = validate(&proof, now, &derived);
    assert_eq!(outcome, ValidationOutcome::invalid(InvalidReason::NotActiveGrant));
    let _ = snapshot_hash("ash", "esh").unwrap();
}

struct PassThroughRegistry;
impl EventTypeRegistry for PassThroughRegistry {
    fn canonicalize(&self, event_type: &str) -> Option<String> {
        Some(event_type.to_string())
    }
}

/// Scenario 6: race-safe dedupe. Two concurrent ingests with the same
/// `(source, idempotency_key)` and different `event_id`s: exactly one row
/// appears, both callers see `ok=true`, identical `sequence_number` and
/// `entry_hash`; the loser reports `deduped=true`.
#[sqlx::test]
async fn race_safe_dedupe_by_idempotency_key(pool: sqlx::PgPool) -> sqlx::Result<()> {
    provenance_ledger::store::run_migrations(&pool).await.expect("migrations run");

    let signer = Arc::new(Ed25519Signer::from_seed(b"race-test-seed"));
    let registry = Arc::new(PassThroughRegistry);
    let service = Arc::new(LedgerService::new(pool, signer, registry, "1".to_string()));

    let make_input = |event_id: &str| IngestInput {
        event_id: event_id.to_string(),
        source: "svc".into(),
        producer_version: "1.0.0".into(),
        schema_version: "1".into(),
        event_type: "VERIFICATION_GRANTED".into(),
        correlation_id: None,
        occurred_at: None,
        idempotency_key: Some("shared-key".into()),
        subject: Subject { asset_id: "asset-1".into(), ..Default::default() },
        payload: json!({}),
        signatures: None,
        canonical_hash_hex: None,
    };

    let (svc_a, svc_b) = (service.clone(), service.clone());
    let a = tokio::spawn(async move { svc_a.ingest(make_input("event-a")).await });
    let b = tokio::spawn(async move { svc_b.ingest(make_input("event-b")).await });

    let (result_a, result_b) = tokio::join!(a, b);
    let result_a = result_a.unwrap().expect("ingest a should not error");
    let result_b = result_b.unwrap().expect("ingest b should not error");

    assert_eq!(result_a.sequence_number, result_b.sequence_number);
    assert_eq!(result_a.entry_hash, result_b.entry_hash);
    assert_eq!(result_a.deduped, !result_b.deduped, "exactly one caller wins the race");

    Ok(())
}
