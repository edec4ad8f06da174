//! Proof-view service (spec §4.5): issuance and pure validation of
//! snapshot-bound, TTL- and revocation-gated attestations.

use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use uuid::Uuid;

use crate::canonical::canonical_hash_hex;
use crate::error::Result;
use crate::model::{DerivedVerificationState, InvalidReason, ProofView, ValidationOutcome, VerificationStatus};

/// A verification grant's recorded snapshot, the minimal input `issue` needs.
pub struct GrantSnapshot {
    pub verification_event_id: String,
    pub asset_id: String,
    pub asset_state_hash: String,
    pub evidence_set_hash: String,
    pub ruleset_version: String,
}

pub fn snapshot_hash(asset_state_hash: &str, evidence_set_hash: &str) -> Result<String> {
    canonical_hash_hex(&json!({
        "asset_state_hash": asset_state_hash,
        "evidence_set_hash": evidence_set_hash,
    }))
}

/// Build a new, not-yet-persisted `ProofView` bound to `grant`, valid for `ttl`.
pub fn issue(
    grant: &GrantSnapshot,
    ttl: Duration,
    now: DateTime<Utc>,
    created_by: Option<String>,
) -> Result<ProofView> {
    let hash = snapshot_hash(&grant.asset_state_hash, &grant.evidence_set_hash)?;
    Ok(ProofView {
        proof_id: Uuid::new_v4().to_string(),
        asset_id: grant.asset_id.clone(),
        verification_event_id: grant.verification_event_id.clone(),
        snapshot_hash: hash,
        asset_state_hash: grant.asset_state_hash.clone(),
        evidence_set_hash: grant.evidence_set_hash.clone(),
        ruleset_version: grant.ruleset_version.clone(),
        created_at: now,
        expires_at: now + ttl,
        revoked_at: None,
        scope_json: None,
        created_by,
    })
}

/// Validate `proof` against the asset's live derived state at `now`. Checks
/// run in the normative order from spec §4.5; never errors.
pub fn validate(proof: &ProofView, now: DateTime<Utc>, derived: &DerivedVerificationState) -> ValidationOutcome {
    if proof.revoked_at.is_some() {
        return ValidationOutcome::invalid(InvalidReason::ProofRevoked);
    }
    if now >= proof.expires_at {
        return ValidationOutcome::invalid(InvalidReason::ProofExpired);
    }
    if derived.status != VerificationStatus::VerifiedActive {
        return ValidationOutcome::invalid(InvalidReason::Invalidated);
    }
    if derived.last_verification_event_id.as_deref() != Some(proof.verification_event_id.as_str()) {
        return ValidationOutcome::invalid(InvalidReason::NotActiveGrant);
    }

    let (Some(ash), Some(esh)) = (&derived.asset_state_hash_current, &derived.evidence_set_hash_current) else {
        return ValidationOutcome::invalid(InvalidReason::Invalidated);
    };
    let recomputed = match snapshot_hash(ash, esh) {
        Ok(h) => h,
        Err(_) => return ValidationOutcome::invalid(InvalidReason::Invalidated),
    };
    if recomputed != proof.snapshot_hash {
        return ValidationOutcome::invalid(InvalidReason::Invalidated);
    }

    ValidationOutcome::ok()
}

/// Async wrapper binding `issue`/`validate` to live persistence: looks up
/// the grant's recorded hashes, replays the asset's current derived state,
/// and performs the DB reads/writes around the pure functions above.
pub struct ProofViewService<'a> {
    pool: &'a sqlx::PgPool,
}

impl<'a> ProofViewService<'a> {
    pub fn new(pool: &'a sqlx::PgPool) -> Self {
        Self { pool }
    }

    pub async fn issue(
        &self,
        grant: &GrantSnapshot,
        ttl: Duration,
        created_by: Option<String>,
    ) -> Result<ProofView> {
        let proof = issue(grant, ttl, Utc::now(), created_by)?;
        crate::store::insert_proof_view(self.pool, &proof).await?;
        Ok(proof)
    }

    /// Validate `proof_id` against the asset's live derived state, replaying
    /// with the provided `classifier`.
    pub async fn validate_live(
        &self,
        proof_id: &str,
        classifier: &dyn crate::registry::EventClassifier,
    ) -> Result<Option<ValidationOutcome>> {
        let Some(proof) = crate::store::get_proof_view(self.pool, proof_id).await? else {
            return Ok(None);
        };
        let events = crate::store::entries_for_asset_ordered(self.pool, &proof.asset_id).await?;
        let derived = crate::reducer::reduce(&proof.asset_id, &events, classifier);
        Ok(Some(validate(&proof, Utc::now(), &derived)))
    }

    pub async fn revoke(&self, proof_id: &str) -> Result<()> {
        crate::store::revoke_proof_view(self.pool, proof_id, Utc::now()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ReasonCode;

    fn base_proof(now: DateTime<Utc>) -> ProofView {
        ProofView {
            proof_id: "proof-1".into(),
            asset_id: "asset-1".into(),
            verification_event_id: "grant-1".into(),
            snapshot_hash: snapshot_hash("ash", "esh").unwrap(),
            asset_state_hash: "ash".into(),
            evidence_set_hash: "esh".into(),
            ruleset_version: "v1.0.0".into(),
            created_at: now,
            expires_at: now + Duration::hours(1),
            revoked_at: None,
            scope_json: None,
            created_by: None,
        }
    }

    fn verified_state() -> DerivedVerificationState {
        DerivedVerificationState {
            asset_id: "asset-1".into(),
            status: VerificationStatus::VerifiedActive,
            reason_code: ReasonCode::VerificationGranted,
            last_verification_event_id: Some("grant-1".into()),
            asset_state_hash_current: Some("ash".into()),
            evidence_set_hash_current: Some("esh".into()),
        }
    }

    #[test]
    fn valid_proof_passes() {
        let now = Utc::now();
        let proof = base_proof(now);
        let outcome = validate(&proof, now, &verified_state());
        assert_eq!(outcome, ValidationOutcome::ok());
    }

    /// Scenario 3 from spec §8: `now == expires_at` returns PROOF_EXPIRED.
    #[test]
    fn expiry_boundary_is_inclusive_of_expired() {
        let now = Utc::now();
        let proof = base_proof(now - Duration::hours(1));
        let outcome = validate(&proof, proof.expires_at, &verified_state());
        assert_eq!(outcome, ValidationOutcome::invalid(InvalidReason::ProofExpired));
        let _ = now;
    }

    #[test]
    fn revoked_wins_over_ttl() {
        let now = Utc::now();
        let mut proof = base_proof(now);
        proof.revoked_at = Some(now - Duration::seconds(1));
        proof.expires_at = now + Duration::days(365);
        let outcome = validate(&proof, now, &verified_state());
        assert_eq!(outcome, ValidationOutcome::invalid(InvalidReason::ProofRevoked));
    }

    /// Scenario 4: snapshot drift rejected before expiry.
    #[test]
    fn snapshot_drift_is_rejected() {
        let now = Utc::now();
        let proof = base_proof(now);
        let mut derived = verified_state();
        derived.asset_state_hash_current = Some("ash_changed".into());
        let outcome = validate(&proof, now, &derived);
        assert_eq!(outcome, ValidationOutcome::invalid(InvalidReason::Invalidated));
    }

    /// Scenario 5: grant supersession.
    #[test]
    fn superseded_grant_is_rejected() {
        let now = Utc::now();
        let proof = base_proof(now);
        let mut derived = verified_state();
        derived.last_verification_event_id = Some("grant-2".into());
        let outcome = validate(&proof, now, &derived);
        assert_eq!(outcome, ValidationOutcome::invalid(InvalidReason::NotActiveGrant));
    }

    #[test]
    fn non_active_status_is_rejected() {
        let now = Utc::now();
        let proof = base_proof(now);
        let mut derived = verified_state();
        derived.status = VerificationStatus::Frozen;
        let outcome = validate(&proof, now, &derived);
        assert_eq!(outcome, ValidationOutcome::invalid(InvalidReason::Invalidated));
    }
}
