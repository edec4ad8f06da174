//! Replay reducer (spec §4.4): pure fold from an ordered event list to a
//! per-asset derived verification state. Generalizes the teacher's
//! `TradeContext::current_state` backward walk over a fixed witness enum
//! into a forward fold driven by a pluggable `EventClassifier`, since here
//! later events must be compared against the hash recorded by the most
//! recent grant rather than simply overriding the status.

use crate::canonical::asset_state_hash;
use crate::model::{DerivedVerificationState, LedgerEntry, ReasonCode, VerificationStatus};
use crate::registry::{EventClassifier, EventSemantic};

/// Reduce `events` (already filtered to `asset_id`, ordered by
/// `sequence_number` ascending) into the asset's derived verification state.
///
/// Pure, synchronous, no I/O. Produces identical output on repeated runs
/// given the same input ordering (spec §8 property 7).
pub fn reduce(
    asset_id: &str,
    events: &[LedgerEntry],
    classifier: &dyn EventClassifier,
) -> DerivedVerificationState {
    let mut state = DerivedVerificationState::empty(asset_id);

    // The hashes recorded by the most recent verification grant — what
    // subsequent mutations are checked against for invalidation.
    let mut grant_asset_state_hash: Option<String> = None;
    let mut grant_evidence_set_hash: Option<String> = None;

    for event in events {
        match classifier.classify(event) {
            EventSemantic::VerificationGranted => {
                state.status = VerificationStatus::VerifiedActive;
                state.reason_code = ReasonCode::VerificationGranted;
                state.last_verification_event_id = Some(event.event_id.clone());
                state.asset_state_hash_current = event.asset_state_hash.clone();
                state.evidence_set_hash_current = event.evidence_set_hash.clone();
                grant_asset_state_hash = event.asset_state_hash.clone();
                grant_evidence_set_hash = event.evidence_set_hash.clone();
            }
            EventSemantic::ClaimUpdated => {
                if let Some(new_hash) = recompute_asset_state_hash(event) {
                    let was_verified = state.status == VerificationStatus::VerifiedActive;
                    state.asset_state_hash_current = Some(new_hash.clone());
                    if was_verified
                        && grant_asset_state_hash.as_deref() != Some(new_hash.as_str())
                    {
                        state.status = VerificationStatus::Invalidated;
                        state.reason_code = ReasonCode::StateHashMismatch;
                    }
                }
            }
            EventSemantic::EvidenceChanged => {
                if let Some(new_hash) = event.evidence_set_hash.clone() {
                    let was_verified = state.status == VerificationStatus::VerifiedActive;
                    state.evidence_set_hash_current = Some(new_hash.clone());
                    if was_verified
                        && grant_evidence_set_hash.as_deref() != Some(new_hash.as_str())
                    {
                        state.status = VerificationStatus::Invalidated;
                        state.reason_code = ReasonCode::StateHashMismatch;
                    }
                }
            }
            EventSemantic::EvidenceFrozen => {
                if state.status != VerificationStatus::Revoked {
                    state.status = VerificationStatus::Frozen;
                    state.reason_code = ReasonCode::EvidenceFrozen;
                }
            }
            EventSemantic::VerificationRevoked => {
                state.status = VerificationStatus::Revoked;
                state.reason_code = ReasonCode::VerificationRevoked;
            }
            EventSemantic::Other => {}
        }
    }

    state
}

/// Recompute `asset_state_hash_current` from a claim-update event's payload,
/// when the event carries the recognized `claim_json`/`evidence_hashes`/
/// `ruleset_version` fields needed to do so.
fn recompute_asset_state_hash(event: &LedgerEntry) -> Option<String> {
    if let Some(precomputed) = &event.asset_state_hash {
        return Some(precomputed.clone());
    }
    let claim_json = event.payload.get("claim_json")?;
    let evidence_hashes: Vec<String> = event
        .payload
        .get("evidence_hashes")
        .and_then(|v| v.as_array())
        .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default();
    asset_state_hash(claim_json, &evidence_hashes, &event.ruleset_version).ok()
}
