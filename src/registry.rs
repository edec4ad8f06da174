//! Event-type registry and reducer classification contracts.
//!
//! The concrete event-type enum is an external collaborator (schema registry,
//! spec §1) — this crate only depends on two small traits a producer wires
//! up with the real registry contents.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::model::LedgerEntry;

/// `^[A-Z]+(_[A-Z]+)+$` — the `DOMAIN_NOUN_PASTVERB` shape required of
/// canonical event-type names (spec §6).
static EVENT_TYPE_SHAPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z]+(_[A-Z]+)+$").expect("static regex is valid"));

pub fn matches_event_type_shape(event_type: &str) -> bool {
    EVENT_TYPE_SHAPE.is_match(event_type)
}

/// Resolves whether an `event_type` is recognized, and normalizes legacy
/// aliases to their canonical name. Only canonical names are ever persisted.
pub trait EventTypeRegistry: Send + Sync {
    /// Returns the canonical name for `event_type`, or `None` if it is
    /// neither a canonical name nor a known alias.
    fn canonicalize(&self, event_type: &str) -> Option<String>;
}

/// The semantic role an event plays in the replay reducer's state machine
/// (spec §4.4). A producer-side classifier maps its concrete `event_type`
/// strings onto this fixed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventSemantic {
    VerificationGranted,
    ClaimUpdated,
    EvidenceChanged,
    EvidenceFrozen,
    VerificationRevoked,
    Other,
}

pub trait EventClassifier: Send + Sync {
    fn classify(&self, entry: &LedgerEntry) -> EventSemantic;
}

/// A classifier driven by a static list of `(event_type, semantic)` pairs,
/// useful for tests and for registries whose event types map 1:1 onto a
/// semantic without inspecting the payload.
pub struct StaticClassifier {
    mapping: std::collections::HashMap<String, EventSemantic>,
}

impl StaticClassifier {
    pub fn new(mapping: impl IntoIterator<Item = (String, EventSemantic)>) -> Self {
        Self { mapping: mapping.into_iter().collect() }
    }
}

impl EventClassifier for StaticClassifier {
    fn classify(&self, entry: &LedgerEntry) -> EventSemantic {
        self.mapping.get(&entry.event_type).copied().unwrap_or(EventSemantic::Other)
    }
}
