//! Canonical serialization and content hashing (spec §4.1).
//!
//! `canonical_bytes` must be bit-identical for semantically equal values
//! regardless of map key order. Everything here is pure and CPU-bound —
//! no I/O, no host-dependent map iteration.

use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::{LedgerError, Result};

/// Serialize `value` to canonical JSON bytes per the rules table in spec §4.1.
///
/// Mappings are re-emitted with keys sorted by codepoint; absent/null members
/// are handled as specified; floats must be finite.
pub fn canonical_bytes(value: &Value) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    write_canonical(value, &mut buf)?;
    Ok(buf)
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// `sha256_hex(canonical_bytes(value))` in one call.
pub fn canonical_hash_hex(value: &Value) -> Result<String> {
    Ok(sha256_hex(&canonical_bytes(value)?))
}

fn write_canonical(value: &Value, out: &mut Vec<u8>) -> Result<()> {
    match value {
        Value::Null => out.extend_from_slice(b"null"),
        Value::Bool(b) => out.extend_from_slice(if *b { b"true" } else { b"false" }),
        Value::Number(n) => write_number(n, out)?,
        Value::String(s) => write_json_string(s, out),
        Value::Array(items) => {
            out.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                // Absent elements inside an ordered sequence are not
                // representable in `serde_json::Value` — a `Value::Null`
                // already serializes as the null token, satisfying the rule.
                write_canonical(item, out)?;
            }
            out.push(b']');
        }
        Value::Object(map) => {
            out.push(b'{');
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut first = true;
            for key in keys {
                let v = &map[key];
                // Entries whose value is absent/undefined are omitted. `Value`
                // has no "undefined" — a present `null` is still emitted as
                // the null token per the Null rule.
                if !first {
                    out.push(b',');
                }
                first = false;
                write_json_string(key, out);
                out.push(b':');
                write_canonical(v, out)?;
            }
            out.push(b'}');
        }
    }
    Ok(())
}

fn write_number(n: &serde_json::Number, out: &mut Vec<u8>) -> Result<()> {
    if let Some(i) = n.as_i64() {
        out.extend_from_slice(i.to_string().as_bytes());
        return Ok(());
    }
    if let Some(u) = n.as_u64() {
        out.extend_from_slice(u.to_string().as_bytes());
        return Ok(());
    }
    let f = n.as_f64().ok_or_else(|| {
        LedgerError::ValidationFailed(format!("number '{n}' has no representable value"))
    })?;
    if !f.is_finite() {
        return Err(LedgerError::ValidationFailed(
            "non-finite numbers cannot be canonically serialized".into(),
        ));
    }
    out.extend_from_slice(n.to_string().as_bytes());
    Ok(())
}

fn write_json_string(s: &str, out: &mut Vec<u8>) {
    // serde_json's string escaping is already canonical (no extra whitespace,
    // stable escape table); reuse it instead of hand-rolling one.
    let encoded = serde_json::to_string(s).expect("string serialization cannot fail");
    out.extend_from_slice(encoded.as_bytes());
}

/// Encode an arbitrary-precision integer as the string-wrapped base-10 token
/// the spec's table calls for (distinct from `Value::Number`, which is
/// bounded by IEEE-754/ i64/u64 range).
pub fn bigint_token(digits: &str) -> Value {
    Value::String(digits.to_string())
}

/// Encode a binary blob as base64 with no newlines, per the rules table.
pub fn binary_token(bytes: &[u8]) -> Value {
    use base64::Engine;
    Value::String(base64::engine::general_purpose::STANDARD.encode(bytes))
}

/// Encode a time instant as ISO-8601 UTC with millisecond precision.
pub fn time_token(at: chrono::DateTime<chrono::Utc>) -> Value {
    Value::String(at.to_rfc3339_opts(chrono::SecondsFormat::Millis, true))
}

/// `evidence_set_hash(hashes[])` — spec §4.1: filter empty strings, sort
/// ascending, join with `"|"`, SHA-256 of the result. Order-independent.
pub fn evidence_set_hash(hashes: &[String]) -> String {
    let mut filtered: Vec<&str> = hashes.iter().map(String::as_str).filter(|h| !h.is_empty()).collect();
    filtered.sort_unstable();
    sha256_hex(filtered.join("|").as_bytes())
}

/// `asset_state_hash({claim_json, evidence_hashes[], ruleset_version})` —
/// canonical-hash of `{ruleset_version, claim_json, evidence_set_hash}`.
pub fn asset_state_hash(
    claim_json: &Value,
    evidence_hashes: &[String],
    ruleset_version: &str,
) -> Result<String> {
    let esh = evidence_set_hash(evidence_hashes);
    let composite = serde_json::json!({
        "ruleset_version": ruleset_version,
        "claim_json": claim_json,
        "evidence_set_hash": esh,
    });
    canonical_hash_hex(&composite)
}
