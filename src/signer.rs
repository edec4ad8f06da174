//! Signer abstraction (spec §4.2).

use ed25519_dalek::{Signer as _, SigningKey};
use sha2::{Digest, Sha256};

/// A key-identified signer over raw bytes.
pub trait Signer: Send + Sync {
    /// Stable identifier for the key this signer holds.
    fn key_id(&self) -> &str;
    /// Sign `bytes`, returning the detached signature.
    fn sign(&self, bytes: &[u8]) -> Vec<u8>;
}

/// Ed25519 keypair derived deterministically from a configured seed:
/// SHA-256 of the seed, first 32 bytes, used as the Ed25519 seed.
pub struct Ed25519Signer {
    signing_key: SigningKey,
    key_id: String,
}

impl Ed25519Signer {
    pub fn from_seed(seed: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(seed);
        let digest = hasher.finalize();
        let mut seed32 = [0u8; 32];
        seed32.copy_from_slice(&digest[..32]);

        let signing_key = SigningKey::from_bytes(&seed32);
        let verifying_key = signing_key.verifying_key();

        let mut pk_hasher = Sha256::new();
        pk_hasher.update(verifying_key.as_bytes());
        let key_id = format!("dev-ed25519:{}", hex::encode(pk_hasher.finalize()));

        Self { signing_key, key_id }
    }
}

impl Signer for Ed25519Signer {
    fn key_id(&self) -> &str {
        &self.key_id
    }

    fn sign(&self, bytes: &[u8]) -> Vec<u8> {
        self.signing_key.sign(bytes).to_bytes().to_vec()
    }
}

/// The reserved signature name the ledger always populates.
pub const PROVIDER_SIG_NAME: &str = "provider_sig";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_derives_same_key_id() {
        let a = Ed25519Signer::from_seed(b"a-test-seed");
        let b = Ed25519Signer::from_seed(b"a-test-seed");
        assert_eq!(a.key_id(), b.key_id());
    }

    #[test]
    fn different_seeds_derive_different_key_ids() {
        let a = Ed25519Signer::from_seed(b"seed-one");
        let b = Ed25519Signer::from_seed(b"seed-two");
        assert_ne!(a.key_id(), b.key_id());
    }

    #[test]
    fn key_id_has_the_dev_ed25519_prefix() {
        let signer = Ed25519Signer::from_seed(b"whatever");
        assert!(signer.key_id().starts_with("dev-ed25519:"));
    }

    #[test]
    fn signature_is_deterministic_for_the_same_bytes() {
        let signer = Ed25519Signer::from_seed(b"seed");
        let payload = b"canonical payload bytes";
        assert_eq!(signer.sign(payload), signer.sign(payload));
    }

    #[test]
    fn signature_verifies_against_the_derived_public_key() {
        use ed25519_dalek::{Signature, Verifier, VerifyingKey};

        let seed = b"verify-me";
        let mut hasher = Sha256::new();
        hasher.update(seed);
        let digest = hasher.finalize();
        let mut seed32 = [0u8; 32];
        seed32.copy_from_slice(&digest[..32]);
        let signing_key = SigningKey::from_bytes(&seed32);
        let verifying_key: VerifyingKey = signing_key.verifying_key();

        let signer = Ed25519Signer::from_seed(seed);
        let payload = b"payload";
        let sig_bytes = signer.sign(payload);
        let sig = Signature::from_bytes(sig_bytes.as_slice().try_into().unwrap());
        assert!(verifying_key.verify_strict(payload, &sig).is_ok());
    }
}
