//! Ed25519 identity signing and verification.

use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};
use pharos_types::{NodeId, Signature};

use crate::traits::IdentitySigner;

/// The node's long-term Ed25519 identity key.
pub struct EdSigner {
    key: SigningKey,
}

impl EdSigner {
    pub fn new(key: SigningKey) -> Self {
        Self { key }
    }

    /// Derive the keypair deterministically from a 32-byte seed.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            key: SigningKey::from_bytes(seed),
        }
    }
}

impl IdentitySigner for EdSigner {
    fn public_key(&self) -> NodeId {
        NodeId::new(self.key.verifying_key().to_bytes())
    }

    fn sign(&self, message: &[u8]) -> Signature {
        Signature(self.key.sign(message).to_bytes())
    }
}

/// Verify an identity signature against a message and the signer's node id.
///
/// Returns `true` if the signature is valid, `false` otherwise (including
/// for node ids that are not valid curve points).
pub fn verify_signature(node: &NodeId, message: &[u8], signature: &Signature) -> bool {
    let Ok(verifying_key) = VerifyingKey::from_bytes(node.as_bytes()) else {
        return false;
    };
    let sig = ed25519_dalek::Signature::from_bytes(signature.as_bytes());
    verifying_key.verify(message, &sig).is_ok()
}
