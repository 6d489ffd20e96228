//! Nullable VRF — deterministic hash-based signatures.

use pharos_beacon::traits::{VrfSigner, VrfVerifier};
use pharos_types::{NodeId, VrfSignature};
use sha2::{Digest, Sha256};

/// A fake VRF whose "signature" is a keyed hash of the message.
///
/// Signatures are 64 bytes like the real thing, spread uniformly over the
/// signature space, and verifiable by recomputation.
pub struct NullVrf;

impl NullVrf {
    /// The deterministic signature `node` produces over `message`.
    pub fn signature_for(node: &NodeId, message: &[u8]) -> VrfSignature {
        let mut front = Sha256::new();
        front.update(node.as_bytes());
        front.update(message);
        let mut back = Sha256::new();
        back.update(message);
        back.update(node.as_bytes());

        let mut bytes = Vec::with_capacity(64);
        bytes.extend_from_slice(&front.finalize());
        bytes.extend_from_slice(&back.finalize());
        VrfSignature::new(bytes)
    }

    /// A signer producing this fake VRF's signatures for `node`.
    pub fn signer(node: NodeId) -> NullVrfSigner {
        NullVrfSigner { node }
    }
}

/// The signing half of [`NullVrf`].
pub struct NullVrfSigner {
    node: NodeId,
}

impl VrfSigner for NullVrfSigner {
    fn sign(&self, message: &[u8]) -> VrfSignature {
        NullVrf::signature_for(&self.node, message)
    }
}

impl VrfVerifier for NullVrf {
    fn verify(&self, public: &NodeId, message: &[u8], signature: &VrfSignature) -> bool {
        *signature == NullVrf::signature_for(public, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pharos_beacon::traits::VrfSigner as _;

    #[test]
    fn sign_verify_round_trip() {
        let node = NodeId::new([3u8; 32]);
        let signer = NullVrf::signer(node);
        let sig = signer.sign(b"message");
        assert_eq!(sig.as_bytes().len(), 64);
        assert!(NullVrf.verify(&node, b"message", &sig));
        assert!(!NullVrf.verify(&node, b"other", &sig));
        assert!(!NullVrf.verify(&NodeId::new([4u8; 32]), b"message", &sig));
    }
}
