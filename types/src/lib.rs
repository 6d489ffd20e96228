//! Fundamental types for the Pharos beacon protocol.
//!
//! This crate defines the identifiers shared across every other crate in the
//! workspace: epochs, rounds, layers, node identities, proposals, beacons,
//! and signatures.

pub mod epoch;
pub mod error;
pub mod hash;
pub mod keys;

pub use epoch::{EpochId, LayerId, RoundId, GENESIS_EPOCHS};
pub use error::TypeError;
pub use hash::{Beacon, Proposal};
pub use keys::{NodeId, Signature, VrfSignature};
