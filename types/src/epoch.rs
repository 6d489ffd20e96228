//! Epoch, round, and layer identifiers.
//!
//! The chain is divided into consecutive layers; a fixed number of layers
//! forms an epoch. The beacon protocol runs once per epoch, driven by the
//! first layer tick of that epoch, and iterates a fixed number of voting
//! rounds numbered from [`RoundId::FIRST`].

use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of bootstrap epochs that never run the protocol and use the
/// all-zero beacon.
pub const GENESIS_EPOCHS: u64 = 2;

/// A monotonic epoch number.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct EpochId(pub u64);

impl EpochId {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }

    /// Whether this epoch is part of the bootstrap window.
    pub fn is_genesis(&self) -> bool {
        self.0 < GENESIS_EPOCHS
    }

    /// The epoch before this one (saturating at zero).
    pub fn prev(&self) -> EpochId {
        EpochId(self.0.saturating_sub(1))
    }

    pub fn next(&self) -> EpochId {
        EpochId(self.0 + 1)
    }

    /// Big-endian byte representation, used as the persisted-store key and
    /// in the VRF proposal preimage.
    pub fn to_be_bytes(&self) -> [u8; 8] {
        self.0.to_be_bytes()
    }
}

impl fmt::Display for EpochId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A voting round inside an epoch, numbered 1..=K.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct RoundId(pub u32);

impl RoundId {
    /// The first voting round.
    pub const FIRST: RoundId = RoundId(1);

    pub fn new(value: u32) -> Self {
        Self(value)
    }

    pub fn as_u32(&self) -> u32 {
        self.0
    }

    pub fn prev(&self) -> RoundId {
        RoundId(self.0.saturating_sub(1))
    }

    pub fn next(&self) -> RoundId {
        RoundId(self.0 + 1)
    }
}

impl fmt::Display for RoundId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A monotonic layer number. Layers map onto epochs by a fixed
/// layers-per-epoch divisor supplied by configuration.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct LayerId(pub u64);

impl LayerId {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }

    /// The epoch this layer belongs to.
    pub fn epoch(&self, layers_per_epoch: u64) -> EpochId {
        EpochId(self.0 / layers_per_epoch.max(1))
    }

    /// Whether this layer is the first of its epoch.
    pub fn first_in_epoch(&self, layers_per_epoch: u64) -> bool {
        self.0 % layers_per_epoch.max(1) == 0
    }
}

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn genesis_window() {
        assert!(EpochId::new(0).is_genesis());
        assert!(EpochId::new(1).is_genesis());
        assert!(!EpochId::new(2).is_genesis());
        assert!(!EpochId::new(1000).is_genesis());
    }

    #[test]
    fn epoch_be_bytes() {
        assert_eq!(
            EpochId::new(5).to_be_bytes(),
            [0, 0, 0, 0, 0, 0, 0, 5]
        );
        assert_eq!(
            EpochId::new(0x0102_0304).to_be_bytes(),
            [0, 0, 0, 0, 1, 2, 3, 4]
        );
    }

    #[test]
    fn prev_saturates() {
        assert_eq!(EpochId::new(0).prev(), EpochId::new(0));
        assert_eq!(EpochId::new(7).prev(), EpochId::new(6));
        assert_eq!(RoundId::new(0).prev(), RoundId::new(0));
    }

    #[test]
    fn layer_to_epoch() {
        assert_eq!(LayerId::new(0).epoch(4), EpochId::new(0));
        assert_eq!(LayerId::new(3).epoch(4), EpochId::new(0));
        assert_eq!(LayerId::new(4).epoch(4), EpochId::new(1));
        assert_eq!(LayerId::new(21).epoch(4), EpochId::new(5));
    }

    #[test]
    fn first_in_epoch() {
        assert!(LayerId::new(0).first_in_epoch(4));
        assert!(!LayerId::new(1).first_in_epoch(4));
        assert!(LayerId::new(8).first_in_epoch(4));
        assert!(!LayerId::new(9).first_in_epoch(4));
    }

    #[test]
    fn zero_layers_per_epoch_does_not_divide_by_zero() {
        // Misconfiguration guard: treated as one layer per epoch.
        assert_eq!(LayerId::new(3).epoch(0), EpochId::new(3));
        assert!(LayerId::new(3).first_in_epoch(0));
    }
}
