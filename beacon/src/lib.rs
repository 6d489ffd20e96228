//! Pharos — epoch beacon agreement.
//!
//! Weighted participants agree on an unpredictable 32-byte beacon once per
//! epoch: an eligibility-gated proposal phase collects candidate VRF
//! signatures, K voting rounds accumulate weighted margins over them (with
//! a weak coin resolving the undecided remainder), and the surviving
//! proposals hash into the epoch beacon that seeds downstream eligibility.
//!
//! ## Module overview
//!
//! - [`engine`] — [`BeaconEngine`]: wiring, lifecycle, `get_beacon`.
//! - [`thresholds`] — eligibility fraction and voting threshold math.
//! - [`proposals`] — per-epoch valid / potentially-valid partition.
//! - [`votes`] — vote records, margin tally, own-vote adoption.
//! - [`codec`] — first-round lists ↔ following-round bit-vectors.
//! - [`weakcoin`] — gateway trait to the weak-coin oracle.
//! - [`messages`] — wire payloads and the sign-then-broadcast pipeline.
//! - [`registry`] — per-epoch state, beacon map, readiness signalling.
//! - [`traits`] — seams to transport, clock, ATX db, VRF, and storage.
//! - [`config`] / [`error`] / [`metrics`] / [`shutdown`] / [`signing`].

pub mod calc;
pub mod codec;
pub mod config;
pub mod engine;
pub mod error;
pub mod intake;
pub mod messages;
pub mod metrics;
pub mod proposals;
pub mod registry;
mod scheduler;
pub mod shutdown;
pub mod signing;
pub mod thresholds;
pub mod traits;
pub mod votes;
pub mod weakcoin;

pub use calc::beacon_from_votes;
pub use config::{BeaconConfig, WeightMode};
pub use engine::BeaconEngine;
pub use error::{BeaconError, IntakeReject};
pub use intake::MessageClass;
pub use messages::{
    BeaconSyncMessage, FirstVotingMessage, FollowingVotingMessage, ProposalMessage, Sealed,
    BEACON_SYNC_CHANNEL, BEACON_SYNC_PREV_CHANNEL, FIRST_VOTING_CHANNEL,
    FOLLOWING_VOTING_CHANNEL, PROPOSAL_CHANNEL,
};
pub use metrics::BeaconMetrics;
pub use registry::{BeaconRegistry, EpochRegistry, EpochState};
pub use shutdown::ShutdownController;
pub use signing::EdSigner;
pub use traits::{
    ActivationDb, AtxHeader, AtxId, BeaconStore, Broadcaster, IdentitySigner, LayerClock,
    VrfSigner, VrfVerifier,
};
pub use votes::{FirstRoundVotes, VoteSet, VoteStore};
pub use weakcoin::WeakCoin;
