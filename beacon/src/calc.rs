//! Beacon derivation and sync broadcasting.
//!
//! After the last round drains, the node's own last-round valid votes are
//! sorted ascending and their tags hashed back-to-back into the 32-byte
//! beacon. The value is committed write-once to the registry (closing the
//! readiness signal), persisted to the external store, and offered to
//! peers on the sync channel.

use pharos_types::{Beacon, EpochId, RoundId};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::engine::EngineCore;
use crate::error::BeaconError;
use crate::messages::{
    BeaconSyncMessage, Sealed, BEACON_SYNC_CHANNEL, BEACON_SYNC_PREV_CHANNEL,
};
use crate::registry::EpochState;
use crate::scheduler::{broadcast_with_retry, compute_own_votes};
use crate::votes::VoteSet;

/// Hash a vote set's valid proposals into a beacon.
///
/// `BTreeSet` iteration yields the tags in ascending order, so the digest
/// is independent of insertion order.
pub fn beacon_from_votes(votes: &VoteSet) -> Beacon {
    let mut hasher = Sha256::new();
    for proposal in &votes.valid {
        hasher.update(proposal.as_bytes());
    }
    Beacon::new(hasher.finalize().into())
}

/// Derive and commit the epoch's beacon.
pub(crate) async fn derive_beacon(
    core: &EngineCore,
    state: &EpochState,
    epoch: EpochId,
) -> Result<Beacon, BeaconError> {
    let last_round = RoundId::new(core.config.rounds);

    let own = {
        let votes = state.votes.read().expect("vote store lock poisoned");
        votes.own_votes(last_round).cloned()
    };
    let own = match own {
        Some(votes) => votes,
        None => {
            debug!(epoch = %epoch, round = %last_round,
                "own last-round votes missing, recomputing from margins");
            compute_own_votes(core, state, epoch, last_round, last_round)?
        }
    };

    let beacon = beacon_from_votes(&own);
    info!(epoch = %epoch, beacon = %beacon, proposals = own.valid.len(), "calculated beacon");

    if core.beacons.set_once(epoch, beacon) {
        core.metrics.beacons_calculated.inc();
    } else {
        warn!(epoch = %epoch, "beacon already recorded for epoch, keeping existing value");
    }
    // Persist and gossip whatever the registry committed, which may be a
    // peer-synced value that arrived first.
    let committed = core.beacons.get(epoch).unwrap_or(beacon);

    if let Err(e) = core.beacon_store.set(epoch, committed) {
        warn!(epoch = %epoch, error = %e, "persisting beacon failed");
    }
    if let Err(e) = broadcast_beacon_sync(core, epoch, committed, false).await {
        warn!(epoch = %epoch, error = %e, "beacon sync broadcast failed");
    }

    Ok(committed)
}

/// Offer a calculated beacon to peers. The previous-epoch channel exists
/// for peers that are a whole epoch behind.
pub(crate) async fn broadcast_beacon_sync(
    core: &EngineCore,
    epoch: EpochId,
    beacon: Beacon,
    previous: bool,
) -> Result<(), BeaconError> {
    let channel = if previous {
        BEACON_SYNC_PREV_CHANNEL
    } else {
        BEACON_SYNC_CHANNEL
    };
    let message = Sealed::seal(
        BeaconSyncMessage {
            miner_id: core.node_id,
            epoch,
            beacon,
        },
        core.signer.as_ref(),
    )?;
    broadcast_with_retry(core, channel, message.to_bytes()?).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use pharos_types::{NodeId, Proposal};
    use crate::votes::{adopt_votes, FirstRoundVotes, VoteStore};

    fn p(s: &str) -> Proposal {
        Proposal::from_hex(s).unwrap()
    }

    fn node(byte: u8) -> NodeId {
        NodeId::new([byte; 32])
    }

    #[test]
    fn beacon_from_own_last_round_votes() {
        // Valid votes {0x1, 0x2, 0x4, 0x5} hash to this exact beacon.
        let votes = VoteSet::new(
            [p("0x1"), p("0x2"), p("0x4"), p("0x5")],
            [p("0x3"), p("0x6")],
        );
        let expected = Beacon::from_hex(
            "0xd04dd0faf9b5d3baf04dd99152971b5db67b0b3c79e5cc59f8f7b03ab20673f8",
        )
        .unwrap();
        assert_eq!(beacon_from_votes(&votes), expected);
    }

    #[test]
    fn beacon_ignores_insertion_order() {
        let a = VoteSet::new([p("0x5"), p("0x1"), p("0x4"), p("0x2")], []);
        let b = VoteSet::new([p("0x1"), p("0x2"), p("0x4"), p("0x5")], []);
        assert_eq!(beacon_from_votes(&a), beacon_from_votes(&b));
    }

    #[test]
    fn beacon_of_empty_vote_set_is_hash_of_nothing() {
        let beacon = beacon_from_votes(&VoteSet::default());
        // SHA-256 of the empty string.
        let expected = Beacon::from_hex(
            "0xe3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855",
        )
        .unwrap();
        assert_eq!(beacon, expected);
    }

    #[test]
    fn beacon_from_three_round_voter_stream() {
        // Two voters with unit weight across three rounds; the accumulated
        // margins decide every proposal by sign, reproducing the beacon of
        // the own-vote fixture above.
        let mut store = VoteStore::new();
        store.insert_first_round(
            node(1),
            FirstRoundVotes::new(vec![p("0x1"), p("0x2")], vec![p("0x3")]),
        );
        store.insert_first_round(
            node(2),
            FirstRoundVotes::new(vec![p("0x1"), p("0x4"), p("0x5")], vec![p("0x6")]),
        );
        store.insert_following(
            RoundId::new(2),
            node(1),
            VoteSet::new([p("0x3")], [p("0x2")]),
        );
        store.insert_following(RoundId::new(2), node(2), VoteSet::default());
        store.insert_following(RoundId::new(3), node(1), VoteSet::default());
        store.insert_following(
            RoundId::new(3),
            node(2),
            VoteSet::new([p("0x6")], [p("0x5")]),
        );

        let margins = store.margins(RoundId::new(3), |_| 1);
        let own = adopt_votes(&margins, 0, true);
        assert_eq!(
            own.valid.iter().copied().collect::<Vec<_>>(),
            vec![p("0x1"), p("0x2"), p("0x4"), p("0x5")]
        );

        let expected = Beacon::from_hex(
            "0xd04dd0faf9b5d3baf04dd99152971b5db67b0b3c79e5cc59f8f7b03ab20673f8",
        )
        .unwrap();
        assert_eq!(beacon_from_votes(&own), expected);
    }
}
