//! End-to-end engine tests against nullable collaborators.
//!
//! A loopback pump feeds every broadcast frame back into the engine's own
//! intake, standing in for the gossip network.

use std::sync::Arc;
use std::time::{Duration, Instant};

use pharos_beacon::calc::beacon_from_votes;
use pharos_beacon::messages::{
    proposal_preimage, proposal_tag, BeaconSyncMessage, FirstVotingMessage, Sealed,
    BEACON_SYNC_CHANNEL, BEACON_SYNC_PREV_CHANNEL, FIRST_VOTING_CHANNEL,
    FOLLOWING_VOTING_CHANNEL, PROPOSAL_CHANNEL,
};
use pharos_beacon::traits::{BeaconStore, IdentitySigner};
use pharos_beacon::votes::VoteSet;
use pharos_beacon::{BeaconConfig, BeaconEngine, BeaconError, EdSigner, IntakeReject, WeightMode};
use pharos_nullables::weakcoin::CoinCall;
use pharos_nullables::{
    NullActivationDb, NullBeaconStore, NullBroadcaster, NullLayerClock, NullVrf, NullWeakCoin,
};
use pharos_types::{Beacon, EpochId, LayerId, NodeId, Proposal, RoundId};

struct Harness {
    engine: Arc<BeaconEngine>,
    clock: Arc<NullLayerClock>,
    broadcaster: Arc<NullBroadcaster>,
    activation: Arc<NullActivationDb>,
    store: Arc<NullBeaconStore>,
    coin: Arc<NullWeakCoin>,
    node_id: NodeId,
}

impl Harness {
    fn new(config: BeaconConfig) -> Self {
        let signer = Arc::new(EdSigner::from_seed(&[1u8; 32]));
        let node_id = signer.public_key();
        let clock = Arc::new(NullLayerClock::new());
        let broadcaster = Arc::new(NullBroadcaster::new());
        let activation = Arc::new(NullActivationDb::new());
        let store = Arc::new(NullBeaconStore::new());
        let coin = Arc::new(NullWeakCoin::new(true));
        activation.register(node_id, 1);

        let engine = BeaconEngine::new(
            config,
            signer,
            Arc::new(NullVrf::signer(node_id)),
            Arc::new(NullVrf),
            Arc::clone(&broadcaster) as Arc<dyn pharos_beacon::traits::Broadcaster>,
            Arc::clone(&activation) as Arc<dyn pharos_beacon::traits::ActivationDb>,
            Arc::clone(&store) as Arc<dyn pharos_beacon::traits::BeaconStore>,
            Arc::clone(&coin) as Arc<dyn pharos_beacon::weakcoin::WeakCoin>,
            Arc::clone(&clock) as Arc<dyn pharos_beacon::traits::LayerClock>,
        )
        .expect("engine construction");

        Self {
            engine: Arc::new(engine),
            clock,
            broadcaster,
            activation,
            store,
            coin,
            node_id,
        }
    }

    /// Feed broadcast frames back into the engine, like gossip would.
    fn spawn_loopback(&self) -> tokio::task::JoinHandle<()> {
        let engine = Arc::clone(&self.engine);
        let broadcaster = Arc::clone(&self.broadcaster);
        tokio::spawn(async move {
            let mut seen = 0;
            loop {
                let frames = broadcaster.sent();
                for (channel, bytes) in frames.iter().skip(seen) {
                    let _ = engine.handle_message(channel, bytes);
                }
                seen = frames.len();
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
    }
}

/// Three fast rounds; everything is eligible and every voter weighs 1.
fn fast_config() -> BeaconConfig {
    let mut config = BeaconConfig::default();
    config.rounds = 3;
    // A huge κ saturates the eligibility threshold, so every proposal
    // passes regardless of the signature value.
    config.kappa = 1_000_000;
    config.q = "1/3".to_string();
    config.theta = "0".to_string();
    config.weight_mode = WeightMode::Unit;
    config.grace_period_ms = 80;
    config.proposal_duration_ms = 80;
    config.first_voting_round_duration_ms = 80;
    config.voting_round_duration_ms = 50;
    config.weak_coin_round_duration_ms = 30;
    config.cleanup_interval_ms = 60_000;
    config.layers_per_epoch = 4;
    config
}

fn voter(seed: u8) -> EdSigner {
    EdSigner::from_seed(&[seed; 32])
}

#[tokio::test]
async fn full_epoch_produces_the_expected_beacon() {
    let harness = Harness::new(fast_config());
    harness.engine.start().await;
    let pump = harness.spawn_loopback();

    let epoch = EpochId::new(2);
    harness.clock.tick(LayerId::new(8));

    let beacon = harness.engine.get_beacon(epoch).await.expect("beacon");

    // The only voter is this node itself (via loopback), so the beacon is
    // the digest of its own proposal tag.
    let own_tag = proposal_tag(&NullVrf::signature_for(
        &harness.node_id,
        &proposal_preimage(epoch),
    ));
    let expected = beacon_from_votes(&VoteSet::new([own_tag], []));
    assert_eq!(beacon, expected);

    // Write-through persisted the value.
    assert_eq!(harness.store.get(epoch), Some(beacon));

    // Every protocol channel saw traffic.
    assert_eq!(harness.broadcaster.sent_on(PROPOSAL_CHANNEL).len(), 1);
    assert_eq!(harness.broadcaster.sent_on(FIRST_VOTING_CHANNEL).len(), 1);
    assert_eq!(harness.broadcaster.sent_on(FOLLOWING_VOTING_CHANNEL).len(), 2);
    assert_eq!(harness.broadcaster.sent_on(BEACON_SYNC_CHANNEL).len(), 1);
    // The genesis beacon of epoch 1 went out for lagging peers.
    assert_eq!(harness.broadcaster.sent_on(BEACON_SYNC_PREV_CHANNEL).len(), 1);

    pump.abort();
    harness.engine.close().await;
}

#[tokio::test]
async fn weak_coin_lifecycle_ordering() {
    let harness = Harness::new(fast_config());
    harness.engine.start().await;

    let epoch = EpochId::new(2);
    harness.clock.tick(LayerId::new(8));
    harness.engine.get_beacon(epoch).await.expect("beacon");

    let round = RoundId::new;
    assert_eq!(
        harness.coin.calls(),
        vec![
            CoinCall::Started(epoch, round(2)),
            CoinCall::Published(epoch, round(2)),
            CoinCall::Finished(epoch, round(2)),
            CoinCall::Started(epoch, round(3)),
            CoinCall::Published(epoch, round(3)),
            CoinCall::Finished(epoch, round(3)),
        ]
    );

    harness.engine.close().await;
}

#[tokio::test]
async fn peer_votes_reach_the_beacon() {
    let harness = Harness::new(fast_config());
    harness.engine.start().await;
    let pump = harness.spawn_loopback();

    let epoch = EpochId::new(2);
    harness.clock.tick(LayerId::new(8));
    // A second voter endorses a proposal this node never saw; with unit
    // weights and a zero threshold its positive margin wins a slot in the
    // beacon hash list.
    tokio::time::sleep(Duration::from_millis(20)).await;
    let peer = voter(2);
    let peer_tag = Proposal::from_hex("0x1").unwrap();
    let vote = Sealed::seal(
        FirstVotingMessage {
            miner_id: peer.public_key(),
            valid_proposals: vec![peer_tag],
            potentially_valid_proposals: vec![],
        },
        &peer,
    )
    .unwrap();
    harness
        .engine
        .handle_message(FIRST_VOTING_CHANNEL, &vote.to_bytes().unwrap())
        .expect("peer vote accepted");

    let beacon = harness.engine.get_beacon(epoch).await.expect("beacon");

    let own_tag = proposal_tag(&NullVrf::signature_for(
        &harness.node_id,
        &proposal_preimage(epoch),
    ));
    let expected = beacon_from_votes(&VoteSet::new([own_tag, peer_tag], []));
    assert_eq!(beacon, expected);

    pump.abort();
    harness.engine.close().await;
}

#[tokio::test]
async fn ineligible_node_stays_silent_but_keeps_voting() {
    let mut config = fast_config();
    // κ = 0 collapses the eligibility threshold to zero, so the node's
    // own proposal never qualifies.
    config.kappa = 0;
    let harness = Harness::new(config);
    harness.engine.start().await;

    let epoch = EpochId::new(2);
    harness.clock.tick(LayerId::new(8));
    let beacon = harness.engine.get_beacon(epoch).await.expect("beacon");

    assert!(harness.broadcaster.sent_on(PROPOSAL_CHANNEL).is_empty());
    assert_eq!(harness.broadcaster.sent_on(FIRST_VOTING_CHANNEL).len(), 1);
    assert_eq!(harness.broadcaster.sent_on(FOLLOWING_VOTING_CHANNEL).len(), 2);
    // No proposals survive anywhere, so the hash list is empty.
    assert_eq!(beacon, beacon_from_votes(&VoteSet::default()));

    harness.engine.close().await;
}

#[tokio::test]
async fn duplicate_first_vote_leaves_state_unchanged() {
    let mut config = fast_config();
    // Keep the epoch in its proposal phase for the whole test.
    config.proposal_duration_ms = 60_000;
    let harness = Harness::new(config);
    harness.engine.start().await;
    harness.clock.tick(LayerId::new(8));
    tokio::time::sleep(Duration::from_millis(20)).await;

    let peer = voter(2);
    let first = Sealed::seal(
        FirstVotingMessage {
            miner_id: peer.public_key(),
            valid_proposals: vec![Proposal::from_hex("0x1").unwrap()],
            potentially_valid_proposals: vec![],
        },
        &peer,
    )
    .unwrap()
    .to_bytes()
    .unwrap();
    let second = Sealed::seal(
        FirstVotingMessage {
            miner_id: peer.public_key(),
            valid_proposals: vec![Proposal::from_hex("0x2").unwrap()],
            potentially_valid_proposals: vec![],
        },
        &peer,
    )
    .unwrap()
    .to_bytes()
    .unwrap();

    assert!(harness
        .engine
        .handle_message(FIRST_VOTING_CHANNEL, &first)
        .is_ok());
    assert_eq!(
        harness.engine.handle_message(FIRST_VOTING_CHANNEL, &second),
        Err(IntakeReject::Duplicate)
    );
    assert_eq!(harness.engine.metrics().duplicate_votes_dropped.get(), 1);
    assert_eq!(harness.engine.metrics().first_votes_accepted.get(), 1);

    harness.engine.close().await;
}

#[tokio::test]
async fn malformed_frames_are_counted_not_fatal() {
    let harness = Harness::new(fast_config());
    harness.engine.start().await;

    assert_eq!(
        harness.engine.handle_message(PROPOSAL_CHANNEL, &[0xDE, 0xAD]),
        Err(IntakeReject::Malformed("undecodable proposal frame"))
    );
    assert_eq!(
        harness.engine.handle_message("NoSuchChannel", &[]),
        Err(IntakeReject::Malformed("unknown channel"))
    );
    assert_eq!(harness.engine.metrics().malformed_dropped.get(), 2);

    harness.engine.close().await;
}

#[tokio::test]
async fn genesis_epochs_answer_immediately_with_zero() {
    let harness = Harness::new(fast_config());
    harness.engine.start().await;

    for epoch in [EpochId::new(0), EpochId::new(1)] {
        let started = Instant::now();
        let beacon = harness.engine.get_beacon(epoch).await.expect("genesis");
        assert_eq!(beacon, Beacon::ZERO);
        assert!(started.elapsed() < Duration::from_millis(100));
    }

    harness.engine.close().await;
}

#[tokio::test]
async fn unknown_epoch_is_not_calculated() {
    let harness = Harness::new(fast_config());
    harness.engine.start().await;
    harness.clock.tick(LayerId::new(8));
    tokio::time::sleep(Duration::from_millis(10)).await;

    let result = harness.engine.get_beacon(EpochId::new(50)).await;
    assert!(matches!(result, Err(BeaconError::NotCalculated(_))));

    harness.engine.close().await;
}

#[tokio::test]
async fn weight_failure_aborts_epoch_and_waiters_time_out() {
    let mut config = fast_config();
    config.rounds = 2;
    let harness = Harness::new(config);
    harness.activation.fail_epoch_weight(true);
    harness.engine.start().await;
    harness.clock.tick(LayerId::new(8));

    let result = harness.engine.get_beacon(EpochId::new(2)).await;
    assert!(matches!(result, Err(BeaconError::Timeout(_))));
    assert!(harness.store.is_empty());

    harness.engine.close().await;
}

#[tokio::test]
async fn shutdown_mid_epoch_records_no_beacon() {
    let mut config = fast_config();
    config.proposal_duration_ms = 60_000;
    let harness = Harness::new(config);
    harness.engine.start().await;
    harness.clock.tick(LayerId::new(8));
    tokio::time::sleep(Duration::from_millis(20)).await;

    harness.engine.close().await;

    assert!(harness.store.is_empty());
    let result = harness.engine.get_beacon(EpochId::new(2)).await;
    assert!(matches!(result, Err(BeaconError::Shutdown)));
}

#[tokio::test]
async fn broadcast_failure_is_retried_once_and_epoch_completes() {
    let harness = Harness::new(fast_config());
    harness.engine.start().await;
    harness.broadcaster.fail_next(1);
    harness.clock.tick(LayerId::new(8));

    let beacon = harness.engine.get_beacon(EpochId::new(2)).await;
    assert!(beacon.is_ok());
    assert_eq!(harness.engine.metrics().broadcast_retries.get(), 1);

    harness.engine.close().await;
}

#[tokio::test]
async fn peer_sync_fills_vacant_slot_only() {
    let mut config = fast_config();
    config.proposal_duration_ms = 60_000; // hold the scheduler in its phase
    let harness = Harness::new(config);
    harness.engine.start().await;
    harness.clock.tick(LayerId::new(8));
    tokio::time::sleep(Duration::from_millis(20)).await;

    let peer = voter(2);
    let epoch = EpochId::new(2);
    let offered = Beacon::new([0xAB; 32]);
    let sync = Sealed::seal(
        BeaconSyncMessage {
            miner_id: peer.public_key(),
            epoch,
            beacon: offered,
        },
        &peer,
    )
    .unwrap()
    .to_bytes()
    .unwrap();
    harness
        .engine
        .handle_message(BEACON_SYNC_CHANNEL, &sync)
        .expect("sync adopted");

    assert_eq!(harness.engine.get_beacon(epoch).await.unwrap(), offered);
    assert_eq!(harness.engine.metrics().beacons_synced.get(), 1);

    // A competing offer cannot overwrite the committed value.
    let competing = Sealed::seal(
        BeaconSyncMessage {
            miner_id: peer.public_key(),
            epoch,
            beacon: Beacon::new([0xCD; 32]),
        },
        &peer,
    )
    .unwrap()
    .to_bytes()
    .unwrap();
    harness
        .engine
        .handle_message(BEACON_SYNC_CHANNEL, &competing)
        .expect("ignored without error");
    assert_eq!(harness.engine.get_beacon(epoch).await.unwrap(), offered);
    assert_eq!(harness.engine.metrics().beacons_synced.get(), 1);

    harness.engine.close().await;
}

#[tokio::test]
async fn future_epoch_sync_is_rejected() {
    let harness = Harness::new(fast_config());
    harness.engine.start().await;
    harness.clock.tick(LayerId::new(8));
    tokio::time::sleep(Duration::from_millis(10)).await;

    let peer = voter(2);
    let sync = Sealed::seal(
        BeaconSyncMessage {
            miner_id: peer.public_key(),
            epoch: EpochId::new(40),
            beacon: Beacon::new([0xAB; 32]),
        },
        &peer,
    )
    .unwrap()
    .to_bytes()
    .unwrap();

    assert_eq!(
        harness.engine.handle_message(BEACON_SYNC_CHANNEL, &sync),
        Err(IntakeReject::UnknownEpoch)
    );

    harness.engine.close().await;
}

#[tokio::test]
async fn atx_mode_rejects_voters_without_activation() {
    let mut config = fast_config();
    config.proposal_duration_ms = 60_000;
    config.weight_mode = WeightMode::Atx;
    let harness = Harness::new(config);
    harness.engine.start().await;
    harness.clock.tick(LayerId::new(8));
    tokio::time::sleep(Duration::from_millis(20)).await;

    // voter(3) has no registered ATX, so its weight resolves to zero.
    let stranger = voter(3);
    let vote = Sealed::seal(
        FirstVotingMessage {
            miner_id: stranger.public_key(),
            valid_proposals: vec![Proposal::from_hex("0x1").unwrap()],
            potentially_valid_proposals: vec![],
        },
        &stranger,
    )
    .unwrap()
    .to_bytes()
    .unwrap();

    assert_eq!(
        harness.engine.handle_message(FIRST_VOTING_CHANNEL, &vote),
        Err(IntakeReject::Ineligible)
    );
    assert_eq!(harness.engine.metrics().ineligible_dropped.get(), 1);

    harness.engine.close().await;
}
