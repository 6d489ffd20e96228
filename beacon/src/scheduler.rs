//! The per-epoch round scheduler.
//!
//! One scheduler task drives an epoch through its fixed pipeline: proposal
//! phase, first voting round, following rounds 2..=K with their weak-coin
//! sub-windows, a drain window for straggling honest voters, and finally
//! beacon derivation. Shutdown unblocks every timer; an epoch interrupted
//! by shutdown records no beacon and its readiness signal stays pending.

use pharos_types::{EpochId, RoundId};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::calc;
use crate::codec::encode_votes;
use crate::engine::EngineCore;
use crate::error::BeaconError;
use crate::messages::{
    proposal_preimage, proposal_tag, FirstVotingMessage, FollowingVotingMessage, ProposalMessage,
    Sealed, FIRST_VOTING_CHANNEL, FOLLOWING_VOTING_CHANNEL, PROPOSAL_CHANNEL,
};
use crate::registry::EpochState;
use crate::thresholds::{atx_threshold, passes_eligibility, voting_threshold};
use crate::votes::{adopt_votes, VoteSet};

/// Rounds' worth of drain time after the last round starts: the last round
/// itself, one round for timely stragglers, one for delayed ones.
const DRAIN_ROUNDS: u32 = 3;

/// Drive one epoch from proposal phase to beacon.
pub(crate) async fn run_epoch(core: Arc<EngineCore>, epoch: EpochId) {
    info!(epoch = %epoch, "starting beacon protocol");

    core.beacons.ensure_slot(epoch);
    sync_previous_beacon(&core, epoch).await;

    let state = core.epochs.get_or_create(epoch);

    match run_proposal_phase(&core, &state, epoch).await {
        Ok(()) => {}
        Err(BeaconError::Shutdown) => {
            info!(epoch = %epoch, "shutdown during proposal phase");
            return;
        }
        Err(e) => {
            error!(epoch = %epoch, error = %e, "proposal phase failed, abandoning epoch");
            return;
        }
    }

    match run_voting_rounds(&core, &state, epoch).await {
        Ok(()) => {}
        Err(BeaconError::Shutdown) => {
            info!(epoch = %epoch, "shutdown during voting rounds");
            return;
        }
        Err(e) => {
            // Votes received so far may still produce an agreeable beacon.
            error!(epoch = %epoch, error = %e, "voting rounds failed");
        }
    }

    if let Err(e) = calc::derive_beacon(&core, &state, epoch).await {
        error!(epoch = %epoch, error = %e, "beacon derivation failed");
    }
}

/// Compute, test, and broadcast this node's proposal, then hold the phase
/// open for its configured duration.
async fn run_proposal_phase(
    core: &EngineCore,
    state: &EpochState,
    epoch: EpochId,
) -> Result<(), BeaconError> {
    let vrf_signature = core.vrf_signer.sign(&proposal_preimage(epoch));
    let epoch_weight = core.epoch_weight(epoch)?;
    let threshold = atx_threshold(core.config.kappa, &core.q, epoch_weight);

    if passes_eligibility(&vrf_signature, &threshold) {
        info!(epoch = %epoch, weight = epoch_weight, "own proposal passes eligibility threshold");
        let tag = proposal_tag(&vrf_signature);
        let message = Sealed::seal(
            ProposalMessage {
                miner_id: core.node_id,
                vrf_signature,
            },
            core.signer.as_ref(),
        )?;
        if let Err(e) = broadcast_with_retry(core, PROPOSAL_CHANNEL, message.to_bytes()?).await {
            warn!(epoch = %epoch, error = %e, "proposal broadcast failed");
        }
        state
            .proposals
            .write()
            .expect("proposal store lock poisoned")
            .insert_timely(tag);
    } else {
        // Not an error: the node stays silent this epoch but keeps voting.
        info!(epoch = %epoch, weight = epoch_weight, "own proposal below eligibility threshold");
    }

    sleep_unless_shutdown(core, core.config.proposal_duration()).await?;
    *state
        .proposal_phase_finished
        .write()
        .expect("phase timestamp lock poisoned") = Some(Instant::now());
    Ok(())
}

/// Round 1 plus the following rounds 2..=K and the drain window.
async fn run_voting_rounds(
    core: &EngineCore,
    state: &EpochState,
    epoch: EpochId,
) -> Result<(), BeaconError> {
    set_current_round(state, RoundId::FIRST);

    // Freeze the proposal partition; it is the basis of this node's first
    // vote and the reference frame of all its later bit-vectors.
    let first_round = state
        .proposals
        .write()
        .expect("proposal store lock poisoned")
        .snapshot();
    {
        let mut votes = state.votes.write().expect("vote store lock poisoned");
        votes.freeze_own_first_round(first_round.clone());
        votes.set_own_votes(RoundId::FIRST, first_round.as_vote_set());
    }

    let message = Sealed::seal(
        FirstVotingMessage {
            miner_id: core.node_id,
            valid_proposals: first_round.valid.clone(),
            potentially_valid_proposals: first_round.potentially_valid.clone(),
        },
        core.signer.as_ref(),
    )?;
    debug!(epoch = %epoch, valid = first_round.valid.len(),
        potentially_valid = first_round.potentially_valid.len(), "sending first-round vote");
    if let Err(e) = broadcast_with_retry(core, FIRST_VOTING_CHANNEL, message.to_bytes()?).await {
        warn!(epoch = %epoch, error = %e, "first-round vote broadcast failed");
    }

    sleep_unless_shutdown(core, core.config.first_voting_round_duration()).await?;

    let last_round = RoundId::new(core.config.rounds);
    for round in 2..=core.config.rounds {
        let round = RoundId::new(round);
        set_current_round(state, round);

        // Finishing the previous round first keeps the coin query legal
        // when resolving this round's undecided proposals.
        if round.as_u32() > 2 {
            core.weak_coin.on_round_finished(epoch, round.prev());
        }

        match send_following_votes(core, state, epoch, round).await {
            Ok(()) => {}
            Err(BeaconError::Shutdown) => return Err(BeaconError::Shutdown),
            Err(e) => warn!(epoch = %epoch, round = %round, error = %e,
                "sending following votes failed"),
        }

        sleep_unless_shutdown(core, core.config.voting_round_duration()).await?;

        core.weak_coin.on_round_started(epoch, round);
        publish_coin_share(core, epoch, round).await?;
    }

    // Keep accepting timely and delayed last-round messages before tallying.
    sleep_unless_shutdown(core, DRAIN_ROUNDS * core.config.round_duration()).await?;
    core.weak_coin.on_round_finished(epoch, last_round);
    Ok(())
}

/// Compute this node's votes for `round` and broadcast them as a
/// bit-vector against its frozen first-round lists.
async fn send_following_votes(
    core: &EngineCore,
    state: &EpochState,
    epoch: EpochId,
    round: RoundId,
) -> Result<(), BeaconError> {
    let own = compute_own_votes(core, state, epoch, round, round.prev())?;
    let first_round = state
        .votes
        .read()
        .expect("vote store lock poisoned")
        .own_first_round()
        .cloned()
        .unwrap_or_default();
    let bit_vector = encode_votes(&own, &first_round);

    let message = Sealed::seal(
        FollowingVotingMessage {
            miner_id: core.node_id,
            epoch,
            round,
            votes_bit_vector: bit_vector,
        },
        core.signer.as_ref(),
    )?;
    debug!(epoch = %epoch, round = %round, valid = own.valid.len(),
        invalid = own.invalid.len(), "sending following-round vote");
    broadcast_with_retry(core, FOLLOWING_VOTING_CHANNEL, message.to_bytes()?).await
}

/// Adopt this node's votes for `vote_round` from the margins accumulated
/// through `tally_round`, with that round's weak coin resolving the
/// undecided remainder. The result is recorded as the node's own votes.
pub(crate) fn compute_own_votes(
    core: &EngineCore,
    state: &EpochState,
    epoch: EpochId,
    vote_round: RoundId,
    tally_round: RoundId,
) -> Result<VoteSet, BeaconError> {
    let threshold = voting_threshold(&core.theta, core.epoch_weight(epoch)?);
    let margins = {
        let votes = state.votes.read().expect("vote store lock poisoned");
        votes.margins(tally_round, |voter| core.vote_weight(voter, epoch))
    };
    let coin = core.weak_coin.get(epoch, tally_round);
    let own = adopt_votes(&margins, threshold, coin);
    debug!(epoch = %epoch, round = %vote_round, threshold, coin,
        proposals = margins.len(), "adopted own votes");

    state
        .votes
        .write()
        .expect("vote store lock poisoned")
        .set_own_votes(vote_round, own.clone());
    Ok(own)
}

/// Publish this node's coin share, bounded by the coin sub-window.
/// Shutdown cancels the pending publish by dropping its future.
async fn publish_coin_share(
    core: &EngineCore,
    epoch: EpochId,
    round: RoundId,
) -> Result<(), BeaconError> {
    let mut shutdown_rx = core.shutdown.subscribe();
    if core.shutdown.is_shut_down() {
        return Err(BeaconError::Shutdown);
    }

    let window = tokio::time::sleep(core.config.weak_coin_round_duration());
    tokio::pin!(window);
    let publish = core.weak_coin.publish_proposal(epoch, round);
    tokio::pin!(publish);
    let mut published = false;

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => return Err(BeaconError::Shutdown),
            _ = &mut window => return Ok(()),
            result = &mut publish, if !published => {
                published = true;
                if let Err(e) = result {
                    warn!(epoch = %epoch, round = %round, error = %e,
                        "weak coin publish failed");
                }
            }
        }
    }
}

/// Re-offer the previous epoch's beacon for peers still catching up.
async fn sync_previous_beacon(core: &EngineCore, epoch: EpochId) {
    let prev = epoch.prev();
    let Some(beacon) = core.beacons.get(prev).or_else(|| core.beacon_store.get(prev)) else {
        return;
    };
    if let Err(e) = calc::broadcast_beacon_sync(core, prev, beacon, true).await {
        warn!(epoch = %prev, error = %e, "previous-beacon sync failed");
    }
}

fn set_current_round(state: &EpochState, round: RoundId) {
    *state
        .current_round
        .write()
        .expect("current round lock poisoned") = round;
}

/// Broadcast with the single retry the protocol allows; the second failure
/// is surfaced and the caller proceeds regardless.
pub(crate) async fn broadcast_with_retry(
    core: &EngineCore,
    channel: &'static str,
    bytes: Vec<u8>,
) -> Result<(), BeaconError> {
    match core.broadcaster.broadcast(channel, bytes.clone()).await {
        Ok(()) => Ok(()),
        Err(first) => {
            core.metrics.broadcast_retries.inc();
            warn!(channel, error = %first, "broadcast failed, retrying once");
            core.broadcaster.broadcast(channel, bytes).await
        }
    }
}

/// Sleep that a shutdown interrupts.
pub(crate) async fn sleep_unless_shutdown(
    core: &EngineCore,
    duration: Duration,
) -> Result<(), BeaconError> {
    let mut shutdown_rx = core.shutdown.subscribe();
    if core.shutdown.is_shut_down() {
        return Err(BeaconError::Shutdown);
    }
    tokio::select! {
        _ = tokio::time::sleep(duration) => Ok(()),
        _ = shutdown_rx.recv() => Err(BeaconError::Shutdown),
    }
}
