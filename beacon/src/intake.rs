//! Inbound message classification and dispatch.
//!
//! Every incoming message is verified (frame, identity signature, sender
//! eligibility) and classified against the epoch's recorded proposal-phase
//! end before it touches a store:
//!
//! | class   | arrival relative to the phase's scheduled end |
//! |---------|-----------------------------------------------|
//! | timely  | up to δ after                                 |
//! | delayed | between δ and 2δ after                        |
//! | late    | beyond 2δ — discarded                         |
//!
//! Handlers never block: they take the store lock, update, and release.
//! Rejected messages are dropped with a counter increment; nothing here is
//! fatal.

use pharos_types::RoundId;
use std::time::{Duration, Instant};

use crate::codec::decode_votes;
use crate::config::BeaconConfig;
use crate::engine::EngineCore;
use crate::error::IntakeReject;
use crate::messages::{
    proposal_preimage, proposal_tag, BeaconSyncMessage, FirstVotingMessage,
    FollowingVotingMessage, ProposalMessage, Sealed, BEACON_SYNC_CHANNEL,
    BEACON_SYNC_PREV_CHANNEL, FIRST_VOTING_CHANNEL, FOLLOWING_VOTING_CHANNEL, PROPOSAL_CHANNEL,
};
use crate::thresholds::{atx_threshold, passes_eligibility};
use crate::votes::FirstRoundVotes;

/// Arrival class of a message relative to its phase end.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageClass {
    Timely,
    Delayed,
    Late,
}

/// Classify an arrival time against a phase end with grace period δ.
pub fn classify(arrival: Instant, phase_end: Instant, grace: Duration) -> MessageClass {
    if arrival <= phase_end + grace {
        MessageClass::Timely
    } else if arrival <= phase_end + 2 * grace {
        MessageClass::Delayed
    } else {
        MessageClass::Late
    }
}

/// Scheduled end of a voting round's window, measured from the recorded
/// proposal-phase end.
pub fn vote_round_end(phase_end: Instant, round: RoundId, config: &BeaconConfig) -> Instant {
    phase_end
        + config.first_voting_round_duration()
        + round.as_u32().saturating_sub(1) * config.round_duration()
}

/// Route a raw frame by gossip channel.
pub(crate) fn dispatch(
    core: &EngineCore,
    channel: &str,
    bytes: &[u8],
    now: Instant,
) -> Result<(), IntakeReject> {
    let result = match channel {
        PROPOSAL_CHANNEL => handle_proposal(core, bytes, now),
        FIRST_VOTING_CHANNEL => handle_first_voting(core, bytes, now),
        FOLLOWING_VOTING_CHANNEL => handle_following_voting(core, bytes, now),
        BEACON_SYNC_CHANNEL | BEACON_SYNC_PREV_CHANNEL => handle_beacon_sync(core, bytes),
        _ => Err(IntakeReject::Malformed("unknown channel")),
    };

    if let Err(reject) = &result {
        count_reject(core, reject);
        tracing::debug!(channel, reject = %reject, "dropped inbound message");
    }
    result
}

fn count_reject(core: &EngineCore, reject: &IntakeReject) {
    let metrics = &core.metrics;
    match reject {
        IntakeReject::Malformed(_) => metrics.malformed_dropped.inc(),
        IntakeReject::Late => metrics.late_dropped.inc(),
        IntakeReject::Duplicate => metrics.duplicate_votes_dropped.inc(),
        IntakeReject::Ineligible => metrics.ineligible_dropped.inc(),
        IntakeReject::UnknownVoter | IntakeReject::UnknownEpoch => {
            metrics.malformed_dropped.inc()
        }
    }
}

pub(crate) fn handle_proposal(
    core: &EngineCore,
    bytes: &[u8],
    now: Instant,
) -> Result<(), IntakeReject> {
    let sealed = Sealed::<ProposalMessage>::from_bytes(bytes)
        .map_err(|_| IntakeReject::Malformed("undecodable proposal frame"))?;
    let miner = sealed.body.miner_id;
    if !sealed.verify(&miner) {
        return Err(IntakeReject::Malformed("bad identity signature"));
    }

    // Proposals carry no epoch; they belong to the epoch in progress.
    let epoch = core.current_epoch();
    if epoch.is_genesis() {
        return Err(IntakeReject::UnknownEpoch);
    }

    let (epoch_weight, _) = core
        .activation
        .epoch_weight(epoch)
        .map_err(|_| IntakeReject::UnknownEpoch)?;
    if !core
        .vrf_verifier
        .verify(&miner, &proposal_preimage(epoch), &sealed.body.vrf_signature)
    {
        return Err(IntakeReject::Malformed("bad vrf signature"));
    }
    let threshold = atx_threshold(core.config.kappa, &core.q, epoch_weight);
    if !passes_eligibility(&sealed.body.vrf_signature, &threshold) {
        return Err(IntakeReject::Ineligible);
    }

    let state = core.epochs.get_or_create(epoch);
    let phase_end = *state
        .proposal_phase_finished
        .read()
        .expect("phase timestamp lock poisoned");
    // Before the phase closes every arrival is timely by definition.
    let class = match phase_end {
        None => MessageClass::Timely,
        Some(end) => classify(now, end, core.config.grace_period()),
    };

    let tag = proposal_tag(&sealed.body.vrf_signature);
    let mut proposals = state.proposals.write().expect("proposal store lock poisoned");
    match class {
        MessageClass::Timely => {
            if proposals.insert_timely(tag) {
                core.metrics.proposals_valid.inc();
            }
            Ok(())
        }
        MessageClass::Delayed => {
            if proposals.insert_delayed(tag) {
                core.metrics.proposals_potentially_valid.inc();
            }
            Ok(())
        }
        MessageClass::Late => Err(IntakeReject::Late),
    }
}

pub(crate) fn handle_first_voting(
    core: &EngineCore,
    bytes: &[u8],
    now: Instant,
) -> Result<(), IntakeReject> {
    let sealed = Sealed::<FirstVotingMessage>::from_bytes(bytes)
        .map_err(|_| IntakeReject::Malformed("undecodable first-vote frame"))?;
    let miner = sealed.body.miner_id;
    if !sealed.verify(&miner) {
        return Err(IntakeReject::Malformed("bad identity signature"));
    }

    let body = sealed.body;
    if body.valid_proposals.len() > core.config.votes_limit
        || body.potentially_valid_proposals.len() > core.config.votes_limit
    {
        return Err(IntakeReject::Malformed("vote list exceeds limit"));
    }
    let distinct: std::collections::BTreeSet<_> = body
        .valid_proposals
        .iter()
        .chain(body.potentially_valid_proposals.iter())
        .collect();
    if distinct.len() != body.valid_proposals.len() + body.potentially_valid_proposals.len() {
        return Err(IntakeReject::Malformed("overlapping vote lists"));
    }

    // First votes carry no epoch; they belong to the epoch in progress.
    let epoch = core.current_epoch();
    if epoch.is_genesis() {
        return Err(IntakeReject::UnknownEpoch);
    }
    if core.vote_weight(&miner, epoch) == 0 {
        return Err(IntakeReject::Ineligible);
    }

    let state = core.epochs.get_or_create(epoch);
    let phase_end = *state
        .proposal_phase_finished
        .read()
        .expect("phase timestamp lock poisoned");
    if let Some(end) = phase_end {
        let round_end = vote_round_end(end, RoundId::FIRST, &core.config);
        if classify(now, round_end, core.config.grace_period()) == MessageClass::Late {
            return Err(IntakeReject::Late);
        }
    }

    let votes = FirstRoundVotes::new(body.valid_proposals, body.potentially_valid_proposals);
    let inserted = state
        .votes
        .write()
        .expect("vote store lock poisoned")
        .insert_first_round(miner, votes);
    if !inserted {
        return Err(IntakeReject::Duplicate);
    }
    core.metrics.first_votes_accepted.inc();
    Ok(())
}

pub(crate) fn handle_following_voting(
    core: &EngineCore,
    bytes: &[u8],
    now: Instant,
) -> Result<(), IntakeReject> {
    let sealed = Sealed::<FollowingVotingMessage>::from_bytes(bytes)
        .map_err(|_| IntakeReject::Malformed("undecodable following-vote frame"))?;
    let miner = sealed.body.miner_id;
    if !sealed.verify(&miner) {
        return Err(IntakeReject::Malformed("bad identity signature"));
    }

    let body = sealed.body;
    let round = body.round;
    if round.as_u32() < 2 || round.as_u32() > core.config.rounds {
        return Err(IntakeReject::Malformed("round out of range"));
    }
    if body.epoch.is_genesis() {
        return Err(IntakeReject::UnknownEpoch);
    }
    let state = core
        .epochs
        .get(body.epoch)
        .ok_or(IntakeReject::UnknownEpoch)?;
    if core.vote_weight(&miner, body.epoch) == 0 {
        return Err(IntakeReject::Ineligible);
    }

    let phase_end = *state
        .proposal_phase_finished
        .read()
        .expect("phase timestamp lock poisoned");
    if let Some(end) = phase_end {
        let round_end = vote_round_end(end, round, &core.config);
        if classify(now, round_end, core.config.grace_period()) == MessageClass::Late {
            return Err(IntakeReject::Late);
        }
    }

    let mut votes = state.votes.write().expect("vote store lock poisoned");
    let first_round = votes
        .first_round_of(&miner)
        .cloned()
        .ok_or(IntakeReject::UnknownVoter)?;
    let decoded = decode_votes(&body.votes_bit_vector, &first_round)
        .map_err(|_| IntakeReject::Malformed("bit-vector does not match first-round lists"))?;
    if !votes.insert_following(round, miner, decoded) {
        return Err(IntakeReject::Duplicate);
    }
    drop(votes);

    core.metrics.following_votes_accepted.inc();
    Ok(())
}

pub(crate) fn handle_beacon_sync(core: &EngineCore, bytes: &[u8]) -> Result<(), IntakeReject> {
    let sealed = Sealed::<BeaconSyncMessage>::from_bytes(bytes)
        .map_err(|_| IntakeReject::Malformed("undecodable beacon-sync frame"))?;
    let miner = sealed.body.miner_id;
    if !sealed.verify(&miner) {
        return Err(IntakeReject::Malformed("bad identity signature"));
    }

    let body = sealed.body;
    // Bound slot creation: peers may offer past beacons, not future ones.
    if body.epoch > core.current_epoch().next() {
        return Err(IntakeReject::UnknownEpoch);
    }
    if core.vote_weight(&miner, body.epoch) == 0 {
        return Err(IntakeReject::Ineligible);
    }

    if core.beacons.set_once(body.epoch, body.beacon) {
        core.metrics.beacons_synced.inc();
        tracing::info!(epoch = %body.epoch, beacon = %body.beacon, peer = %miner,
            "adopted beacon from peer sync");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn classification_windows() {
        let end = Instant::now() + Duration::from_secs(100);
        let grace = Duration::from_secs(10);

        assert_eq!(classify(end - Duration::from_secs(5), end, grace), MessageClass::Timely);
        assert_eq!(classify(end, end, grace), MessageClass::Timely);
        assert_eq!(
            classify(end + Duration::from_secs(10), end, grace),
            MessageClass::Timely
        );
        assert_eq!(
            classify(end + Duration::from_secs(11), end, grace),
            MessageClass::Delayed
        );
        assert_eq!(
            classify(end + Duration::from_secs(20), end, grace),
            MessageClass::Delayed
        );
        assert_eq!(
            classify(end + Duration::from_secs(21), end, grace),
            MessageClass::Late
        );
    }

    #[test]
    fn round_ends_stack_per_round() {
        let mut config = BeaconConfig::default();
        config.first_voting_round_duration_ms = 1000;
        config.voting_round_duration_ms = 300;
        config.weak_coin_round_duration_ms = 200;
        let phase_end = Instant::now();

        assert_eq!(
            vote_round_end(phase_end, RoundId::new(1), &config),
            phase_end + Duration::from_millis(1000)
        );
        assert_eq!(
            vote_round_end(phase_end, RoundId::new(2), &config),
            phase_end + Duration::from_millis(1500)
        );
        assert_eq!(
            vote_round_end(phase_end, RoundId::new(4), &config),
            phase_end + Duration::from_millis(2500)
        );
    }
}
