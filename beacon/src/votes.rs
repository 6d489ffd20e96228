//! Per-epoch vote records, the running margin tally, and own-vote adoption.
//!
//! Round 1 votes are explicit lists; every following round is a bit-vector
//! reclassification of the voter's own first-round lists (see
//! [`crate::codec`]). The margin of a proposal is the weighted sum, over all
//! voters and all rounds tallied so far, of +w for a round in which the
//! voter classified it valid and -w for invalid. A following-round record
//! overrides the voter's first-round classification per proposal; proposals
//! it does not mention keep their first-round class for that round.

use pharos_types::{NodeId, Proposal, RoundId};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// A voter's classification of proposals: disjoint valid / invalid sets.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VoteSet {
    pub valid: BTreeSet<Proposal>,
    pub invalid: BTreeSet<Proposal>,
}

impl VoteSet {
    pub fn new(
        valid: impl IntoIterator<Item = Proposal>,
        invalid: impl IntoIterator<Item = Proposal>,
    ) -> Self {
        Self {
            valid: valid.into_iter().collect(),
            invalid: invalid.into_iter().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.valid.is_empty() && self.invalid.is_empty()
    }
}

/// A voter's first-round lists, in broadcast order: outright valid
/// proposals first, then potentially-valid ones, each sorted ascending.
///
/// This order is the shared reference frame for bit-vector votes, so it is
/// frozen for the duration of the epoch.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FirstRoundVotes {
    pub valid: Vec<Proposal>,
    pub potentially_valid: Vec<Proposal>,
}

impl FirstRoundVotes {
    pub fn new(valid: Vec<Proposal>, potentially_valid: Vec<Proposal>) -> Self {
        Self {
            valid,
            potentially_valid,
        }
    }

    /// The reference list `L`: valids before potentially-valids.
    pub fn reference_list(&self) -> impl Iterator<Item = &Proposal> {
        self.valid.iter().chain(self.potentially_valid.iter())
    }

    pub fn len(&self) -> usize {
        self.valid.len() + self.potentially_valid.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The first-round vote as a classification: valids are votes for,
    /// potentially-valids are votes against.
    pub fn as_vote_set(&self) -> VoteSet {
        VoteSet::new(
            self.valid.iter().copied(),
            self.potentially_valid.iter().copied(),
        )
    }
}

/// All vote state of one epoch.
#[derive(Debug, Default)]
pub struct VoteStore {
    /// First-round lists per voter, as declared by the voter.
    first_round: HashMap<NodeId, FirstRoundVotes>,
    /// Decoded following-round records. At most one per (round, voter);
    /// the first accepted record wins.
    following: HashMap<(RoundId, NodeId), VoteSet>,
    /// This node's own votes per round.
    own: HashMap<RoundId, VoteSet>,
    /// The exact first-round lists this node broadcast, frozen for the
    /// epoch as the reference frame of its own bit-vector votes.
    own_first_round: Option<FirstRoundVotes>,
}

impl VoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a voter's first-round vote. Returns `false` if the voter
    /// already has a record (the original submission stands).
    pub fn insert_first_round(&mut self, voter: NodeId, votes: FirstRoundVotes) -> bool {
        if self.first_round.contains_key(&voter) {
            return false;
        }
        self.first_round.insert(voter, votes);
        true
    }

    pub fn first_round_of(&self, voter: &NodeId) -> Option<&FirstRoundVotes> {
        self.first_round.get(voter)
    }

    /// Record a voter's decoded following-round vote. Returns `false` on a
    /// repeat submission for the same (round, voter).
    pub fn insert_following(&mut self, round: RoundId, voter: NodeId, votes: VoteSet) -> bool {
        let key = (round, voter);
        if self.following.contains_key(&key) {
            return false;
        }
        self.following.insert(key, votes);
        true
    }

    pub fn own_votes(&self, round: RoundId) -> Option<&VoteSet> {
        self.own.get(&round)
    }

    pub fn set_own_votes(&mut self, round: RoundId, votes: VoteSet) {
        self.own.insert(round, votes);
    }

    pub fn own_first_round(&self) -> Option<&FirstRoundVotes> {
        self.own_first_round.as_ref()
    }

    /// Freeze this node's outgoing first-round lists. Only the first call
    /// has an effect.
    pub fn freeze_own_first_round(&mut self, votes: FirstRoundVotes) {
        if self.own_first_round.is_none() {
            self.own_first_round = Some(votes);
        }
    }

    pub fn voter_count(&self) -> usize {
        self.first_round.len()
    }

    /// The weighted vote margin per proposal over rounds 1..=`through`.
    ///
    /// For each voter the round-1 contribution is its declared first-round
    /// classification; for each following round the contribution is that
    /// same classification with the round's record (if any) overriding
    /// individual proposals.
    pub fn margins(
        &self,
        through: RoundId,
        weight_of: impl Fn(&NodeId) -> u64,
    ) -> BTreeMap<Proposal, i128> {
        let mut margins = BTreeMap::new();

        for (voter, first) in &self.first_round {
            let weight = weight_of(voter);
            if weight == 0 {
                continue;
            }
            let weight = weight as i128;

            for round in 1..=through.as_u32() {
                let round = RoundId::new(round);
                let record = if round == RoundId::FIRST {
                    None
                } else {
                    self.following.get(&(round, *voter))
                };

                for proposal in first.valid.iter() {
                    let sign = classify_for_round(proposal, true, record);
                    *margins.entry(*proposal).or_insert(0) += sign * weight;
                }
                for proposal in first.potentially_valid.iter() {
                    let sign = classify_for_round(proposal, false, record);
                    *margins.entry(*proposal).or_insert(0) += sign * weight;
                }
            }
        }

        margins
    }
}

/// +1 / -1 contribution of one proposal for one voter in one round.
fn classify_for_round(proposal: &Proposal, first_round_valid: bool, record: Option<&VoteSet>) -> i128 {
    if let Some(record) = record {
        if record.valid.contains(proposal) {
            return 1;
        }
        if record.invalid.contains(proposal) {
            return -1;
        }
    }
    if first_round_valid {
        1
    } else {
        -1
    }
}

/// Split margined proposals into the node's next valid / invalid vote sets.
///
/// A proposal is adopted once the absolute margin reaches `threshold`; the
/// sign picks the side. Below-threshold proposals (a zero margin always
/// among them) are resolved by the weak coin: `true` sends them to valid,
/// `false` to invalid.
pub fn adopt_votes(margins: &BTreeMap<Proposal, i128>, threshold: i128, coin: bool) -> VoteSet {
    let mut votes = VoteSet::default();
    for (proposal, margin) in margins {
        if *margin > 0 && *margin >= threshold {
            votes.valid.insert(*proposal);
        } else if *margin < 0 && -*margin >= threshold {
            votes.invalid.insert(*proposal);
        } else if coin {
            votes.valid.insert(*proposal);
        } else {
            votes.invalid.insert(*proposal);
        }
    }
    votes
}
