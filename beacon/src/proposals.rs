//! Per-epoch proposal partitioning.
//!
//! Eligible proposals land in one of two disjoint sets depending on their
//! arrival class: timely arrivals are outright valid, delayed arrivals are
//! potentially valid. Late arrivals never reach this store. The snapshot
//! taken at the first voting round is the frozen basis of this node's own
//! first-round vote; the live partition keeps absorbing timely and delayed
//! arrivals afterwards, since those classes extend up to 2δ past the phase
//! end.

use pharos_types::Proposal;
use std::collections::BTreeSet;

use crate::votes::FirstRoundVotes;

/// The valid / potentially-valid proposal partition of one epoch.
#[derive(Debug, Default)]
pub struct ProposalStore {
    valid: BTreeSet<Proposal>,
    potentially_valid: BTreeSet<Proposal>,
    snapshot: Option<FirstRoundVotes>,
}

impl ProposalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a timely, eligible proposal into the valid set.
    ///
    /// Idempotent; returns `true` if the proposal is newly inserted. The
    /// first accepted classification of a proposal stands, so an entry
    /// already recorded as potentially valid stays there.
    pub fn insert_timely(&mut self, proposal: Proposal) -> bool {
        if self.potentially_valid.contains(&proposal) {
            return false;
        }
        self.valid.insert(proposal)
    }

    /// Insert a delayed, eligible proposal into the potentially-valid set.
    ///
    /// Idempotent; never displaces a valid entry, keeping the sets
    /// disjoint.
    pub fn insert_delayed(&mut self, proposal: Proposal) -> bool {
        if self.valid.contains(&proposal) {
            return false;
        }
        self.potentially_valid.insert(proposal)
    }

    pub fn valid(&self) -> &BTreeSet<Proposal> {
        &self.valid
    }

    pub fn potentially_valid(&self) -> &BTreeSet<Proposal> {
        &self.potentially_valid
    }

    /// Freeze and return the partition as sorted first-round vote lists.
    ///
    /// The first call caches the result; later calls return the cached
    /// snapshot unchanged regardless of further inserts.
    pub fn snapshot(&mut self) -> FirstRoundVotes {
        if self.snapshot.is_none() {
            self.snapshot = Some(FirstRoundVotes::new(
                self.valid.iter().copied().collect(),
                self.potentially_valid.iter().copied().collect(),
            ));
        }
        self.snapshot.clone().expect("just populated")
    }

    pub fn snapshot_taken(&self) -> bool {
        self.snapshot.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(s: &str) -> Proposal {
        Proposal::from_hex(s).unwrap()
    }

    #[test]
    fn partition_stays_disjoint() {
        let mut store = ProposalStore::new();
        assert!(store.insert_timely(p("0x1")));
        assert!(!store.insert_delayed(p("0x1")));
        assert!(store.insert_delayed(p("0x2")));

        assert!(store.valid().contains(&p("0x1")));
        assert!(!store.potentially_valid().contains(&p("0x1")));
        assert!(store.potentially_valid().contains(&p("0x2")));
    }

    #[test]
    fn first_classification_wins() {
        let mut store = ProposalStore::new();
        store.insert_delayed(p("0x1"));
        store.insert_timely(p("0x1"));

        assert!(!store.valid().contains(&p("0x1")));
        assert!(store.potentially_valid().contains(&p("0x1")));
    }

    #[test]
    fn duplicate_inserts_are_idempotent() {
        let mut store = ProposalStore::new();
        assert!(store.insert_timely(p("0x1")));
        assert!(!store.insert_timely(p("0x1")));
        assert_eq!(store.valid().len(), 1);

        assert!(store.insert_delayed(p("0x2")));
        assert!(!store.insert_delayed(p("0x2")));
        assert_eq!(store.potentially_valid().len(), 1);
    }

    #[test]
    fn snapshot_is_sorted_and_frozen() {
        let mut store = ProposalStore::new();
        store.insert_timely(p("0x3"));
        store.insert_timely(p("0x1"));
        store.insert_delayed(p("0x5"));
        store.insert_delayed(p("0x4"));

        let snapshot = store.snapshot();
        assert_eq!(snapshot.valid, vec![p("0x1"), p("0x3")]);
        assert_eq!(snapshot.potentially_valid, vec![p("0x4"), p("0x5")]);

        // Later arrivals do not alter the frozen snapshot.
        store.insert_timely(p("0x2"));
        assert_eq!(store.snapshot().valid, vec![p("0x1"), p("0x3")]);
        assert!(store.valid().contains(&p("0x2")));
    }
}
