//! Per-validator observation logs.

use crate::types::Vote;
use commonware_cryptography::{Digest, PublicKey};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::warn;

/// The append-only log of one validator's observations.
///
/// Each accepted vote claims "this validator observed transaction `digest` at
/// local position `sequence`". The log is sparse: positions the validator
/// never reported remain absent, and may be filled later by out-of-order
/// delivery. The [Sender::seen] and [Sender::before] predicates are evaluated
/// over this log when aggregating a quorum.
///
/// A transaction included in a committed block is pruned from the live log
/// but remembered: `seen` keeps answering for it, `before` keeps using the
/// position it occupied, and re-assertions of it are rejected as duplicates.
pub struct Sender<P: PublicKey, D: Digest> {
    /// Validator this log belongs to.
    public_key: P,

    /// Live votes by sequence position.
    votes: BTreeMap<u64, Vote<P, D>>,

    /// Digest index over `votes`.
    by_digest: HashMap<D, u64>,

    /// Digests already included in a committed block, with the position each
    /// occupied before pruning (`None` if this sender never reported it).
    committed: HashMap<D, Option<u64>>,

    /// Every sequence position ever accepted, committed entries included.
    ///
    /// Pruning never removes entries here: the gap test in [Sender::before]
    /// walks this set, and a pruned position is still an observed one.
    observed: BTreeSet<u64>,
}

impl<P: PublicKey, D: Digest> Sender<P, D> {
    /// Creates an empty log for the given validator.
    pub fn new(public_key: P) -> Self {
        Self {
            public_key,
            votes: BTreeMap::new(),
            by_digest: HashMap::new(),
            committed: HashMap::new(),
            observed: BTreeSet::new(),
        }
    }

    /// Returns the validator this log belongs to.
    pub fn public_key(&self) -> &P {
        &self.public_key
    }

    /// Records a vote.
    ///
    /// Returns `true` iff the entry is new. A vote for a digest already in
    /// the log (or already committed) is a duplicate. A vote claiming an
    /// already-occupied position with a different digest is an equivocation:
    /// the first claim is kept and the new vote is dropped.
    pub fn add(&mut self, vote: Vote<P, D>) -> bool {
        let sequence = vote.sequence;
        let digest = vote.digest;
        if self.by_digest.contains_key(&digest) || self.committed.contains_key(&digest) {
            return false;
        }
        if self.observed.contains(&sequence) {
            let previous = self.votes.get(&sequence).map(|vote| vote.digest);
            warn!(
                sender = ?self.public_key,
                sequence,
                ?previous,
                conflicting = ?digest,
                "dropping equivocating vote"
            );
            return false;
        }
        self.by_digest.insert(digest, sequence);
        self.observed.insert(sequence);
        self.votes.insert(sequence, vote);
        true
    }

    /// Returns whether this sender has reported the transaction, in the live
    /// log or in a committed block.
    pub fn seen(&self, digest: &D) -> bool {
        self.by_digest.contains_key(digest) || self.committed.contains_key(digest)
    }

    /// Returns the position at which this sender reported the transaction,
    /// if it ever did.
    fn position(&self, digest: &D) -> Option<u64> {
        self.by_digest
            .get(digest)
            .copied()
            .or_else(|| self.committed.get(digest).copied().flatten())
    }

    /// Returns whether this sender reported `first` strictly before it could
    /// have reported `second`.
    ///
    /// When both transactions have been seen, their positions are compared
    /// directly. When `second` has not been seen, an unfilled position at or
    /// below `first`'s could still turn out to carry `second`, so `first`
    /// only precedes it when every position up to and including `first`'s is
    /// accounted for. A lost message is never evidence of priority.
    pub fn before(&self, first: &D, second: &D) -> bool {
        let Some(position) = self.position(first) else {
            return false;
        };
        match self.position(second) {
            Some(other) => position < other,
            None => self.contiguous_through(position),
        }
    }

    /// Returns whether every position in `0..=sequence` has been observed.
    fn contiguous_through(&self, sequence: u64) -> bool {
        for (index, occupied) in self.observed.iter().enumerate() {
            if *occupied != index as u64 {
                return false;
            }
            if *occupied >= sequence {
                return true;
            }
        }
        false
    }

    /// Moves the listed digests out of the live log into the committed set.
    ///
    /// Transactions this sender never reported are recorded as committed too:
    /// they are seen (the chain has them), occupy no position, and any later
    /// vote for them is obsolete. Idempotent.
    pub fn prune(&mut self, digests: impl IntoIterator<Item = D>) {
        for digest in digests {
            let position = self.by_digest.remove(&digest);
            if let Some(sequence) = position {
                self.votes.remove(&sequence);
            }
            self.committed.entry(digest).or_insert(position);
        }
    }
}
