//! Wendy state: validator set, pools, and the blocking predicates.

use crate::{
    blocking::BlockingSet,
    sender::Sender,
    types::{Block, SignedVote, Vote},
    Transaction,
};
use commonware_cryptography::{Digest, Digestible, PublicKey};
use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;
use tracing::{debug, warn};

/// Configuration for [Wendy].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Config {
    /// Numerator of the quorum fraction `Q`.
    pub quorum_numerator: u64,

    /// Denominator of the quorum fraction `Q`. Must be non-zero.
    pub quorum_denominator: u64,
}

impl Config {
    /// Number of matching senders required for a predicate to hold over `n`
    /// validators: `floor(n * Q) + 1`.
    ///
    /// At the default `Q = 2/3` this is the smallest-honest-majority
    /// threshold `t + 1`, and coincides with [commonware_utils::quorum] for
    /// every non-empty validator set.
    fn quorum(&self, validators: usize) -> usize {
        (validators as u64 * self.quorum_numerator / self.quorum_denominator) as usize + 1
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            quorum_numerator: 2,
            quorum_denominator: 3,
        }
    }
}

/// Vote index shared by every predicate: the current validator set, the
/// quorum derived from it, the latest vote per transaction, and the
/// per-validator observation logs.
///
/// Held behind a single lock so a validator-set update (which invalidates
/// past quorum arithmetic) is observed atomically with the logs it retained.
struct Index<P: PublicKey, D: Digest> {
    /// Current validator set.
    validators: Vec<P>,

    /// Matching senders required for a predicate to hold.
    quorum: usize,

    /// Latest vote observed for each transaction digest, from any sender.
    votes: HashMap<D, Vote<P, D>>,

    /// Observation log per sender.
    senders: HashMap<P, Sender<P, D>>,
}

impl<P: PublicKey, D: Digest> Index<P, D> {
    fn new(cfg: &Config) -> Self {
        Self {
            validators: Vec::new(),
            quorum: cfg.quorum(0),
            votes: HashMap::new(),
            senders: HashMap::new(),
        }
    }

    /// Evaluates `predicate` over the current senders, returning `true` once
    /// it has held for `quorum` distinct senders.
    ///
    /// Iteration order is unspecified; each sender is visited at most once.
    fn has_quorum(&self, mut predicate: impl FnMut(&Sender<P, D>) -> bool) -> bool {
        let mut matched = 0;
        for sender in self.senders.values() {
            if predicate(sender) {
                matched += 1;
                if matched >= self.quorum {
                    return true;
                }
            }
        }
        false
    }

    /// A transaction is blocked while fewer than `quorum` senders have seen
    /// it: an unknown transaction could still be scheduled ahead of it.
    fn is_blocked(&self, digest: &D) -> bool {
        !self.has_quorum(|sender| sender.seen(digest))
    }

    /// `first` is blocked by `second` while fewer than `quorum` senders
    /// report `first` before `second`.
    fn is_blocked_by(&self, first: &D, second: &D) -> bool {
        !self.has_quorum(|sender| sender.before(first, second))
    }
}

/// The fairness core embedded in a consensus node.
///
/// Ingests transactions, per-validator votes, and committed blocks, and
/// answers whether a transaction is safe to include in a block now — and
/// which other transactions must accompany it to preserve block-order
/// fairness.
///
/// All operations are safe for concurrent access: the transaction pool and
/// the vote index are each guarded by a reader-writer lock, mutators are
/// totally ordered by the write lock, and predicates observe a consistent
/// snapshot under the read lock.
pub struct Wendy<P: PublicKey, T: Transaction> {
    cfg: Config,

    /// Local pool of transactions awaiting inclusion.
    transactions: RwLock<HashMap<T::Digest, T>>,

    /// Vote index and per-sender observation logs.
    index: RwLock<Index<P, T::Digest>>,
}

impl<P: PublicKey, T: Transaction> Wendy<P, T> {
    /// Creates an empty core with the given configuration.
    ///
    /// The validator set starts empty: every transaction appears blocked
    /// until [Wendy::update_validators] installs one and a quorum of votes
    /// arrives.
    pub fn new(cfg: Config) -> Self {
        Self {
            transactions: RwLock::new(HashMap::new()),
            index: RwLock::new(Index::new(&cfg)),
            cfg,
        }
    }

    /// Replaces the validator set and recomputes the quorum.
    ///
    /// Senders still in the new set keep their observation logs. Senders for
    /// removed validators are discarded along with the evidence they carried:
    /// quorum arithmetic from before a rotation does not survive it.
    pub fn update_validators(&self, validators: Vec<P>) {
        let quorum = self.cfg.quorum(validators.len());
        let mut index = self.index.write().unwrap();
        let mut senders = HashMap::with_capacity(validators.len());
        for validator in &validators {
            let sender = index
                .senders
                .remove(validator)
                .unwrap_or_else(|| Sender::new(validator.clone()));
            senders.insert(validator.clone(), sender);
        }
        debug!(validators = validators.len(), quorum, "validator set updated");
        index.validators = validators;
        index.quorum = quorum;
        index.senders = senders;
    }

    /// Votes required to be sure at least one came from an honest validator
    /// (`t + 1`, the current quorum).
    pub fn honest_parties(&self) -> usize {
        self.index.read().unwrap().quorum
    }

    /// Honest validators assumed present in the current set (`n - quorum`,
    /// saturating at zero).
    pub fn honest_majority(&self) -> usize {
        let index = self.index.read().unwrap();
        index.validators.len().saturating_sub(index.quorum)
    }

    /// Adds a transaction to the local pool.
    ///
    /// Returns `true` iff the transaction was not already present.
    pub fn add_transaction(&self, transaction: T) -> bool {
        let digest = transaction.digest();
        let mut transactions = self.transactions.write().unwrap();
        if transactions.contains_key(&digest) {
            return false;
        }
        transactions.insert(digest, transaction);
        true
    }

    /// Routes a vote to the owning sender's log and records it as the latest
    /// vote for its transaction.
    ///
    /// A vote from a key outside the current validator set is recorded under
    /// an ad-hoc sender, which the next [Wendy::update_validators] discards.
    /// Returns `true` iff the vote was new to the owning sender.
    pub fn add_vote(&self, vote: Vote<P, T::Digest>) -> bool {
        let mut index = self.index.write().unwrap();
        let Index { votes, senders, .. } = &mut *index;
        let sender = senders.entry(vote.public_key.clone()).or_insert_with(|| {
            debug!(sender = ?vote.public_key, "vote from outside the validator set");
            Sender::new(vote.public_key.clone())
        });
        votes.insert(vote.digest, vote.clone());
        sender.add(vote)
    }

    /// Verifies a signed vote and ingests it.
    ///
    /// A vote that fails verification is dropped, returning `false`.
    pub fn add_signed_vote(&self, namespace: &[u8], signed: SignedVote<P, T::Digest>) -> bool {
        if !signed.verify(namespace) {
            warn!(sender = ?signed.vote.public_key, "dropping vote with invalid signature");
            return false;
        }
        self.add_vote(signed.vote)
    }

    /// Feeds a committed block back into the core.
    ///
    /// Every sender's log is pruned of the block's transactions, and the
    /// transactions leave the local pool.
    pub fn commit_block(&self, block: &Block<T>) {
        {
            let mut index = self.index.write().unwrap();
            for sender in index.senders.values_mut() {
                sender.prune(block.digests());
            }
        }
        let mut transactions = self.transactions.write().unwrap();
        for digest in block.digests() {
            transactions.remove(&digest);
        }
    }

    /// Returns the latest vote seen for a transaction digest, from any
    /// sender.
    pub fn vote_by_digest(&self, digest: &T::Digest) -> Option<Vote<P, T::Digest>> {
        self.index.read().unwrap().votes.get(digest).cloned()
    }

    /// Returns whether a so-far-unknown transaction could still be scheduled
    /// ahead of `transaction` — i.e. fewer than [Wendy::honest_parties]
    /// senders have seen it.
    pub fn is_blocked(&self, transaction: &T) -> bool {
        self.index.read().unwrap().is_blocked(&transaction.digest())
    }

    /// Returns whether `second` might have priority over `first`: `first` is
    /// not blocked by `second` only once a quorum of senders reported
    /// `first` before `second`.
    ///
    /// Once `false`, no later vote can make it `true` again: additional
    /// votes cannot shrink a quorum, and equivocating re-assertions are
    /// rejected by the sender logs.
    pub fn is_blocked_by(&self, first: &T, second: &T) -> bool {
        self.index
            .read()
            .unwrap()
            .is_blocked_by(&first.digest(), &second.digest())
    }

    /// Computes, for every pool transaction that is safe to schedule, the
    /// full set of transactions that must accompany it in a block.
    ///
    /// Candidates are the pool transactions already seen by a quorum. Each
    /// maps to the transitive closure of the blocked-by relation over the
    /// candidates, so a fairness cycle collapses into one class that is
    /// included together.
    pub fn blocking_set(&self) -> BlockingSet<T> {
        let pool: Vec<T> = self.transactions.read().unwrap().values().cloned().collect();
        let index = self.index.read().unwrap();

        // Candidates, in digest order for deterministic assembly downstream.
        let mut candidates: Vec<(T::Digest, T)> = pool
            .into_iter()
            .map(|transaction| (transaction.digest(), transaction))
            .filter(|(digest, _)| !index.is_blocked(digest))
            .collect();
        candidates.sort_by(|left, right| left.0.cmp(&right.0));

        // Direct dependencies between candidates. The relation is reflexive
        // (no sender reports a transaction before itself), so the self edge
        // is implicit.
        let direct: Vec<Vec<usize>> = candidates
            .iter()
            .map(|(digest, _)| {
                candidates
                    .iter()
                    .enumerate()
                    .filter(|(_, (other, _))| {
                        other != digest && index.is_blocked_by(digest, other)
                    })
                    .map(|(position, _)| position)
                    .collect()
            })
            .collect();

        // Close each candidate over its dependencies.
        let mut sets = BTreeMap::new();
        for (start, (digest, _)) in candidates.iter().enumerate() {
            let mut included = vec![false; candidates.len()];
            included[start] = true;
            let mut frontier = vec![start];
            while let Some(next) = frontier.pop() {
                for &dependency in &direct[next] {
                    if !included[dependency] {
                        included[dependency] = true;
                        frontier.push(dependency);
                    }
                }
            }
            let companions: Vec<T> = included
                .iter()
                .enumerate()
                .filter(|(_, included)| **included)
                .map(|(position, _)| candidates[position].1.clone())
                .collect();
            sets.insert(*digest, companions);
        }
        BlockingSet::new(sets)
    }
}

impl<P: PublicKey, T: Transaction> Default for Wendy<P, T> {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks;
    use commonware_cryptography::{ed25519, Signer};
    use rstest::rstest;

    const NAMESPACE: &[u8] = b"_WENDY_TEST";

    type TestWendy = Wendy<ed25519::PublicKey, mocks::Transaction>;

    fn keys(n: u64) -> Vec<ed25519::PrivateKey> {
        (0..n).map(ed25519::PrivateKey::from_seed).collect()
    }

    fn validators(keys: &[ed25519::PrivateKey]) -> Vec<ed25519::PublicKey> {
        keys.iter().map(|key| key.public_key()).collect()
    }

    fn wendy(keys: &[ed25519::PrivateKey]) -> TestWendy {
        let wendy = TestWendy::default();
        wendy.update_validators(validators(keys));
        wendy
    }

    /// A transaction stays blocked until a quorum of senders has seen it.
    #[test]
    fn test_blocked_until_quorum_sees() {
        let keys = keys(4);
        let wendy = wendy(&keys);
        let tx = mocks::Transaction::new("tx-a");
        assert!(wendy.add_transaction(tx.clone()));
        assert!(!wendy.add_transaction(tx.clone()));

        assert!(wendy.is_blocked(&tx));
        wendy.add_vote(Vote::new(keys[0].public_key(), 0, tx.digest()));
        assert!(wendy.is_blocked(&tx));
        wendy.add_vote(Vote::new(keys[1].public_key(), 0, tx.digest()));
        assert!(wendy.is_blocked(&tx));
        wendy.add_vote(Vote::new(keys[2].public_key(), 0, tx.digest()));
        assert!(!wendy.is_blocked(&tx));
    }

    /// `is_blocked_by` flips once a quorum reports the order, and stays
    /// flipped even when the remaining sender reports the reverse.
    #[test]
    fn test_blocked_by_threshold_and_monotonicity() {
        let keys = keys(4);
        let wendy = wendy(&keys);
        let a = mocks::Transaction::new("tx-a");
        let b = mocks::Transaction::new("tx-b");

        for key in &keys[..2] {
            wendy.add_vote(Vote::new(key.public_key(), 0, a.digest()));
            wendy.add_vote(Vote::new(key.public_key(), 1, b.digest()));
        }
        assert!(wendy.is_blocked_by(&a, &b));

        wendy.add_vote(Vote::new(keys[2].public_key(), 0, a.digest()));
        wendy.add_vote(Vote::new(keys[2].public_key(), 1, b.digest()));
        assert!(!wendy.is_blocked_by(&a, &b));

        // The last sender saw them in the opposite order. The achieved
        // quorum cannot be revoked.
        wendy.add_vote(Vote::new(keys[3].public_key(), 0, b.digest()));
        wendy.add_vote(Vote::new(keys[3].public_key(), 1, a.digest()));
        assert!(!wendy.is_blocked_by(&a, &b));
    }

    /// Votes at a gapped position count toward `seen` quorums, but ordering
    /// claims against unreported transactions stay open until the gaps fill.
    #[test]
    fn test_gapped_sequences() {
        let keys = keys(5);
        let wendy = wendy(&keys);
        assert_eq!(wendy.honest_parties(), 4);

        let gapped = mocks::Transaction::new("tx-gapped");
        let unreported = mocks::Transaction::new("tx-unreported");
        for key in &keys[..3] {
            wendy.add_vote(Vote::new(key.public_key(), 2, gapped.digest()));
        }
        assert!(wendy.is_blocked(&gapped));

        wendy.add_vote(Vote::new(keys[3].public_key(), 2, gapped.digest()));
        assert!(!wendy.is_blocked(&gapped));

        // Positions 0 and 1 are unfilled everywhere: any of them could still
        // carry the unreported transaction.
        assert!(wendy.is_blocked_by(&gapped, &unreported));

        let filler0 = mocks::Transaction::new("tx-filler-0");
        let filler1 = mocks::Transaction::new("tx-filler-1");
        for key in &keys[..4] {
            wendy.add_vote(Vote::new(key.public_key(), 0, filler0.digest()));
            wendy.add_vote(Vote::new(key.public_key(), 1, filler1.digest()));
        }
        assert!(!wendy.is_blocked_by(&gapped, &unreported));
    }

    #[test]
    fn test_vote_by_digest() {
        let wendy = TestWendy::default();
        let tx = mocks::Transaction::new("tx-a");
        let other = mocks::Transaction::new("tx-b");
        let vote = Vote::new(
            ed25519::PrivateKey::from_seed(0).public_key(),
            0,
            tx.digest(),
        );

        assert!(wendy.vote_by_digest(&tx.digest()).is_none());
        wendy.add_vote(vote.clone());
        assert_eq!(wendy.vote_by_digest(&tx.digest()), Some(vote));
        assert!(wendy.vote_by_digest(&other.digest()).is_none());
    }

    /// Retained validators keep their logs across an update; removed
    /// validators lose theirs.
    #[test]
    fn test_validator_rotation() {
        let keys = keys(2);
        let wendy = wendy(&keys[..1]);
        let tx = mocks::Transaction::new("tx-a");

        // One validator: quorum is 1, a single vote unblocks.
        wendy.add_vote(Vote::new(keys[0].public_key(), 0, tx.digest()));
        assert!(!wendy.is_blocked(&tx));

        // Retained across an update that grows the set and back.
        wendy.update_validators(validators(&keys));
        wendy.update_validators(validators(&keys[..1]));
        assert!(!wendy.is_blocked(&tx));

        // Dropped once the validator leaves, even if it later returns.
        wendy.update_validators(validators(&keys[1..]));
        wendy.update_validators(validators(&keys[..1]));
        assert!(wendy.is_blocked(&tx));
    }

    #[rstest]
    #[case(1, 1)]
    #[case(2, 2)]
    #[case(3, 3)]
    #[case(4, 3)]
    #[case(5, 4)]
    #[case(6, 5)]
    #[case(7, 5)]
    #[case(10, 7)]
    #[case(21, 15)]
    fn test_quorum_recomputation(#[case] n: usize, #[case] expected: usize) {
        let keys = keys(n as u64);
        let wendy = wendy(&keys);
        assert_eq!(wendy.honest_parties(), expected);
        assert_eq!(wendy.honest_majority(), n - expected);

        // The default fraction matches the teacher arithmetic.
        assert_eq!(
            wendy.honest_parties(),
            commonware_utils::quorum(n as u32) as usize
        );
    }

    /// With no validators the quorum degenerates to 1 and nothing can be
    /// unblocked by silence.
    #[test]
    fn test_empty_validator_set() {
        let wendy = TestWendy::default();
        assert_eq!(wendy.honest_parties(), 1);
        assert_eq!(wendy.honest_majority(), 0);

        let tx = mocks::Transaction::new("tx-a");
        wendy.add_transaction(tx.clone());
        assert!(wendy.is_blocked(&tx));
        assert!(wendy.is_blocked_by(&tx, &mocks::Transaction::new("tx-b")));
    }

    /// Committing a block prunes the live logs and the pool, while the
    /// transactions remain seen.
    #[test]
    fn test_commit_block() {
        let keys = keys(4);
        let wendy = wendy(&keys);
        let tx = mocks::Transaction::new("tx-a");
        wendy.add_transaction(tx.clone());
        for key in &keys[..3] {
            wendy.add_vote(Vote::new(key.public_key(), 0, tx.digest()));
        }
        assert!(!wendy.is_blocked(&tx));
        assert!(wendy.blocking_set().get(&tx.digest()).is_some());

        wendy.commit_block(&Block::new(vec![tx.clone()]));

        // Still seen by every sender (committed set), but no longer a
        // candidate and no longer accepted as a new vote.
        assert!(!wendy.is_blocked(&tx));
        assert!(wendy.blocking_set().get(&tx.digest()).is_none());
        assert!(!wendy.add_vote(Vote::new(keys[3].public_key(), 5, tx.digest())));
    }

    /// Votes from outside the validator set are held in an ad-hoc sender
    /// until the next update discards it.
    #[test]
    fn test_unknown_sender_discarded_on_update() {
        let keys = keys(2);
        let wendy = wendy(&keys);
        let stranger = ed25519::PrivateKey::from_seed(9);
        let tx = mocks::Transaction::new("tx-a");

        wendy.add_vote(Vote::new(keys[0].public_key(), 0, tx.digest()));
        assert!(wendy.is_blocked(&tx));
        wendy.add_vote(Vote::new(stranger.public_key(), 0, tx.digest()));
        assert!(!wendy.is_blocked(&tx));

        wendy.update_validators(validators(&keys));
        assert!(wendy.is_blocked(&tx));
    }

    #[test]
    fn test_signed_vote_ingestion() {
        let keys = keys(4);
        let wendy = wendy(&keys);
        let tx = mocks::Transaction::new("tx-a");

        let signed = SignedVote::sign(NAMESPACE, &keys[0], 0, tx.digest());
        assert!(wendy.add_signed_vote(NAMESPACE, signed.clone()));
        assert!(!wendy.add_signed_vote(NAMESPACE, signed));

        // A tampered vote is dropped without reaching the logs.
        let mut forged = SignedVote::sign(NAMESPACE, &keys[1], 0, tx.digest());
        forged.vote.sequence = 2;
        assert!(!wendy.add_signed_vote(NAMESPACE, forged));
        wendy.add_vote(Vote::new(keys[2].public_key(), 0, tx.digest()));
        assert!(wendy.is_blocked(&tx));
    }
}
