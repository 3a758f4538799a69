//! Order transactions fairly before consensus.
//!
//! `wendy` is the fairness core of a consensus node: given a stream of
//! per-validator votes that each announce "I observed transaction `T` at my
//! local position `s`", it decides whether a candidate transaction is safe to
//! include in a block now and which other transactions must accompany it to
//! preserve block-order fairness.
//!
//! Fairness here is a Condorcet-style property: if a strong majority of
//! validators observed `a` before `b`, then `b` must not appear in a
//! committed block earlier than `a`. Because such "seen-before" relations can
//! form cycles among three or more transactions, no total order exists — the
//! core instead derives _blocking sets_, classes of transactions that must be
//! included together, from two predicates:
//!
//! - [Wendy::is_blocked]: a quorum of validators has not yet seen the
//!   transaction, so an unknown transaction could still deserve priority
//!   over it.
//! - [Wendy::is_blocked_by]: fewer than a quorum of validators reported one
//!   transaction before another, so the two cannot be split across blocks in
//!   that order.
//!
//! Per-validator observation logs tolerate out-of-order and missing votes; a
//! gap in a validator's reported positions is never treated as evidence (a
//! lost message must not unblock anything). Equivocating votes are dropped.
//! Committed blocks are fed back with [Wendy::commit_block] to prune the
//! logs and the local pool.
//!
//! The core is a passive library: it owns no tasks, timers, or sockets, and
//! all state is guarded by reader-writer locks so ingestion, predicates, and
//! block assembly can run concurrently.
//!
//! # Example
//!
//! ```rust
//! use commonware_cryptography::{ed25519, Digestible, PrivateKeyExt, Signer};
//! use wendy::{mocks, Config, Vote, Wendy};
//!
//! // Four validators; a quorum is floor(4 * 2/3) + 1 = 3.
//! let keys: Vec<ed25519::PrivateKey> =
//!     (0..4u64).map(ed25519::PrivateKey::from_seed).collect();
//! let wendy: Wendy<ed25519::PublicKey, mocks::Transaction> =
//!     Wendy::new(Config::default());
//! wendy.update_validators(keys.iter().map(|key| key.public_key()).collect());
//!
//! // A transaction is blocked until a quorum of validators reports it.
//! let tx = mocks::Transaction::new("transfer");
//! wendy.add_transaction(tx.clone());
//! assert!(wendy.is_blocked(&tx));
//! for key in &keys[..3] {
//!     wendy.add_vote(Vote::new(key.public_key(), 0, tx.digest()));
//! }
//! assert!(!wendy.is_blocked(&tx));
//!
//! // Assemble a block from the blocking sets and commit it back.
//! let block = wendy.blocking_set().new_block(Default::default());
//! assert_eq!(block.len(), 1);
//! wendy.commit_block(&block);
//! ```

use commonware_codec::EncodeSize;
use commonware_cryptography::Digestible;

mod blocking;
pub mod mocks;
mod sender;
mod state;
mod types;

pub use blocking::{BlockOptions, BlockingSet};
pub use sender::Sender;
pub use state::{Config, Wendy};
pub use types::{vote_namespace, Block, SignedVote, Vote, VOTE_SUFFIX};

/// A transaction as seen by the fairness core.
///
/// Content is opaque: the core only ever needs a unique digest (to relate
/// votes, pool entries, and committed blocks) and an encoded size (to honor
/// block size limits during assembly).
pub trait Transaction: Digestible + EncodeSize {
    /// Optional human-readable label, used in logs and test output.
    fn label(&self) -> Option<&str> {
        None
    }
}
