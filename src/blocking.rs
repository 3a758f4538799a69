//! Blocking sets and block assembly.

use crate::{types::Block, Transaction};
use std::collections::BTreeMap;

/// Limits applied when assembling a block from a [BlockingSet].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BlockOptions {
    /// Hard cap on the number of transactions included.
    pub max_transactions: Option<usize>,

    /// Hard cap on the summed encoded size of included transactions.
    pub max_bytes: Option<usize>,
}

/// For every transaction that is safe to schedule, the set of transactions
/// that must accompany it in a block to preserve fairness.
///
/// The mapping is reflexive: a transaction with no foreign dependency maps to
/// a singleton containing itself. A fairness cycle maps every member to the
/// whole cycle.
pub struct BlockingSet<T: Transaction> {
    sets: BTreeMap<T::Digest, Vec<T>>,
}

impl<T: Transaction> BlockingSet<T> {
    pub(crate) fn new(sets: BTreeMap<T::Digest, Vec<T>>) -> Self {
        Self { sets }
    }

    /// Returns the transactions that must accompany `digest`, if it is safe
    /// to schedule at all.
    pub fn get(&self, digest: &T::Digest) -> Option<&[T]> {
        self.sets.get(digest).map(Vec::as_slice)
    }

    /// Iterates over all schedulable transactions and their companions, in
    /// digest order.
    pub fn iter(&self) -> impl Iterator<Item = (&T::Digest, &[T])> + '_ {
        self.sets
            .iter()
            .map(|(digest, companions)| (digest, companions.as_slice()))
    }

    /// Returns the number of schedulable transactions.
    pub fn len(&self) -> usize {
        self.sets.len()
    }

    /// Returns whether no transaction is currently schedulable.
    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    /// Assembles a block from the union of all blocking sets.
    ///
    /// Selection walks the union in digest order and stops at the first
    /// transaction that would exceed a limit, so assembly is deterministic
    /// for the same inputs. A limit may cut a blocking class short; the
    /// omitted companions are expected to be re-included in a later round.
    pub fn new_block(&self, options: BlockOptions) -> Block<T> {
        let mut union: BTreeMap<T::Digest, &T> = BTreeMap::new();
        for companions in self.sets.values() {
            for transaction in companions {
                union.entry(transaction.digest()).or_insert(transaction);
            }
        }

        let mut transactions = Vec::new();
        let mut size = 0;
        for transaction in union.into_values() {
            if let Some(limit) = options.max_transactions {
                if transactions.len() >= limit {
                    break;
                }
            }
            if let Some(limit) = options.max_bytes {
                if size + transaction.encode_size() > limit {
                    break;
                }
            }
            size += transaction.encode_size();
            transactions.push(transaction.clone());
        }
        Block::new(transactions)
    }
}
