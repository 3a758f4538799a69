//! Types used in [crate].

use crate::Transaction;
use bytes::{Buf, BufMut};
use commonware_codec::{Encode, EncodeSize, Error as CodecError, Read, ReadExt, Write};
use commonware_cryptography::{Digest, PublicKey, Signer};
use commonware_utils::union;

/// Suffix used to identify a vote namespace for domain separation.
///
/// Used when signing and verifying votes to prevent signature reuse across
/// different message types.
pub const VOTE_SUFFIX: &[u8] = b"_VOTE";

/// Returns a suffixed namespace for signing a vote.
#[inline]
pub fn vote_namespace(namespace: &[u8]) -> Vec<u8> {
    union(namespace, VOTE_SUFFIX)
}

/// A validator's assertion that it observed a transaction at a given local
/// sequence position.
///
/// Sequence positions are monotonically non-decreasing per validator but are
/// not required to arrive gap-free: votes may be delivered out of order, and
/// intermediate positions may never arrive at all.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Vote<P: PublicKey, D: Digest> {
    /// Public key of the observing validator.
    pub public_key: P,

    /// The validator's local observation index for the transaction.
    pub sequence: u64,

    /// Digest of the observed transaction.
    pub digest: D,
}

impl<P: PublicKey, D: Digest> Vote<P, D> {
    /// Create a new vote with the given observer, sequence position, and
    /// transaction digest.
    pub const fn new(public_key: P, sequence: u64, digest: D) -> Self {
        Self {
            public_key,
            sequence,
            digest,
        }
    }
}

impl<P: PublicKey, D: Digest> Write for Vote<P, D> {
    fn write(&self, writer: &mut impl BufMut) {
        self.public_key.write(writer);
        // Fixed-width (rather than varint) so the encoding matches the
        // canonical wire format: pubkey || sequence (8B big-endian) || digest.
        self.sequence.write(writer);
        self.digest.write(writer);
    }
}

impl<P: PublicKey, D: Digest> Read for Vote<P, D> {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &()) -> Result<Self, CodecError> {
        let public_key = P::read(reader)?;
        let sequence = u64::read(reader)?;
        let digest = D::read(reader)?;
        Ok(Self {
            public_key,
            sequence,
            digest,
        })
    }
}

impl<P: PublicKey, D: Digest> EncodeSize for Vote<P, D> {
    fn encode_size(&self) -> usize {
        self.public_key.encode_size() + self.sequence.encode_size() + self.digest.encode_size()
    }
}

/// A [Vote] bound to a signature from the validator that produced it.
///
/// The signature covers the canonical encoding of the vote under a
/// domain-separated namespace, so any mutation of the vote after signing
/// invalidates verification.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignedVote<P: PublicKey, D: Digest> {
    /// The vote being attested to.
    pub vote: Vote<P, D>,

    /// Signature of `vote.public_key` over the vote.
    pub signature: P::Signature,
}

impl<P: PublicKey, D: Digest> SignedVote<P, D> {
    /// Generate a new signed vote for the given sequence position and
    /// transaction digest.
    pub fn sign<S: Signer<PublicKey = P, Signature = P::Signature>>(
        namespace: &[u8],
        signer: &S,
        sequence: u64,
        digest: D,
    ) -> Self {
        let namespace = vote_namespace(namespace);
        let vote = Vote::new(signer.public_key(), sequence, digest);
        let signature = signer.sign(&namespace, &vote.encode());
        Self { vote, signature }
    }

    /// Verify the signature against the public key embedded in the vote.
    pub fn verify(&self, namespace: &[u8]) -> bool {
        let namespace = vote_namespace(namespace);
        self.vote
            .public_key
            .verify(&namespace, &self.vote.encode(), &self.signature)
    }
}

impl<P: PublicKey, D: Digest> Write for SignedVote<P, D> {
    fn write(&self, writer: &mut impl BufMut) {
        self.vote.write(writer);
        self.signature.write(writer);
    }
}

impl<P: PublicKey, D: Digest> Read for SignedVote<P, D> {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &()) -> Result<Self, CodecError> {
        let vote = Vote::read(reader)?;
        let signature = P::Signature::read(reader)?;
        Ok(Self { vote, signature })
    }
}

impl<P: PublicKey, D: Digest> EncodeSize for SignedVote<P, D> {
    fn encode_size(&self) -> usize {
        self.vote.encode_size() + self.signature.encode_size()
    }
}

/// A set of transactions assembled for proposal (or received back after
/// commitment).
///
/// Only the digests of the contained transactions are consulted when a block
/// is committed.
#[derive(Clone, Debug)]
pub struct Block<T: Transaction> {
    /// Transactions included in the block, in assembly order.
    pub transactions: Vec<T>,
}

impl<T: Transaction> Block<T> {
    /// Create a new block over the given transactions.
    pub const fn new(transactions: Vec<T>) -> Self {
        Self { transactions }
    }

    /// Returns the digests of all included transactions.
    pub fn digests(&self) -> impl Iterator<Item = T::Digest> + '_ {
        self.transactions.iter().map(|transaction| transaction.digest())
    }

    /// Returns the summed encoded size of all included transactions.
    pub fn size(&self) -> usize {
        self.transactions
            .iter()
            .map(|transaction| transaction.encode_size())
            .sum()
    }

    /// Returns the number of included transactions.
    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    /// Returns whether the block contains no transactions.
    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }
}
