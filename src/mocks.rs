//! Mock implementations of [crate::Transaction] for tests.

use bytes::BufMut;
use commonware_cryptography::{sha256, Digestible, Hasher, Sha256};

/// An opaque, byte-backed transaction with a precomputed SHA-256 digest and
/// an optional label for readable test output.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transaction {
    bytes: Vec<u8>,
    label: Option<String>,
    digest: sha256::Digest,
}

impl Transaction {
    /// Creates a transaction whose digest is the SHA-256 of `bytes`.
    pub fn new(bytes: impl AsRef<[u8]>) -> Self {
        let bytes = bytes.as_ref().to_vec();
        let digest = Sha256::new().update(&bytes).finalize();
        Self {
            bytes,
            label: None,
            digest,
        }
    }

    /// Attaches a human-readable label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Returns the raw transaction body.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl Digestible for Transaction {
    type Digest = sha256::Digest;

    fn digest(&self) -> sha256::Digest {
        self.digest
    }
}

impl commonware_codec::Write for Transaction {
    fn write(&self, writer: &mut impl BufMut) {
        writer.put_slice(&self.bytes);
    }
}

impl commonware_codec::EncodeSize for Transaction {
    fn encode_size(&self) -> usize {
        self.bytes.len()
    }
}

impl crate::Transaction for Transaction {
    fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }
}
