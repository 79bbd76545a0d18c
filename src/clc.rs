//! Change-Log Codec (CLC).
//!
//! Encodes, decodes and merges the per-inode "pending" vector held as an
//! extended attribute on each child. Three counter kinds (DATA, METADATA,
//! ENTRY) are independent; each is a fixed-width, non-negative, big-endian
//! integer vector indexed by peer.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::ClcError;

/// The three independent counter kinds tracked per inode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CounterKind {
    Data,
    Metadata,
    Entry,
}

impl CounterKind {
    pub const ALL: [CounterKind; 3] =
        [CounterKind::Data, CounterKind::Metadata, CounterKind::Entry];

    /// The stable xattr name prefix used to store this counter kind. Exact
    /// bytes are configuration; this is a sane, stable default.
    pub fn xattr_name(self) -> &'static str {
        match self {
            CounterKind::Data => "trusted.afr.pending.data",
            CounterKind::Metadata => "trusted.afr.pending.metadata",
            CounterKind::Entry => "trusted.afr.pending.entry",
        }
    }
}

/// An opaque, big-endian encoded pending vector as stored in an extended
/// attribute. Width is fixed at setup (`N`, the child count) and MUST match
/// between peers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingBlob(Vec<u8>);

impl PendingBlob {
    /// Build a blob from a decoded vector, big-endian i64-per-slot.
    fn from_vec(v: &[i64]) -> Self {
        let mut bytes = Vec::with_capacity(v.len() * 8);
        for slot in v {
            bytes.extend_from_slice(&slot.to_be_bytes());
        }
        PendingBlob(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        PendingBlob(bytes)
    }

    pub fn width(&self) -> usize {
        self.0.len() / 8
    }
}

/// Change-Log Codec. Stateless; all operations are pure functions of their
/// inputs.
#[derive(Debug, Clone, Copy)]
pub struct Clc {
    /// N, the fixed child count agreed at setup.
    n: usize,
}

impl Clc {
    pub fn new(n: usize) -> Self {
        Clc {
            n,
        }
    }

    pub fn n(&self) -> usize {
        self.n
    }

    /// `encode_increment(peers_to_blame) -> opaque`: an N-entry vector where
    /// positions in `peers_to_blame` are +1, others 0.
    pub fn encode_increment(&self, peers_to_blame: &HashSet<usize>) -> PendingBlob {
        self.encode_delta(peers_to_blame, 1)
    }

    /// `encode_decrement(peers_previously_blamed) -> opaque`: the same
    /// positions are -1, others 0.
    pub fn encode_decrement(&self, peers_previously_blamed: &HashSet<usize>) -> PendingBlob {
        self.encode_delta(peers_previously_blamed, -1)
    }

    fn encode_delta(&self, peers: &HashSet<usize>, delta: i64) -> PendingBlob {
        let mut v = vec![0i64; self.n];
        for &i in peers {
            if i < self.n {
                v[i] = delta;
            }
        }
        PendingBlob::from_vec(&v)
    }

    /// `merge(existing, delta) -> opaque`: element-wise sum, floored at 0.
    /// This is the semantics of the xattrop `ADD_ARRAY` primitive.
    pub fn merge(&self, existing: &PendingBlob, delta: &PendingBlob) -> Result<PendingBlob, ClcError> {
        let a = self.decode(existing)?;
        let b = self.decode(delta)?;
        let merged: Vec<i64> = a
            .iter()
            .zip(b.iter())
            .map(|(x, y)| std::cmp::max(0, x + y))
            .collect();
        Ok(PendingBlob::from_vec(&merged))
    }

    /// Signed-safe decode, for diagnostic printing and classification only.
    pub fn decode(&self, blob: &PendingBlob) -> Result<Vec<i64>, ClcError> {
        if blob.width() != self.n {
            return Err(ClcError::Malformed {
                expected: self.n,
                got: blob.width(),
            });
        }
        let mut out = Vec::with_capacity(self.n);
        for chunk in blob.as_bytes().chunks_exact(8) {
            let mut arr = [0u8; 8];
            arr.copy_from_slice(chunk);
            out.push(i64::from_be_bytes(arr));
        }
        Ok(out)
    }

    /// A zero vector of width N, the value of "no pending writes".
    pub fn zero(&self) -> PendingBlob {
        PendingBlob::from_vec(&vec![0i64; self.n])
    }
}
