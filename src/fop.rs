//! Wire-shape types for the downstream fop interface.
//!
//! The actual XDR request/response shapes and the RPC codec that puts them
//! on the wire are external collaborators; this module only defines the
//! in-process shapes the TXE, RSS and SHE pass to a `ChildHandle`
//! implementation.
//!
//! `Xdata` is a small, schema-typed key/value map rather than a generic
//! dynamically-keyed dict, to avoid string-keyed lookup in hot paths.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::FopErrno;

/// Opaque inode identity (the gfid of the original system).
pub type InodeId = Uuid;

/// A location: either a (parent, basename) pair for entry-based lookups, or
/// a resolved inode id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    pub inode: Option<InodeId>,
    pub parent: Option<InodeId>,
    pub basename: Option<String>,
}

impl Location {
    pub fn by_inode(inode: InodeId) -> Self {
        Location {
            inode: Some(inode),
            parent: None,
            basename: None,
        }
    }

    pub fn by_entry(parent: InodeId, basename: impl Into<String>) -> Self {
        Location {
            inode: None,
            parent: Some(parent),
            basename: Some(basename.into()),
        }
    }
}

/// Known, enum-tagged xdata keys. Unknown keys are never produced by this
/// crate; a `ChildHandle` implementation may still pass arbitrary opaque
/// bytes through `Xdata::opaque`, but nothing in the hot path does a
/// string-keyed lookup.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub enum XdataKey {
    PendingData,
    PendingMetadata,
    PendingEntry,
    NeedHeal,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Xdata {
    known: BTreeMap<XdataKey, Vec<u8>>,
    opaque: BTreeMap<String, Vec<u8>>,
}

impl Xdata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: XdataKey, value: Vec<u8>) {
        self.known.insert(key, value);
    }

    pub fn get(&self, key: XdataKey) -> Option<&[u8]> {
        self.known.get(&key).map(|v| v.as_slice())
    }

    pub fn set_opaque(&mut self, key: impl Into<String>, value: Vec<u8>) {
        self.opaque.insert(key.into(), value);
    }
}

/// A minimal stat snapshot: the fields the arbitration subvolume forwards
/// to the caller as the canonical reply.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Stat {
    pub size: u64,
    pub blocks: u64,
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub atime: i64,
    pub mtime: i64,
    pub ctime: i64,
}

/// The class of a mutating operation — determines the lock target shape
/// and which counter kind PRE_OP/POST_OP bump.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OpClass {
    Entry,
    EntryRename,
    Data,
    Metadata,
}

impl OpClass {
    pub fn counter_kind(self) -> crate::clc::CounterKind {
        use crate::clc::CounterKind;
        match self {
            OpClass::Entry | OpClass::EntryRename => CounterKind::Entry,
            OpClass::Data => CounterKind::Data,
            OpClass::Metadata => CounterKind::Metadata,
        }
    }
}

/// The full set of mutating fops the TXE dispatches: every entry here is
/// intercepted by the TXE's five-phase machine. Non-mutating fops (readv,
/// stat, readdir, ...) go through RSS instead and are modeled separately
/// in `rss.rs`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MutatingFop {
    Create {
        parent: InodeId,
        basename: String,
        mode: u32,
    },
    Mkdir {
        parent: InodeId,
        basename: String,
        mode: u32,
    },
    Mknod {
        parent: InodeId,
        basename: String,
        mode: u32,
    },
    Symlink {
        parent: InodeId,
        basename: String,
        target: String,
    },
    Link {
        parent: InodeId,
        basename: String,
        target_inode: InodeId,
    },
    Unlink {
        parent: InodeId,
        basename: String,
    },
    Rmdir {
        parent: InodeId,
        basename: String,
    },
    Rename {
        parent: InodeId,
        basename: String,
        new_parent: InodeId,
        new_basename: String,
        /// Set together with `target_is_dir` when the destination name
        /// already resolves to an inode (the rename will replace it):
        /// that inode is locked as a third entity so a concurrent op
        /// against it serializes with this rename instead of racing it.
        target_inode: Option<InodeId>,
        target_is_dir: bool,
    },
    Writev {
        inode: InodeId,
        offset: u64,
        data: bytes::Bytes,
    },
    Truncate {
        inode: InodeId,
        size: u64,
    },
    Ftruncate {
        inode: InodeId,
        size: u64,
    },
    Fallocate {
        inode: InodeId,
        offset: u64,
        len: u64,
    },
    Discard {
        inode: InodeId,
        offset: u64,
        len: u64,
    },
    Zerofill {
        inode: InodeId,
        offset: u64,
        len: u64,
    },
    Setattr {
        inode: InodeId,
        mode: Option<u32>,
        uid: Option<u32>,
        gid: Option<u32>,
        atime: Option<i64>,
        mtime: Option<i64>,
    },
    Setxattr {
        inode: InodeId,
        name: String,
        value: Vec<u8>,
    },
    Removexattr {
        inode: InodeId,
        name: String,
    },
}

impl MutatingFop {
    pub fn op_class(&self) -> OpClass {
        use MutatingFop::*;
        match self {
            Create { .. } | Mkdir { .. } | Mknod { .. } | Symlink { .. }
            | Link { .. } | Unlink { .. } | Rmdir { .. } => OpClass::Entry,
            Rename {
                ..
            } => OpClass::EntryRename,
            Writev { .. } | Truncate { .. } | Ftruncate { .. } | Fallocate { .. }
            | Discard { .. } | Zerofill { .. } => OpClass::Data,
            Setattr { .. } | Setxattr { .. } | Removexattr { .. } => OpClass::Metadata,
        }
    }

    /// Errno values that a partial-success FOP phase must NOT treat as a
    /// per-child failure: e.g. a concurrent unlink racing a create can
    /// legitimately return EEXIST/ENOTEMPTY on some children without that
    /// being a real divergence.
    pub fn tolerated_errno(&self, errno: FopErrno) -> bool {
        use MutatingFop::*;
        matches!(
            (self, errno),
            (Rmdir { .. }, FopErrno::Enotempty)
                | (Unlink { .. }, FopErrno::Enotempty)
                | (Create { .. }, FopErrno::Eexist)
                | (Mkdir { .. }, FopErrno::Eexist)
                | (Mknod { .. }, FopErrno::Eexist)
        )
    }
}

/// Per-child reply to a dispatched fop.
#[derive(Debug, Clone, PartialEq)]
pub struct FopReply {
    pub result: Result<Stat, FopErrno>,
    pub xdata: Xdata,
}

impl FopReply {
    pub fn ok(stat: Stat) -> Self {
        FopReply {
            result: Ok(stat),
            xdata: Xdata::new(),
        }
    }

    pub fn err(errno: FopErrno) -> Self {
        FopReply {
            result: Err(errno),
            xdata: Xdata::new(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}
