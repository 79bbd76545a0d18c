//! Child Subvolume Handle (CSH).
//!
//! An opaque handle to one replica back-end, exposing the fop interface and
//! an up/down liveness signal over a single back-end with an `async_trait`
//! of `open`/`read_at`/`write_at`-shaped calls.
//!
//! The on-wire RPC codec and the below-translator protocol client that
//! actually ships a fop to a remote child are external collaborators; an
//! implementation of this trait is expected to own that plumbing.

use async_trait::async_trait;

use crate::{
    clc::{CounterKind, PendingBlob},
    error::FopErrno,
    fop::{FopReply, InodeId, MutatingFop, Stat},
};

/// A snapshot of one child's view of an inode's base attributes, fetched
/// during SHE's meta-fetch phase.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChildAttr {
    pub stat: Stat,
}

/// One entry in a directory listing, used by ENTRY heal.
#[derive(Debug, Clone, PartialEq)]
pub struct DirEntry {
    pub basename: String,
    pub inode: InodeId,
}

/// The fop interface exposed by one child back-end. Only the subset the
/// core actually drives is modeled here; fops with no bearing on
/// replication (statfs, access, ...) are out of scope for the core.
#[async_trait]
pub trait ChildHandle: Send + Sync + std::fmt::Debug {
    /// Stable index of this child in `[0, N)`.
    fn index(&self) -> usize;

    /// Current up/down liveness signal.
    fn is_up(&self) -> bool;

    // -- mutating dispatch (driven by the TXE) -----------------------------

    /// Dispatch one mutating fop to this child.
    async fn dispatch(&self, fop: &MutatingFop) -> FopReply;

    // -- locking (driven by the ELM) ---------------------------------------

    /// Non-blocking exclusive entry lock on `(parent, basename)` (and,
    /// additionally, `extra` for RENAME's second/third lock target).
    async fn try_entrylk(&self, domain: &str, parent: InodeId, basename: &str) -> Result<(), FopErrno>;
    async fn entrylk_blocking(&self, domain: &str, parent: InodeId, basename: &str) -> Result<(), FopErrno>;
    async fn entry_unlock(&self, domain: &str, parent: InodeId, basename: &str);

    /// Non-blocking exclusive byte-range lock on `inode`; `len == 0` means
    /// whole file.
    async fn try_inodelk(&self, domain: &str, inode: InodeId, offset: u64, len: u64) -> Result<(), FopErrno>;
    async fn inodelk_blocking(&self, domain: &str, inode: InodeId, offset: u64, len: u64) -> Result<(), FopErrno>;
    async fn inode_unlock(&self, domain: &str, inode: InodeId, offset: u64, len: u64);

    // -- pending-counter xattrs (driven by the CLC via xattrop) ------------

    /// Atomic read-modify-add on the named counter's pending vector.
    async fn xattrop_add(
        &self,
        inode: InodeId,
        kind: CounterKind,
        delta: &PendingBlob,
    ) -> Result<PendingBlob, FopErrno>;

    /// Fetch the current pending vector without mutating it (SHE meta-fetch).
    async fn get_pending(&self, inode: InodeId, kind: CounterKind) -> Result<PendingBlob, FopErrno>;

    // -- plain reads (driven by the RSS and by SHE content sync) -----------

    async fn stat(&self, inode: InodeId) -> Result<ChildAttr, FopErrno>;
    async fn read_at(&self, inode: InodeId, offset: u64, len: u64) -> Result<bytes::Bytes, FopErrno>;
    async fn write_at(&self, inode: InodeId, offset: u64, data: &[u8]) -> Result<(), FopErrno>;
    async fn truncate(&self, inode: InodeId, size: u64) -> Result<(), FopErrno>;
    async fn flush(&self, inode: InodeId) -> Result<(), FopErrno>;

    /// List xattrs for metadata sync.
    async fn list_xattrs(&self, inode: InodeId) -> Result<Vec<(String, Vec<u8>)>, FopErrno>;
    async fn set_xattr(&self, inode: InodeId, name: &str, value: &[u8]) -> Result<(), FopErrno>;
    async fn set_times(&self, inode: InodeId, atime: i64, mtime: i64) -> Result<(), FopErrno>;
    async fn set_owner_mode(&self, inode: InodeId, uid: u32, gid: u32, mode: u32) -> Result<(), FopErrno>;

    /// Entry sync support.
    async fn lookup_entry(&self, parent: InodeId, basename: &str) -> Result<Option<DirEntry>, FopErrno>;
    async fn create_entry_like(
        &self,
        parent: InodeId,
        basename: &str,
        template: &ChildAttr,
    ) -> Result<(), FopErrno>;
    async fn unlink_entry(&self, parent: InodeId, basename: &str) -> Result<(), FopErrno>;

    /// Readdir, bound to this child for the lifetime of one fd stream.
    async fn readdir(&self, dir: InodeId, cookie: u64) -> Result<(Vec<DirEntry>, u64), FopErrno>;
}
