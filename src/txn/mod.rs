//! Transaction Engine (TXE).
//!
//! Drives the five-phase replicated mutation (LOCKING → PRE_OP → FOP →
//! POST_OP → UNLOCKING → DONE) for one `MutatingFop` against one inode,
//! fanning each phase out to every locked child and folding per-child
//! replies into a single caller-visible outcome.

use std::{collections::HashSet, sync::Arc};

use parking_lot::Mutex;
use tracing::{debug, instrument, warn};

use crate::{
    clc::Clc,
    csh::ChildHandle,
    error::{FopErrno, LockError, TxnError},
    fop::{FopReply, InodeId, MutatingFop},
    inode::InodeContext,
    lock::{Elm, LockSet, LockTarget},
    rss::{self, OpClassTag},
};

/// Phase of a single in-flight transaction record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnPhase {
    Init,
    Locking,
    PreOp,
    Fop,
    PostOp,
    Unlocking,
    Done,
}

fn op_class_tag(class: crate::fop::OpClass) -> OpClassTag {
    use crate::fop::OpClass;
    match class {
        OpClass::Entry | OpClass::EntryRename => OpClassTag::Entry,
        OpClass::Data => OpClassTag::Data,
        OpClass::Metadata => OpClassTag::Metadata,
    }
}

/// The transaction record: per-phase bookkeeping for one fop against one
/// inode, across the N children. Not reused across transactions.
#[derive(Debug)]
struct Txr {
    phase: TxnPhase,
    pre_op: Vec<bool>,
    failed: Vec<bool>,
    replies: Vec<Option<FopReply>>,
    first_error: Option<FopErrno>,
}

impl Txr {
    fn new(n: usize) -> Self {
        Txr {
            phase: TxnPhase::Init,
            pre_op: vec![false; n],
            failed: vec![false; n],
            replies: vec![None; n],
            first_error: None,
        }
    }

    /// `first_error` is the highest-priority `FopErrno` observed among
    /// failed children, per `FopErrno`'s `Ord`.
    fn note_error(&mut self, errno: FopErrno) {
        self.first_error = Some(match self.first_error {
            Some(existing) if existing <= errno => existing,
            _ => errno,
        });
    }
}

/// The transaction engine. Stateless beyond its domain strings and `N`;
/// every call takes the children, IC and fop explicitly, mirroring
/// CLC/ELM's statelessness.
#[derive(Debug, Clone)]
pub struct Txe {
    elm: Elm,
    clc: Clc,
    n: usize,
}

impl Txe {
    pub fn new(lock_domain: impl Into<String>, n: usize) -> Self {
        Txe {
            elm: Elm::new(lock_domain),
            clc: Clc::new(n),
            n,
        }
    }

    /// Derives the lock targets for `fop`: a single whole-range lock for
    /// DATA/METADATA, an entry lock for ENTRY, and two entry locks for
    /// RENAME (source and destination names), plus a third whole-inode
    /// lock on the replaced target when it is a directory — `Elm::acquire`
    /// places all of them in canonical order to avoid an AB/BA deadlock
    /// against a concurrent reverse rename or an op racing the replaced
    /// directory directly.
    pub fn lock_targets_for(&self, inode: InodeId, fop: &MutatingFop) -> Vec<LockTarget> {
        use MutatingFop::*;
        match fop {
            Create { parent, basename, .. }
            | Mkdir { parent, basename, .. }
            | Mknod { parent, basename, .. }
            | Symlink { parent, basename, .. }
            | Link { parent, basename, .. }
            | Unlink { parent, basename }
            | Rmdir { parent, basename } => vec![LockTarget::Entry {
                parent: *parent,
                basename: basename.clone(),
            }],
            Rename {
                parent,
                basename,
                new_parent,
                new_basename,
                target_inode,
                target_is_dir,
            } => {
                let mut targets = vec![
                    LockTarget::Entry {
                        parent: *parent,
                        basename: basename.clone(),
                    },
                    LockTarget::Entry {
                        parent: *new_parent,
                        basename: new_basename.clone(),
                    },
                ];
                if *target_is_dir {
                    if let Some(target_inode) = target_inode {
                        targets.push(LockTarget::Range {
                            inode: *target_inode,
                            offset: 0,
                            len: 0,
                        });
                    }
                }
                targets
            }
            Writev { .. } | Truncate { .. } | Ftruncate { .. } | Fallocate { .. }
            | Discard { .. } | Zerofill { .. } | Setattr { .. } | Setxattr { .. }
            | Removexattr { .. } => vec![LockTarget::Range {
                inode,
                offset: 0,
                len: 0,
            }],
        }
    }

    /// Runs the full five-phase transaction for `fop` against `inode`,
    /// returning the caller-visible reply chosen by arbitration, or a
    /// `TxnError` when no child produced a usable result.
    #[instrument(skip(self, children, ic, fop), fields(inode = %inode))]
    pub async fn run(
        &self,
        children: &[Arc<dyn ChildHandle>],
        ic: &Arc<Mutex<InodeContext>>,
        inode: InodeId,
        fop: &MutatingFop,
        consistent_metadata: bool,
    ) -> Result<FopReply, TxnError> {
        let class = fop.op_class();
        let kind = class.counter_kind();
        let tag = op_class_tag(class);
        let targets = self.lock_targets_for(inode, fop);

        let mut txr = Txr::new(self.n);

        // 1. LOCKING.
        txr.phase = TxnPhase::Locking;
        debug!(phase = ?txr.phase, "entering phase");
        let lock_set = self
            .elm
            .acquire(children, targets)
            .await
            .map_err(|source| TxnError::Lock { source })?;

        if !lock_set.any_locked() {
            return Err(TxnError::Lock {
                source: LockError::AllChildrenDown,
            });
        }

        // 2. PRE_OP.
        txr.phase = TxnPhase::PreOp;
        debug!(phase = ?txr.phase, "entering phase");
        self.pre_op(children, inode, kind, &lock_set, &mut txr).await;

        if txr.pre_op.iter().all(|&ok| !ok) {
            txr.phase = TxnPhase::Unlocking;
            self.elm.release(children, &lock_set).await;
            return Err(TxnError::PreOpAllFailed);
        }

        // 3. FOP.
        txr.phase = TxnPhase::Fop;
        debug!(phase = ?txr.phase, "entering phase");
        self.fop(children, fop, &mut txr).await;

        // 4. POST_OP.
        txr.phase = TxnPhase::PostOp;
        debug!(phase = ?txr.phase, "entering phase");
        self.post_op(children, inode, kind, &mut txr).await;

        // 5. UNLOCKING.
        txr.phase = TxnPhase::Unlocking;
        debug!(phase = ?txr.phase, "entering phase");
        self.elm.release(children, &lock_set).await;
        txr.phase = TxnPhase::Done;

        self.finish(ic, tag, consistent_metadata, &txr)
    }

    /// For every locked child, blames every *other* child in the mirror
    /// (not only up ones — see DESIGN.md) as an xattrop ADD, recording
    /// `pre_op[i]` on success.
    async fn pre_op(
        &self,
        children: &[Arc<dyn ChildHandle>],
        inode: InodeId,
        kind: crate::clc::CounterKind,
        lock_set: &LockSet,
        txr: &mut Txr,
    ) {
        for i in lock_set.locked_children() {
            let peers: HashSet<usize> = (0 .. self.n).filter(|&j| j != i).collect();
            let delta = self.clc.encode_increment(&peers);
            match children[i].xattrop_add(inode, kind, &delta).await {
                Ok(_) => {
                    txr.pre_op[i] = true;
                }
                Err(errno) => {
                    warn!(child = i, %errno, "pre-op xattrop failed");
                    txr.note_error(errno);
                }
            }
        }
    }

    /// Dispatches `fop` to every child that completed PRE_OP, recording a
    /// per-child failure unless the errno is tolerated for this fop kind.
    async fn fop(&self, children: &[Arc<dyn ChildHandle>], fop: &MutatingFop, txr: &mut Txr) {
        for i in 0 .. self.n {
            if !txr.pre_op[i] {
                continue;
            }
            let reply = children[i].dispatch(fop).await;
            if let Err(errno) = reply.result {
                if !fop.tolerated_errno(errno) {
                    txr.failed[i] = true;
                    txr.note_error(errno);
                } else {
                    debug!(child = i, %errno, "tolerated fop errno");
                }
            }
            txr.replies[i] = Some(reply);
        }
    }

    /// For every child that completed PRE_OP, clears blame toward every
    /// *other* child that both completed PRE_OP and succeeded the FOP,
    /// leaving blame toward any failed or never-pre-op'd peer. That
    /// asymmetry is exactly what lets the next self-heal pass classify
    /// source vs. sink.
    async fn post_op(
        &self,
        children: &[Arc<dyn ChildHandle>],
        inode: InodeId,
        kind: crate::clc::CounterKind,
        txr: &mut Txr,
    ) {
        let succeeded: HashSet<usize> = (0 .. self.n)
            .filter(|&j| txr.pre_op[j] && !txr.failed[j])
            .collect();

        for i in 0 .. self.n {
            if !txr.pre_op[i] {
                continue;
            }
            let clear: HashSet<usize> = succeeded.iter().copied().filter(|&j| j != i).collect();
            let delta = self.clc.encode_decrement(&clear);
            if let Err(errno) = children[i].xattrop_add(inode, kind, &delta).await {
                // Per "Failure semantics": POST_OP failing on a child does
                // not roll anything back; the next heal trigger retries it.
                warn!(child = i, %errno, "post-op xattrop failed, deferring to next heal");
            }
        }
    }

    /// Folds the final per-child state into readability bits, arbitrates
    /// the caller-visible reply, and bumps the event generation so RSS's
    /// cache sees the new state.
    fn finish(
        &self,
        ic: &Arc<Mutex<InodeContext>>,
        tag: OpClassTag,
        consistent_metadata: bool,
        txr: &Txr,
    ) -> Result<FopReply, TxnError> {
        let succeeded: Vec<usize> = (0 .. self.n)
            .filter(|&i| txr.pre_op[i] && !txr.failed[i])
            .collect();

        {
            let mut guard = ic.lock();
            let mask = match tag {
                OpClassTag::Data => &mut guard.data_readable,
                OpClassTag::Metadata => &mut guard.metadata_readable,
                OpClassTag::Entry => &mut guard.entry_readable,
            };
            for i in 0 .. self.n {
                if txr.pre_op[i] && txr.failed[i] {
                    mask.set(i, false);
                }
            }
            guard.bump_generation();
        }

        if succeeded.is_empty() {
            return Err(TxnError::FopAllFailed {
                errno: txr.first_error.unwrap_or(FopErrno::Eio),
            });
        }

        let guard = ic.lock();
        let arb = rss::arbitrate(&succeeded, &guard, consistent_metadata)
            .expect("succeeded is non-empty, arbitrate always returns Some");
        if arb.needs_heal {
            drop(guard);
            ic.lock().need_heal = true;
        }

        txr.replies[arb.subvol]
            .clone()
            .ok_or(TxnError::FopAllFailed {
                errno: txr.first_error.unwrap_or(FopErrno::Eio),
            })
    }
}
