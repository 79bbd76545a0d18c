//! Top-level orchestrator: a `Translator` type that owns the per-inode/
//! per-fd tables and drives the TXE/RSS/SHE/ER components, exposing
//! `#[instrument]`ed per-fop entry points as the crate's actual public
//! surface. Everything here is a thin dispatcher — the phase machinery,
//! classification and selection logic all live in `txn`/`heal`/`rss`/`event`.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{info, instrument};

use crate::{
    config::Config,
    csh::{ChildHandle, DirEntry},
    error::{FopErrno, HealError},
    event::{spawn_reconnect_heals, Er, UpwardEvent},
    fd::{FdContext, FdId, FdTable},
    fop::{FopReply, InodeId, MutatingFop},
    heal::{EntryContext, HealOutcome, She},
    inode::{InodeContext, InodeTable},
    rss::{OpClassTag, Rss},
    txn::Txe,
};

/// Owns the per-inode/per-fd bookkeeping and the N child handles; the
/// single entrypoint a host process drives every fop through.
#[derive(Debug)]
pub struct Translator {
    children: Vec<Arc<dyn ChildHandle>>,
    inodes: Arc<InodeTable>,
    fds: FdTable,
    txe: Txe,
    rss: Rss,
    she: Arc<She>,
    er: Er,
    consistent_metadata: bool,
    self_heal_daemon: bool,
}

impl Translator {
    pub fn new(children: Vec<Arc<dyn ChildHandle>>, config: &Config) -> Self {
        let n = children.len();
        Translator {
            children,
            inodes: Arc::new(InodeTable::new(n)),
            fds: FdTable::new(),
            txe: Txe::new(config.inodelk_domain.clone(), n),
            rss: Rss::new(config.read_child),
            she: Arc::new(She::new(config.heal_domain.clone(), n, config.heal_segment_size)),
            er: Er::new(n),
            consistent_metadata: config.consistent_metadata,
            self_heal_daemon: config.self_heal_daemon,
        }
    }

    fn inode_ctx(&self, inode: InodeId) -> Arc<Mutex<InodeContext>> {
        self.inodes.get_or_create(inode)
    }

    /// Entry point for every mutating fop: runs the TXE's five phases and
    /// surfaces the arbitrated reply, or the `FopErrno` a `TxnError` maps
    /// onto.
    #[instrument(skip(self, fop), fields(inode = %inode))]
    pub async fn mutate(&self, inode: InodeId, fop: MutatingFop) -> Result<FopReply, FopErrno> {
        let ic = self.inode_ctx(inode);
        self.txe
            .run(&self.children, &ic, inode, &fop, self.consistent_metadata)
            .await
            .map_err(|err| err.as_fop_errno())
    }

    /// Read subvolume for `inode`'s current op class.
    pub fn read_subvol(&self, inode: InodeId, class: OpClassTag) -> Result<usize, FopErrno> {
        let ic = self.inode_ctx(inode);
        self.rss.pick(&ic, class).map_err(|_| FopErrno::Enotconn)
    }

    /// Advances past a read subvolume that just returned ENOTCONN. Returns
    /// ENOTCONN again once exhausted.
    pub fn read_subvol_failover(
        &self,
        inode: InodeId,
        class: OpClassTag,
        failed: usize,
    ) -> Result<usize, FopErrno> {
        let ic = self.inode_ctx(inode);
        self.rss.advance(&ic, class, failed).map_err(|_| FopErrno::Enotconn)
    }

    /// Opens a fresh fd, returning the opaque handle the host threads
    /// through subsequent read/readdir/close calls.
    pub fn open(&self, flags: i32) -> (FdId, Arc<Mutex<FdContext>>) {
        self.fds.open(self.children.len(), flags)
    }

    pub fn fd(&self, fd: FdId) -> Option<Arc<Mutex<FdContext>>> {
        self.fds.get(fd)
    }

    pub fn close(&self, fd: FdId) {
        self.fds.close(fd);
    }

    /// Readdir subvolume for `dir`, honoring the fd's sticky pin.
    pub fn readdir_subvol(&self, dir: InodeId, fdc: &FdContext) -> Result<usize, FopErrno> {
        let ic = self.inode_ctx(dir);
        self.rss.pick_for_readdir(&ic, fdc).map_err(|_| FopErrno::Enotconn)
    }

    /// Dispatches one readdir batch for `dir` through `fdc`'s child,
    /// picking it via RSS on the first call, then pins the fd to the
    /// child actually used so every later batch on this fd goes to the
    /// same subvolume regardless of subsequent readability changes.
    pub async fn readdir_subvol_entries(
        &self,
        dir: InodeId,
        fdc: &Arc<Mutex<FdContext>>,
        cookie: u64,
    ) -> Result<(Vec<DirEntry>, u64), FopErrno> {
        let subvol = self.readdir_subvol(dir, &fdc.lock())?;
        let (entries, next_cookie) = self.children[subvol].readdir(dir, cookie).await?;
        fdc.lock().bind_readdir_subvol(subvol, next_cookie);
        Ok((entries, next_cookie))
    }

    /// Triggers an inline self-heal pass for `inode`, independent of the
    /// event router's background scheduling (e.g. a caller-observed
    /// divergence on lookup).
    pub async fn heal(
        &self,
        inode: InodeId,
        entry_ctx: Option<&EntryContext>,
    ) -> Result<Vec<HealOutcome>, HealError> {
        let ic = self.inode_ctx(inode);
        self.she.heal_inode(&self.children, &ic, inode, entry_ctx).await
    }

    /// Child `i` reconnected: escalates to the event router and, on the
    /// all-down → some-up transition with the self-heal daemon enabled,
    /// schedules background heals for the root inode plus every inode
    /// flagged `need_heal`.
    pub fn on_child_connected(&self, i: usize, root_inode: InodeId) -> Option<UpwardEvent> {
        let event = self.er.on_child_connected(i, &self.inodes);
        if event == Some(UpwardEvent::ChildUp) {
            let candidates =
                self.er.heal_candidates_on_reconnect(self.self_heal_daemon, &self.inodes, root_inode);
            if !candidates.is_empty() {
                info!(count = candidates.len(), "scheduling background self-heal after reconnect");
                spawn_reconnect_heals(self.she.clone(), self.children.clone(), self.inodes.clone(), candidates);
            }
        }
        event
    }

    /// Child `i` disconnected: escalates to the event router.
    pub fn on_child_disconnected(&self, i: usize) -> Option<UpwardEvent> {
        self.er.on_child_disconnected(i, &self.inodes)
    }

    /// The host process is shutting down.
    pub fn on_parent_down(&self) -> UpwardEvent {
        self.er.on_parent_down()
    }

    pub fn child_count(&self) -> usize {
        self.children.len()
    }

    pub fn is_child_up(&self, i: usize) -> bool {
        self.er.is_up(i)
    }
}
