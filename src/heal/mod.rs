//! Self-Heal Engine (SHE).
//!
//! For a given inode, independently per counter kind: fetches pending
//! vectors from every up child, classifies source vs. sink (detecting
//! split brain), locks, streams content/metadata/entries from source to
//! sinks, and clears the corresponding pending positions. Content sync is
//! a chunked copy loop bounded by the configured segment size, with
//! per-chunk error tracking that does not abort the whole job — one
//! source child, many sink children, three independent counter kinds.

use std::{collections::HashSet, sync::Arc};

use byte_unit::Byte;
use chrono::{DateTime, Utc};
use merge::Merge;
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::{
    clc::{Clc, CounterKind},
    csh::ChildHandle,
    error::{FopErrno, HealError},
    fop::InodeId,
    inode::InodeContext,
    lock::{Elm, LockTarget},
};

/// Static per-heal context for an ENTRY heal: the parent directory and
/// basename under which the entry is being reconciled.
#[derive(Debug, Clone)]
pub struct EntryContext {
    pub parent: InodeId,
    pub basename: String,
}

/// Outcome of one counter kind's heal pass against one inode.
#[derive(Debug, Clone, PartialEq)]
pub struct HealOutcome {
    pub kind: CounterKind,
    pub source: Option<usize>,
    pub healed_sinks: Vec<usize>,
    pub failed_sinks: Vec<usize>,
    pub split_brain: bool,
    /// True when the matrix was already zero for this kind; nothing to do.
    pub no_heal_needed: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl HealOutcome {
    fn clean(kind: CounterKind) -> Self {
        let now = Utc::now();
        HealOutcome {
            kind,
            source: None,
            healed_sinks: vec![],
            failed_sinks: vec![],
            split_brain: false,
            no_heal_needed: true,
            started_at: now,
            finished_at: now,
        }
    }
}

/// Aggregate counters across one or more heal passes, combined with
/// `Merge::merge` the same way the per-device I/O counters in this crate's
/// lineage accumulate: each field sums via a saturating strategy so a
/// pass's counts never wrap or get silently dropped.
#[derive(Debug, Default, Clone, Copy, Merge)]
pub struct HealStats {
    #[merge(strategy = merge::num::saturating_add)]
    pub heals_attempted: u64,
    #[merge(strategy = merge::num::saturating_add)]
    pub sinks_healed: u64,
    #[merge(strategy = merge::num::saturating_add)]
    pub sinks_failed: u64,
    #[merge(strategy = merge::num::saturating_add)]
    pub split_brains: u64,
}

impl HealStats {
    fn from_outcome(outcome: &HealOutcome) -> Self {
        HealStats {
            heals_attempted: !outcome.no_heal_needed as u64,
            sinks_healed: outcome.healed_sinks.len() as u64,
            sinks_failed: outcome.failed_sinks.len() as u64,
            split_brains: outcome.split_brain as u64,
        }
    }

    /// Folds every outcome from one `heal_inode` call into a single summary.
    pub fn from_outcomes(outcomes: &[HealOutcome]) -> Self {
        let mut stats = HealStats::default();
        for outcome in outcomes {
            stats.merge(HealStats::from_outcome(outcome));
        }
        stats
    }
}

struct Classification {
    sources: Vec<usize>,
    sinks: Vec<usize>,
    split_brain: bool,
}

/// The self-heal engine. Stateless beyond the heal lock domain, `N` and the
/// content-sync chunk size (`heal_segment_size`).
#[derive(Debug, Clone)]
pub struct She {
    elm: Elm,
    clc: Clc,
    n: usize,
    segment_size: u64,
}

impl She {
    pub fn new(heal_domain: impl Into<String>, n: usize, segment_size: u64) -> Self {
        let segment_size = segment_size.max(1);
        debug!(
            children = n,
            segment_size = %Byte::from_bytes(segment_size as u128).get_appropriate_unit(true),
            "self-heal engine initialized"
        );
        She {
            elm: Elm::new(heal_domain),
            clc: Clc::new(n),
            n,
            segment_size,
        }
    }

    /// Heals one inode across all three counter kinds, each pass
    /// independent of the others. Returns one outcome per kind that was
    /// attempted; a kind already clean is reported with `no_heal_needed`.
    /// Serialized per-inode via `IC.healing` — a concurrent trigger for the
    /// same inode is refused rather than queued, since the triggering
    /// source will fire again (idempotent, legal for multiple triggers to
    /// race).
    pub async fn heal_inode(
        &self,
        children: &[Arc<dyn ChildHandle>],
        ic: &Arc<Mutex<InodeContext>>,
        inode: InodeId,
        entry_ctx: Option<&EntryContext>,
    ) -> Result<Vec<HealOutcome>, HealError> {
        {
            let mut guard = ic.lock();
            if guard.healing {
                return Err(HealError::AlreadyHealing {
                    inode: inode.to_string(),
                });
            }
            guard.healing = true;
        }

        let mut outcomes = Vec::with_capacity(3);
        for kind in CounterKind::ALL {
            if kind == CounterKind::Entry && entry_ctx.is_none() {
                continue;
            }
            let started_at = Utc::now();
            match self.heal_one_kind(children, ic, inode, kind, entry_ctx).await {
                Ok(outcome) => outcomes.push(outcome),
                Err(HealError::SplitBrain { inode, kind, matrix }) => {
                    error!(%inode, ?kind, ?matrix, "split brain detected, heal aborted for this kind");
                    outcomes.push(HealOutcome {
                        kind,
                        source: None,
                        healed_sinks: vec![],
                        failed_sinks: vec![],
                        split_brain: true,
                        no_heal_needed: false,
                        started_at,
                        finished_at: Utc::now(),
                    });
                }
                Err(other) => {
                    ic.lock().healing = false;
                    return Err(other);
                }
            }
        }

        let still_needs_heal = outcomes
            .iter()
            .any(|o| o.split_brain || !o.failed_sinks.is_empty());
        {
            let mut guard = ic.lock();
            guard.healing = false;
            guard.need_heal = still_needs_heal;
        }

        let stats = HealStats::from_outcomes(&outcomes);
        info!(inode = %inode, ?stats, "self-heal summary for inode");

        Ok(outcomes)
    }

    async fn heal_one_kind(
        &self,
        children: &[Arc<dyn ChildHandle>],
        ic: &Arc<Mutex<InodeContext>>,
        inode: InodeId,
        kind: CounterKind,
        entry_ctx: Option<&EntryContext>,
    ) -> Result<HealOutcome, HealError> {
        let started_at = Utc::now();
        let up: Vec<usize> = (0 .. self.n).filter(|&i| children[i].is_up()).collect();
        if up.is_empty() {
            return Err(HealError::NoUpChildren {
                inode: inode.to_string(),
            });
        }

        // 1. Meta-fetch, 2. Matrix build.
        let mut matrix = vec![vec![0i64; self.n]; self.n];
        // A child whose blob fails to decode is treated as missing
        // pending: excluded from source eligibility below rather than
        // aborting the whole pass.
        let mut malformed: HashSet<usize> = HashSet::new();
        for &i in &up {
            let blob = children[i].get_pending(inode, kind).await.ok();
            let row = match blob {
                Some(b) => match self.clc.decode(&b) {
                    Ok(row) => row,
                    Err(err) => {
                        error!(child = i, error = %err, "malformed pending vector, forcing heal");
                        malformed.insert(i);
                        continue;
                    }
                },
                None => continue,
            };
            matrix[i] = row;
            matrix[i][i] = 0;
        }

        // 3. Source/sink classification.
        let classification = self.classify(&matrix, &up, &malformed);
        if classification.split_brain {
            return Err(HealError::SplitBrain {
                inode: inode.to_string(),
                kind,
                matrix,
            });
        }
        if classification.sinks.is_empty() {
            return Ok(HealOutcome::clean(kind));
        }

        // 4. Source selection.
        let src = *classification.sources.iter().min().ok_or(HealError::NoUpChildren {
            inode: inode.to_string(),
        })?;
        let sinks = classification.sinks.clone();

        // 5. Lock.
        let target = match kind {
            CounterKind::Data | CounterKind::Metadata => LockTarget::Range {
                inode,
                offset: 0,
                len: 0,
            },
            CounterKind::Entry => {
                let ctx = entry_ctx.expect("entry heal requires an EntryContext");
                LockTarget::Entry {
                    parent: ctx.parent,
                    basename: ctx.basename.clone(),
                }
            }
        };
        let lock_set = self
            .elm
            .acquire(children, vec![target])
            .await
            .map_err(|source| HealError::Lock {
                inode: inode.to_string(),
                source,
            })?;

        let mut healed_sinks = Vec::new();
        let mut failed_sinks = Vec::new();

        match kind {
            CounterKind::Data => {
                self.sync_content(children, inode, src, &sinks, &mut healed_sinks, &mut failed_sinks)
                    .await;
            }
            CounterKind::Metadata => {
                self.sync_metadata(children, inode, src, &sinks, &mut healed_sinks, &mut failed_sinks)
                    .await;
            }
            CounterKind::Entry => {
                let ctx = entry_ctx.expect("entry heal requires an EntryContext");
                self.sync_entry(children, ctx, src, &sinks, &mut healed_sinks, &mut failed_sinks)
                    .await;
            }
        }

        // 9. Clear pending for fully-healed sinks, on every up child.
        if !healed_sinks.is_empty() {
            let clear: HashSet<usize> = healed_sinks.iter().copied().collect();
            let delta = self.clc.encode_decrement(&clear);
            for &i in &up {
                if let Err(errno) = children[i].xattrop_add(inode, kind, &delta).await {
                    warn!(child = i, %errno, "failed to clear pending after heal");
                }
            }
        }

        // 10. Unlock.
        self.elm.release(children, &lock_set).await;

        if !healed_sinks.is_empty() {
            let mut guard = ic.lock();
            let mask = match kind {
                CounterKind::Data => &mut guard.data_readable,
                CounterKind::Metadata => &mut guard.metadata_readable,
                CounterKind::Entry => &mut guard.entry_readable,
            };
            for &s in &healed_sinks {
                mask.set(s, true);
            }
            guard.bump_generation();
        }

        info!(
            inode = %inode,
            ?kind,
            source = src,
            healed = ?healed_sinks,
            failed = ?failed_sinks,
            "self-heal pass complete"
        );

        Ok(HealOutcome {
            kind,
            source: Some(src),
            healed_sinks,
            failed_sinks,
            split_brain: false,
            no_heal_needed: false,
            started_at,
            finished_at: Utc::now(),
        })
    }

    /// Sources are up children no up peer blames; split brain iff no
    /// source exists yet some entry is non-zero. A child whose own
    /// pending vector was malformed is never a source.
    fn classify(&self, matrix: &[Vec<i64>], up: &[usize], malformed: &HashSet<usize>) -> Classification {
        let up_set: HashSet<usize> = up.iter().copied().collect();
        let sources: Vec<usize> = up
            .iter()
            .copied()
            .filter(|&i| !malformed.contains(&i) && up_set.iter().all(|&j| matrix[j][i] == 0))
            .collect();
        let sinks: Vec<usize> = up.iter().copied().filter(|i| !sources.contains(i)).collect();

        let any_nonzero = up.iter().any(|&i| matrix[i].iter().any(|&v| v != 0));
        let split_brain = sources.is_empty() && any_nonzero;

        Classification { sources, sinks, split_brain }
    }

    /// Chunked read from `src`, write identically to every sink, truncate
    /// stragglers, flush. A sink write failure marks that sink bad but
    /// does not abort the other sinks' copy.
    async fn sync_content(
        &self,
        children: &[Arc<dyn ChildHandle>],
        inode: InodeId,
        src: usize,
        sinks: &[usize],
        healed: &mut Vec<usize>,
        failed: &mut Vec<usize>,
    ) {
        let size = match children[src].stat(inode).await {
            Ok(attr) => attr.stat.size,
            Err(errno) => {
                warn!(child = src, %errno, "failed to stat heal source, aborting content sync");
                failed.extend_from_slice(sinks);
                return;
            }
        };

        let mut bad: HashSet<usize> = HashSet::new();
        let mut offset = 0u64;
        while offset < size {
            let len = self.segment_size.min(size - offset);
            let chunk = match children[src].read_at(inode, offset, len).await {
                Ok(bytes) => bytes,
                Err(errno) => {
                    warn!(child = src, %errno, "heal source read failed, aborting content sync");
                    failed.extend_from_slice(sinks);
                    return;
                }
            };
            if chunk.is_empty() {
                break;
            }
            for &sink in sinks {
                if bad.contains(&sink) {
                    continue;
                }
                if let Err(errno) = children[sink].write_at(inode, offset, &chunk).await {
                    debug!(child = sink, %errno, "heal sink write failed");
                    bad.insert(sink);
                }
            }
            offset += chunk.len() as u64;
        }

        for &sink in sinks {
            if bad.contains(&sink) {
                failed.push(sink);
                continue;
            }
            if let Err(errno) = children[sink].truncate(inode, size).await {
                debug!(child = sink, %errno, "heal sink truncate failed");
                failed.push(sink);
                continue;
            }
            if let Err(errno) = children[sink].flush(inode).await {
                debug!(child = sink, %errno, "heal sink flush failed");
                failed.push(sink);
                continue;
            }
            healed.push(sink);
        }
    }

    /// Mode/owner/times/xattrs copied from `src` verbatim.
    async fn sync_metadata(
        &self,
        children: &[Arc<dyn ChildHandle>],
        inode: InodeId,
        src: usize,
        sinks: &[usize],
        healed: &mut Vec<usize>,
        failed: &mut Vec<usize>,
    ) {
        let attr = match children[src].stat(inode).await {
            Ok(attr) => attr,
            Err(errno) => {
                warn!(child = src, %errno, "failed to stat heal source, aborting metadata sync");
                failed.extend_from_slice(sinks);
                return;
            }
        };
        let xattrs = children[src].list_xattrs(inode).await.unwrap_or_default();

        for &sink in sinks {
            let ok = self
                .apply_metadata(children[sink].as_ref(), inode, &attr.stat, &xattrs)
                .await;
            match ok {
                Ok(()) => healed.push(sink),
                Err(errno) => {
                    debug!(child = sink, %errno, "heal sink metadata apply failed");
                    failed.push(sink);
                }
            }
        }
    }

    async fn apply_metadata(
        &self,
        sink: &dyn ChildHandle,
        inode: InodeId,
        stat: &crate::fop::Stat,
        xattrs: &[(String, Vec<u8>)],
    ) -> Result<(), FopErrno> {
        sink.set_owner_mode(inode, stat.uid, stat.gid, stat.mode).await?;
        sink.set_times(inode, stat.atime, stat.mtime).await?;
        for (name, value) in xattrs {
            sink.set_xattr(inode, name, value).await?;
        }
        Ok(())
    }

    /// Re-create a missing entry on a sink, or remove one the source no
    /// longer has.
    async fn sync_entry(
        &self,
        children: &[Arc<dyn ChildHandle>],
        ctx: &EntryContext,
        src: usize,
        sinks: &[usize],
        healed: &mut Vec<usize>,
        failed: &mut Vec<usize>,
    ) {
        let src_entry = match children[src].lookup_entry(ctx.parent, &ctx.basename).await {
            Ok(e) => e,
            Err(errno) => {
                warn!(child = src, %errno, "failed to look up heal source entry");
                failed.extend_from_slice(sinks);
                return;
            }
        };
        let template = match &src_entry {
            Some(_) => children[src].stat(ctx.parent).await.ok(),
            None => None,
        };

        for &sink in sinks {
            let sink_entry = match children[sink].lookup_entry(ctx.parent, &ctx.basename).await {
                Ok(e) => e,
                Err(errno) => {
                    debug!(child = sink, %errno, "heal sink entry lookup failed");
                    failed.push(sink);
                    continue;
                }
            };

            let result = match (&src_entry, &sink_entry, &template) {
                (Some(_), None, Some(attr)) => {
                    children[sink].create_entry_like(ctx.parent, &ctx.basename, attr).await
                }
                (None, Some(_), _) => children[sink].unlink_entry(ctx.parent, &ctx.basename).await,
                _ => Ok(()),
            };

            match result {
                Ok(()) => healed.push(sink),
                Err(errno) => {
                    debug!(child = sink, %errno, "heal sink entry sync failed");
                    failed.push(sink);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fop::{MutatingFop, Stat};
    use async_trait::async_trait;

    #[derive(Debug)]
    struct FakeChild {
        idx: usize,
        up: bool,
        data: Mutex<Vec<u8>>,
        pending: Mutex<[crate::clc::PendingBlob; 3]>,
        clc: Clc,
    }

    impl FakeChild {
        fn new(idx: usize, n: usize, up: bool, data: &[u8]) -> Self {
            let clc = Clc::new(n);
            FakeChild {
                idx,
                up,
                data: Mutex::new(data.to_vec()),
                pending: Mutex::new([clc.zero(), clc.zero(), clc.zero()]),
                clc,
            }
        }

        fn kind_slot(kind: CounterKind) -> usize {
            match kind {
                CounterKind::Data => 0,
                CounterKind::Metadata => 1,
                CounterKind::Entry => 2,
            }
        }

        fn blame(&self, kind: CounterKind, peer: usize) {
            let mut guard = self.pending.lock();
            let slot = Self::kind_slot(kind);
            let mut v: HashSet<usize> = HashSet::new();
            v.insert(peer);
            let delta = self.clc.encode_increment(&v);
            guard[slot] = self.clc.merge(&guard[slot], &delta).unwrap();
        }
    }

    #[async_trait]
    impl ChildHandle for FakeChild {
        fn index(&self) -> usize {
            self.idx
        }
        fn is_up(&self) -> bool {
            self.up
        }
        async fn dispatch(&self, _fop: &MutatingFop) -> crate::fop::FopReply {
            crate::fop::FopReply::ok(Stat::default())
        }
        async fn try_entrylk(&self, _: &str, _: InodeId, _: &str) -> Result<(), FopErrno> {
            Ok(())
        }
        async fn entrylk_blocking(&self, _: &str, _: InodeId, _: &str) -> Result<(), FopErrno> {
            Ok(())
        }
        async fn entry_unlock(&self, _: &str, _: InodeId, _: &str) {}
        async fn try_inodelk(&self, _: &str, _: InodeId, _: u64, _: u64) -> Result<(), FopErrno> {
            Ok(())
        }
        async fn inodelk_blocking(&self, _: &str, _: InodeId, _: u64, _: u64) -> Result<(), FopErrno> {
            Ok(())
        }
        async fn inode_unlock(&self, _: &str, _: InodeId, _: u64, _: u64) {}

        async fn xattrop_add(
            &self,
            _inode: InodeId,
            kind: CounterKind,
            delta: &crate::clc::PendingBlob,
        ) -> Result<crate::clc::PendingBlob, FopErrno> {
            let mut guard = self.pending.lock();
            let slot = Self::kind_slot(kind);
            let merged = self.clc.merge(&guard[slot], delta).unwrap();
            guard[slot] = merged.clone();
            Ok(merged)
        }

        async fn get_pending(&self, _inode: InodeId, kind: CounterKind) -> Result<crate::clc::PendingBlob, FopErrno> {
            Ok(self.pending.lock()[Self::kind_slot(kind)].clone())
        }

        async fn stat(&self, _inode: InodeId) -> Result<crate::csh::ChildAttr, FopErrno> {
            Ok(crate::csh::ChildAttr {
                stat: Stat {
                    size: self.data.lock().len() as u64,
                    ..Default::default()
                },
            })
        }
        async fn read_at(&self, _: InodeId, offset: u64, len: u64) -> Result<bytes::Bytes, FopErrno> {
            let guard = self.data.lock();
            let start = (offset as usize).min(guard.len());
            let end = (start + len as usize).min(guard.len());
            Ok(bytes::Bytes::copy_from_slice(&guard[start .. end]))
        }
        async fn write_at(&self, _: InodeId, offset: u64, data: &[u8]) -> Result<(), FopErrno> {
            let mut guard = self.data.lock();
            let end = offset as usize + data.len();
            if guard.len() < end {
                guard.resize(end, 0);
            }
            guard[offset as usize .. end].copy_from_slice(data);
            Ok(())
        }
        async fn truncate(&self, _: InodeId, size: u64) -> Result<(), FopErrno> {
            self.data.lock().truncate(size as usize);
            Ok(())
        }
        async fn flush(&self, _: InodeId) -> Result<(), FopErrno> {
            Ok(())
        }
        async fn list_xattrs(&self, _: InodeId) -> Result<Vec<(String, Vec<u8>)>, FopErrno> {
            Ok(vec![])
        }
        async fn set_xattr(&self, _: InodeId, _: &str, _: &[u8]) -> Result<(), FopErrno> {
            Ok(())
        }
        async fn set_times(&self, _: InodeId, _: i64, _: i64) -> Result<(), FopErrno> {
            Ok(())
        }
        async fn set_owner_mode(&self, _: InodeId, _: u32, _: u32, _: u32) -> Result<(), FopErrno> {
            Ok(())
        }
        async fn lookup_entry(&self, _: InodeId, _: &str) -> Result<Option<crate::csh::DirEntry>, FopErrno> {
            Ok(None)
        }
        async fn create_entry_like(&self, _: InodeId, _: &str, _: &crate::csh::ChildAttr) -> Result<(), FopErrno> {
            Ok(())
        }
        async fn unlink_entry(&self, _: InodeId, _: &str) -> Result<(), FopErrno> {
            Ok(())
        }
        async fn readdir(&self, _: InodeId, _: u64) -> Result<(Vec<crate::csh::DirEntry>, u64), FopErrno> {
            Ok((vec![], 0))
        }
    }

    #[tokio::test]
    async fn heal_copies_tail_and_clears_pending() {
        let n = 2;
        let inode = InodeId::new_v4();
        let c0 = FakeChild::new(0, n, true, b"hello world");
        c0.blame(CounterKind::Data, 1);
        let c1 = FakeChild::new(1, n, true, b"");
        let children: Vec<Arc<dyn ChildHandle>> = vec![Arc::new(c0), Arc::new(c1)];

        let she = She::new("afr.heal", n, 4);
        let ic = Arc::new(Mutex::new(InodeContext::new(n)));
        ic.lock().data_readable.set(1, false);

        let outcomes = she.heal_inode(&children, &ic, inode, None).await.unwrap();
        let data_outcome = outcomes.iter().find(|o| o.kind == CounterKind::Data).unwrap();
        assert_eq!(data_outcome.source, Some(0));
        assert_eq!(data_outcome.healed_sinks, vec![1]);
        assert!(!data_outcome.split_brain);

        let sink_bytes = children[1].read_at(inode, 0, 32).await.unwrap();
        assert_eq!(&sink_bytes[..], b"hello world");

        let clc = Clc::new(n);
        for c in &children {
            let blob = c.get_pending(inode, CounterKind::Data).await.unwrap();
            assert_eq!(clc.decode(&blob).unwrap(), vec![0, 0]);
        }
        assert!(ic.lock().data_readable.is_set(1));
    }

    #[tokio::test]
    async fn mutual_blame_is_split_brain() {
        let n = 2;
        let inode = InodeId::new_v4();
        let c0 = FakeChild::new(0, n, true, b"a");
        c0.blame(CounterKind::Data, 1);
        let c1 = FakeChild::new(1, n, true, b"b");
        c1.blame(CounterKind::Data, 0);
        let children: Vec<Arc<dyn ChildHandle>> = vec![Arc::new(c0), Arc::new(c1)];

        let she = She::new("afr.heal", n, 4);
        let ic = Arc::new(Mutex::new(InodeContext::new(n)));

        let outcomes = she.heal_inode(&children, &ic, inode, None).await.unwrap();
        let data_outcome = outcomes.iter().find(|o| o.kind == CounterKind::Data).unwrap();
        assert!(data_outcome.split_brain);
        assert!(ic.lock().need_heal);
    }

    #[tokio::test]
    async fn clean_matrix_needs_no_heal() {
        let n = 2;
        let inode = InodeId::new_v4();
        let children: Vec<Arc<dyn ChildHandle>> =
            vec![Arc::new(FakeChild::new(0, n, true, b"x")), Arc::new(FakeChild::new(1, n, true, b"x"))];

        let she = She::new("afr.heal", n, 4);
        let ic = Arc::new(Mutex::new(InodeContext::new(n)));

        let outcomes = she.heal_inode(&children, &ic, inode, None).await.unwrap();
        assert!(outcomes.iter().all(|o| o.no_heal_needed));
        assert!(!ic.lock().need_heal);
    }

    #[tokio::test]
    async fn concurrent_trigger_is_refused() {
        let n = 2;
        let inode = InodeId::new_v4();
        let children: Vec<Arc<dyn ChildHandle>> =
            vec![Arc::new(FakeChild::new(0, n, true, b"x")), Arc::new(FakeChild::new(1, n, true, b"x"))];
        let she = She::new("afr.heal", n, 4);
        let ic = Arc::new(Mutex::new(InodeContext::new(n)));
        ic.lock().healing = true;

        let err = she.heal_inode(&children, &ic, inode, None).await.unwrap_err();
        assert!(matches!(err, HealError::AlreadyHealing { .. }));
    }
}
