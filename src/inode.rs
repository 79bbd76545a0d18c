//! Inode Context (IC).
//!
//! Per-inode, per-translator state: readable-mask per data/metadata, event
//! generation counter, cached "last known good" subvolume and the sticky
//! `need_heal` flag. Represented as an arena of inode records plus a handle
//! type — a `parking_lot`-guarded `HashMap`, the ctx a typed field rather
//! than an opaque blob.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::fop::InodeId;

/// A bitmask over up to 64 children; N is expected to be small in a mirror
/// (single digits), so a `u64` mask is ample and avoids heap allocation on
/// the hot read path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReadableMask(u64);

impl ReadableMask {
    pub fn empty() -> Self {
        ReadableMask(0)
    }

    pub fn all(n: usize) -> Self {
        ReadableMask(if n >= 64 { u64::MAX } else { (1u64 << n) - 1 })
    }

    pub fn set(&mut self, i: usize, readable: bool) {
        if readable {
            self.0 |= 1 << i;
        } else {
            self.0 &= !(1 << i);
        }
    }

    pub fn is_set(&self, i: usize) -> bool {
        self.0 & (1 << i) != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Lowest-index set bit, if any.
    pub fn lowest(&self) -> Option<usize> {
        if self.0 == 0 {
            None
        } else {
            Some(self.0.trailing_zeros() as usize)
        }
    }

    /// Next set bit strictly after `after`, if any — used by RSS failover.
    pub fn next_after(&self, after: usize) -> Option<usize> {
        if after >= 63 {
            return None;
        }
        let masked = self.0 & !((1u64 << (after + 1)) - 1);
        if masked == 0 {
            None
        } else {
            Some(masked.trailing_zeros() as usize)
        }
    }
}

/// Per-inode, per-translator state.
#[derive(Debug, Clone)]
pub struct InodeContext {
    pub data_readable: ReadableMask,
    pub metadata_readable: ReadableMask,
    pub entry_readable: ReadableMask,
    /// Monotonic counter bumped by the event router on any child up/down
    /// transition or on any observed mismatch.
    pub event_generation: u64,
    /// Cache of RSS's last decision per operation class, paired with the
    /// `event_generation` it was computed under (invalidated on bump).
    pub last_read_subvol: Option<(crate::rss::OpClassTag, usize, u64)>,
    /// Sticky flag set when a read or lookup noticed divergence; cleared by
    /// SHE completion.
    pub need_heal: bool,
    /// Serializes self-heal passes for this inode: only one heal progresses
    /// at a time even if multiple triggers race.
    pub healing: bool,
}

impl InodeContext {
    pub fn new(n: usize) -> Self {
        InodeContext {
            data_readable: ReadableMask::all(n),
            metadata_readable: ReadableMask::all(n),
            entry_readable: ReadableMask::all(n),
            event_generation: 0,
            last_read_subvol: None,
            need_heal: false,
            healing: false,
        }
    }

    /// Bumps the event generation (monotonic, never decreases) and
    /// invalidates the cached read-subvol decision.
    pub fn bump_generation(&mut self) {
        self.event_generation += 1;
        self.last_read_subvol = None;
    }

    /// Split-brain for DATA iff every `data_readable` bit is clear.
    pub fn data_split_brain(&self) -> bool {
        self.data_readable.is_empty()
    }

    pub fn metadata_split_brain(&self) -> bool {
        self.metadata_readable.is_empty()
    }
}

/// The inode-context table: an arena keyed by inode id, each entry guarded
/// independently — fields are mutated only under that entry's own lock,
/// never the table's.
#[derive(Debug, Default)]
pub struct InodeTable {
    n: usize,
    entries: Mutex<HashMap<InodeId, std::sync::Arc<Mutex<InodeContext>>>>,
}

impl InodeTable {
    pub fn new(n: usize) -> Self {
        InodeTable {
            n,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the handle for `inode`, creating a fresh context (all bits
    /// readable, generation 0) if this is the first reference.
    pub fn get_or_create(&self, inode: InodeId) -> std::sync::Arc<Mutex<InodeContext>> {
        let mut map = self.entries.lock();
        map.entry(inode)
            .or_insert_with(|| std::sync::Arc::new(Mutex::new(InodeContext::new(self.n))))
            .clone()
    }

    pub fn get(&self, inode: InodeId) -> Option<std::sync::Arc<Mutex<InodeContext>>> {
        self.entries.lock().get(&inode).cloned()
    }

    /// Bumps every tracked inode's generation; used by the event router on
    /// a child up/down transition where no single inode is implicated.
    pub fn bump_all(&self) {
        for ctx in self.entries.lock().values() {
            ctx.lock().bump_generation();
        }
    }

    pub fn needing_heal(&self) -> Vec<InodeId> {
        self.entries
            .lock()
            .iter()
            .filter(|(_, ctx)| ctx.lock().need_heal)
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn remove(&self, inode: InodeId) {
        self.entries.lock().remove(&inode);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
