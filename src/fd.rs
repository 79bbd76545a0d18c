//! FD Context (FDC).
//!
//! Per-open-file state: which children currently hold an open descriptor,
//! which flags were used, and (for directories) the subvolume bound for
//! continued readdir. Created on first successful open/opendir/create,
//! destroyed when the last reference from the caller and from any pending
//! transaction is gone; cleanup emits a release on each child where
//! `opened_on[i] == Opened`.

use std::{
    collections::HashSet,
    sync::atomic::{AtomicU64, Ordering},
};

use parking_lot::Mutex;

/// Opaque per-open-file handle, assigned by [`FdTable::open`].
pub type FdId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenState {
    Unopened,
    Opened,
    NotOpened,
}

#[derive(Debug, Clone)]
pub struct FdContext {
    opened_on: Vec<OpenState>,
    pub flags: i32,
    /// Once a directory stream has returned a non-zero offset, this is
    /// fixed for the lifetime of the stream.
    pub readdir_subvol: Option<usize>,
    /// Lock owners with granted advisory locks on this fd, used to replay
    /// on reconnect.
    pub owner_locks: HashSet<u64>,
}

impl FdContext {
    pub fn new(n: usize, flags: i32) -> Self {
        FdContext {
            opened_on: vec![OpenState::Unopened; n],
            flags,
            readdir_subvol: None,
            owner_locks: HashSet::new(),
        }
    }

    pub fn mark_opened(&mut self, i: usize) {
        self.opened_on[i] = OpenState::Opened;
    }

    pub fn mark_not_opened(&mut self, i: usize) {
        self.opened_on[i] = OpenState::NotOpened;
    }

    pub fn state(&self, i: usize) -> OpenState {
        self.opened_on[i]
    }

    pub fn opened_children(&self) -> impl Iterator<Item = usize> + '_ {
        self.opened_on
            .iter()
            .enumerate()
            .filter(|(_, s)| **s == OpenState::Opened)
            .map(|(i, _)| i)
    }

    /// Binds the readdir cursor to `subvol` the first time a non-zero
    /// offset is observed; once bound it never changes, even if
    /// readability changes later.
    pub fn bind_readdir_subvol(&mut self, subvol: usize, offset: u64) {
        if self.readdir_subvol.is_none() && offset != 0 {
            self.readdir_subvol = Some(subvol);
        } else if self.readdir_subvol.is_none() {
            // first call: the subvolume the caller happened to pick becomes
            // sticky too, so a fresh opendir can choose differently next
            // time without affecting an in-flight stream.
            self.readdir_subvol = Some(subvol);
        }
    }
}

/// The fd table: an arena keyed by opaque `FdId`, mirroring `InodeTable`'s
/// shape — created on first successful open/opendir/create, destroyed
/// when the last reference is gone.
#[derive(Debug)]
pub struct FdTable {
    next: AtomicU64,
    entries: Mutex<std::collections::HashMap<FdId, std::sync::Arc<Mutex<FdContext>>>>,
}

impl FdTable {
    pub fn new() -> Self {
        FdTable {
            next: AtomicU64::new(1),
            entries: Mutex::new(std::collections::HashMap::new()),
        }
    }

    /// Allocates a fresh `FdId` and its context.
    pub fn open(&self, n: usize, flags: i32) -> (FdId, std::sync::Arc<Mutex<FdContext>>) {
        let id = self.next.fetch_add(1, Ordering::Relaxed);
        let ctx = std::sync::Arc::new(Mutex::new(FdContext::new(n, flags)));
        self.entries.lock().insert(id, ctx.clone());
        (id, ctx)
    }

    pub fn get(&self, id: FdId) -> Option<std::sync::Arc<Mutex<FdContext>>> {
        self.entries.lock().get(&id).cloned()
    }

    /// Drops the fd's context; the caller is responsible for releasing any
    /// `state(i) == Opened` child descriptor first.
    pub fn close(&self, id: FdId) {
        self.entries.lock().remove(&id);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn readdir_subvol_pins_on_first_call() {
        let mut fdc = FdContext::new(3, 0);
        fdc.bind_readdir_subvol(1, 0);
        assert_eq!(fdc.readdir_subvol, Some(1));
        // A subsequent call with a different subvol must not move the
        // pin — once bound it is fixed for the fd's lifetime.
        fdc.bind_readdir_subvol(2, 128);
        assert_eq!(fdc.readdir_subvol, Some(1));
    }

    #[test]
    fn opened_children_tracks_only_opened_state() {
        let mut fdc = FdContext::new(3, 0);
        fdc.mark_opened(0);
        fdc.mark_not_opened(1);
        let opened: Vec<usize> = fdc.opened_children().collect();
        assert_eq!(opened, vec![0]);
    }

    #[test]
    fn fd_table_open_assigns_distinct_ids_and_close_removes() {
        let table = FdTable::new();
        let (id1, _) = table.open(2, 0);
        let (id2, _) = table.open(2, 0);
        assert_ne!(id1, id2);
        assert_eq!(table.len(), 2);
        table.close(id1);
        assert!(table.get(id1).is_none());
        assert_eq!(table.len(), 1);
    }
}
