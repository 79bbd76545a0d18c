//! Shared in-memory `ChildHandle` fixture for integration tests: a plain
//! in-memory "disk" plus xattr/entry maps, with an atomic up/down flag the
//! test flips directly rather than going through any real transport.

#![allow(dead_code)]

use std::{
    collections::HashMap,
    sync::atomic::{AtomicBool, Ordering},
};

use afr_core::{
    clc::{Clc, CounterKind, PendingBlob},
    csh::{ChildAttr, ChildHandle, DirEntry},
    error::FopErrno,
    fop::{FopReply, InodeId, MutatingFop, Stat},
};
use async_trait::async_trait;
use parking_lot::Mutex;

#[derive(Debug, Clone, Default)]
struct Inode {
    stat: Stat,
    data: Vec<u8>,
    xattrs: HashMap<String, Vec<u8>>,
}

#[derive(Debug)]
pub struct MemoryChild {
    idx: usize,
    up: AtomicBool,
    clc: Clc,
    inodes: Mutex<HashMap<InodeId, Inode>>,
    pending: Mutex<HashMap<(InodeId, CounterKindKey), PendingBlob>>,
    entries: Mutex<HashMap<(InodeId, String), InodeId>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum CounterKindKey {
    Data,
    Metadata,
    Entry,
}

fn key(kind: CounterKind) -> CounterKindKey {
    match kind {
        CounterKind::Data => CounterKindKey::Data,
        CounterKind::Metadata => CounterKindKey::Metadata,
        CounterKind::Entry => CounterKindKey::Entry,
    }
}

impl MemoryChild {
    pub fn new(idx: usize, n: usize) -> Self {
        MemoryChild {
            idx,
            up: AtomicBool::new(true),
            clc: Clc::new(n),
            inodes: Mutex::new(HashMap::new()),
            pending: Mutex::new(HashMap::new()),
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn set_up(&self, up: bool) {
        self.up.store(up, Ordering::SeqCst);
    }

    fn entry_mut<'a>(&self, inodes: &'a mut HashMap<InodeId, Inode>, inode: InodeId) -> &'a mut Inode {
        inodes.entry(inode).or_default()
    }

    fn pending_for(&self, guard: &HashMap<(InodeId, CounterKindKey), PendingBlob>, inode: InodeId, kind: CounterKind) -> PendingBlob {
        guard.get(&(inode, key(kind))).cloned().unwrap_or_else(|| self.clc.zero())
    }

    /// Seeds `inode` with `bytes` content, as a test fixture shortcut.
    pub fn seed(&self, inode: InodeId, bytes: &[u8]) {
        let mut guard = self.inodes.lock();
        let entry = self.entry_mut(&mut guard, inode);
        entry.data = bytes.to_vec();
        entry.stat.size = bytes.len() as u64;
    }

    pub fn content(&self, inode: InodeId) -> Vec<u8> {
        self.inodes.lock().get(&inode).map(|e| e.data.clone()).unwrap_or_default()
    }
}

fn down_err(up: bool) -> Result<(), FopErrno> {
    if up { Ok(()) } else { Err(FopErrno::Enotconn) }
}

#[async_trait]
impl ChildHandle for MemoryChild {
    fn index(&self) -> usize {
        self.idx
    }

    fn is_up(&self) -> bool {
        self.up.load(Ordering::SeqCst)
    }

    async fn dispatch(&self, fop: &MutatingFop) -> FopReply {
        if !self.is_up() {
            return FopReply::err(FopErrno::Enotconn);
        }
        let mut guard = self.inodes.lock();
        match fop {
            MutatingFop::Create { parent, basename, mode } | MutatingFop::Mkdir { parent, basename, mode } => {
                drop(guard);
                let new_inode = InodeId::new_v5(parent, basename.as_bytes());
                {
                    let mut entries = self.entries.lock();
                    if entries.contains_key(&(*parent, basename.clone())) {
                        return FopReply::err(FopErrno::Eexist);
                    }
                    entries.insert((*parent, basename.clone()), new_inode);
                }
                let mut stat = Stat::default();
                stat.mode = *mode;
                self.inodes.lock().insert(new_inode, Inode { stat, ..Default::default() });
                FopReply::ok(stat)
            }
            MutatingFop::Unlink { parent, basename } | MutatingFop::Rmdir { parent, basename } => {
                drop(guard);
                self.entries.lock().remove(&(*parent, basename.clone()));
                FopReply::ok(Stat::default())
            }
            MutatingFop::Writev { inode, offset, data } => {
                let entry = self.entry_mut(&mut guard, *inode);
                let end = *offset as usize + data.len();
                if entry.data.len() < end {
                    entry.data.resize(end, 0);
                }
                entry.data[*offset as usize .. end].copy_from_slice(data);
                entry.stat.size = entry.data.len() as u64;
                FopReply::ok(entry.stat)
            }
            MutatingFop::Truncate { inode, size } | MutatingFop::Ftruncate { inode, size } => {
                let entry = self.entry_mut(&mut guard, *inode);
                entry.data.resize(*size as usize, 0);
                entry.stat.size = *size;
                FopReply::ok(entry.stat)
            }
            MutatingFop::Setattr { inode, mode, uid, gid, .. } => {
                let entry = self.entry_mut(&mut guard, *inode);
                if let Some(m) = mode {
                    entry.stat.mode = *m;
                }
                if let Some(u) = uid {
                    entry.stat.uid = *u;
                }
                if let Some(g) = gid {
                    entry.stat.gid = *g;
                }
                FopReply::ok(entry.stat)
            }
            MutatingFop::Setxattr { inode, name, value } => {
                let entry = self.entry_mut(&mut guard, *inode);
                entry.xattrs.insert(name.clone(), value.clone());
                FopReply::ok(entry.stat)
            }
            _ => FopReply::ok(Stat::default()),
        }
    }

    async fn try_entrylk(&self, _domain: &str, _parent: InodeId, _basename: &str) -> Result<(), FopErrno> {
        down_err(self.is_up())
    }
    async fn entrylk_blocking(&self, _domain: &str, _parent: InodeId, _basename: &str) -> Result<(), FopErrno> {
        down_err(self.is_up())
    }
    async fn entry_unlock(&self, _domain: &str, _parent: InodeId, _basename: &str) {}

    async fn try_inodelk(&self, _domain: &str, _inode: InodeId, _offset: u64, _len: u64) -> Result<(), FopErrno> {
        down_err(self.is_up())
    }
    async fn inodelk_blocking(&self, _domain: &str, _inode: InodeId, _offset: u64, _len: u64) -> Result<(), FopErrno> {
        down_err(self.is_up())
    }
    async fn inode_unlock(&self, _domain: &str, _inode: InodeId, _offset: u64, _len: u64) {}

    async fn xattrop_add(&self, inode: InodeId, kind: CounterKind, delta: &PendingBlob) -> Result<PendingBlob, FopErrno> {
        if !self.is_up() {
            return Err(FopErrno::Enotconn);
        }
        let mut guard = self.pending.lock();
        let existing = self.pending_for(&guard, inode, kind);
        let merged = self.clc.merge(&existing, delta).unwrap();
        guard.insert((inode, key(kind)), merged.clone());
        Ok(merged)
    }

    async fn get_pending(&self, inode: InodeId, kind: CounterKind) -> Result<PendingBlob, FopErrno> {
        if !self.is_up() {
            return Err(FopErrno::Enotconn);
        }
        Ok(self.pending_for(&self.pending.lock(), inode, kind))
    }

    async fn stat(&self, inode: InodeId) -> Result<ChildAttr, FopErrno> {
        if !self.is_up() {
            return Err(FopErrno::Enotconn);
        }
        Ok(ChildAttr {
            stat: self.inodes.lock().get(&inode).map(|e| e.stat).unwrap_or_default(),
        })
    }

    async fn read_at(&self, inode: InodeId, offset: u64, len: u64) -> Result<bytes::Bytes, FopErrno> {
        if !self.is_up() {
            return Err(FopErrno::Enotconn);
        }
        let guard = self.inodes.lock();
        let data = guard.get(&inode).map(|e| e.data.as_slice()).unwrap_or(&[]);
        let start = (offset as usize).min(data.len());
        let end = (start + len as usize).min(data.len());
        Ok(bytes::Bytes::copy_from_slice(&data[start .. end]))
    }

    async fn write_at(&self, inode: InodeId, offset: u64, data: &[u8]) -> Result<(), FopErrno> {
        if !self.is_up() {
            return Err(FopErrno::Enotconn);
        }
        let mut guard = self.inodes.lock();
        let entry = self.entry_mut(&mut guard, inode);
        let end = offset as usize + data.len();
        if entry.data.len() < end {
            entry.data.resize(end, 0);
        }
        entry.data[offset as usize .. end].copy_from_slice(data);
        entry.stat.size = entry.data.len() as u64;
        Ok(())
    }

    async fn truncate(&self, inode: InodeId, size: u64) -> Result<(), FopErrno> {
        if !self.is_up() {
            return Err(FopErrno::Enotconn);
        }
        let mut guard = self.inodes.lock();
        let entry = self.entry_mut(&mut guard, inode);
        entry.data.truncate(size as usize);
        entry.stat.size = entry.data.len() as u64;
        Ok(())
    }

    async fn flush(&self, _inode: InodeId) -> Result<(), FopErrno> {
        down_err(self.is_up())
    }

    async fn list_xattrs(&self, inode: InodeId) -> Result<Vec<(String, Vec<u8>)>, FopErrno> {
        if !self.is_up() {
            return Err(FopErrno::Enotconn);
        }
        Ok(self
            .inodes
            .lock()
            .get(&inode)
            .map(|e| e.xattrs.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default())
    }

    async fn set_xattr(&self, inode: InodeId, name: &str, value: &[u8]) -> Result<(), FopErrno> {
        if !self.is_up() {
            return Err(FopErrno::Enotconn);
        }
        let mut guard = self.inodes.lock();
        self.entry_mut(&mut guard, inode).xattrs.insert(name.to_string(), value.to_vec());
        Ok(())
    }

    async fn set_times(&self, inode: InodeId, atime: i64, mtime: i64) -> Result<(), FopErrno> {
        if !self.is_up() {
            return Err(FopErrno::Enotconn);
        }
        let mut guard = self.inodes.lock();
        let entry = self.entry_mut(&mut guard, inode);
        entry.stat.atime = atime;
        entry.stat.mtime = mtime;
        Ok(())
    }

    async fn set_owner_mode(&self, inode: InodeId, uid: u32, gid: u32, mode: u32) -> Result<(), FopErrno> {
        if !self.is_up() {
            return Err(FopErrno::Enotconn);
        }
        let mut guard = self.inodes.lock();
        let entry = self.entry_mut(&mut guard, inode);
        entry.stat.uid = uid;
        entry.stat.gid = gid;
        entry.stat.mode = mode;
        Ok(())
    }

    async fn lookup_entry(&self, parent: InodeId, basename: &str) -> Result<Option<DirEntry>, FopErrno> {
        if !self.is_up() {
            return Err(FopErrno::Enotconn);
        }
        Ok(self
            .entries
            .lock()
            .get(&(parent, basename.to_string()))
            .map(|&inode| DirEntry { basename: basename.to_string(), inode }))
    }

    async fn create_entry_like(&self, parent: InodeId, basename: &str, template: &ChildAttr) -> Result<(), FopErrno> {
        if !self.is_up() {
            return Err(FopErrno::Enotconn);
        }
        let new_inode = InodeId::new_v5(&parent, basename.as_bytes());
        self.entries.lock().insert((parent, basename.to_string()), new_inode);
        self.inodes.lock().insert(new_inode, Inode { stat: template.stat, ..Default::default() });
        Ok(())
    }

    async fn unlink_entry(&self, parent: InodeId, basename: &str) -> Result<(), FopErrno> {
        if !self.is_up() {
            return Err(FopErrno::Enotconn);
        }
        self.entries.lock().remove(&(parent, basename.to_string()));
        Ok(())
    }

    async fn readdir(&self, dir: InodeId, _cookie: u64) -> Result<(Vec<DirEntry>, u64), FopErrno> {
        if !self.is_up() {
            return Err(FopErrno::Enotconn);
        }
        let entries: Vec<DirEntry> = self
            .entries
            .lock()
            .iter()
            .filter(|((parent, _), _)| *parent == dir)
            .map(|((_, basename), &inode)| DirEntry { basename: basename.clone(), inode })
            .collect();
        Ok((entries, 0))
    }
}

pub fn mirror(n: usize) -> Vec<std::sync::Arc<dyn ChildHandle>> {
    (0 .. n).map(|i| std::sync::Arc::new(MemoryChild::new(i, n)) as std::sync::Arc<dyn ChildHandle>).collect()
}
