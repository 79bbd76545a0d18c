//! Entry/Inode Lock Manager (ELM).
//!
//! Acquires advisory locks that serialize mutating transactions on the
//! same name (ENTRY) or on the same byte range (DATA/METADATA), on every up
//! child: a parallel non-blocking attempt first, with serial blocking
//! retry on contention to avoid AB/BA deadlocks across N remote peers.

use std::{cmp::Ordering, sync::Arc};

use futures::future::join_all;
use tracing::{debug, trace, warn};

use crate::{
    csh::ChildHandle,
    error::{FopErrno, LockError},
    fop::InodeId,
};

/// A single lock target: either an entry lock on `(parent, basename)` or a
/// byte-range lock on an inode (`len == 0` meaning whole file).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockTarget {
    Entry { parent: InodeId, basename: String },
    Range { inode: InodeId, offset: u64, len: u64 },
}

impl LockTarget {
    fn discriminant(&self) -> u8 {
        match self {
            LockTarget::Entry { .. } => 0,
            LockTarget::Range { .. } => 1,
        }
    }
}

/// Total order on lock targets, used by RENAME to lock two (or three)
/// entities in canonical order, avoiding AB/BA deadlocks.
pub fn compare(a: &LockTarget, b: &LockTarget) -> Ordering {
    match (a, b) {
        (
            LockTarget::Entry {
                parent: p1,
                basename: b1,
            },
            LockTarget::Entry {
                parent: p2,
                basename: b2,
            },
        ) => p1.cmp(p2).then_with(|| b1.cmp(b2)),
        (
            LockTarget::Range {
                inode: i1,
                offset: o1,
                ..
            },
            LockTarget::Range {
                inode: i2,
                offset: o2,
                ..
            },
        ) => i1.cmp(i2).then_with(|| o1.cmp(o2)),
        _ => a.discriminant().cmp(&b.discriminant()),
    }
}

/// Sorts lock targets into the globally-agreed order; callers building a
/// multi-target transaction (RENAME) MUST pass their targets through this
/// before calling `acquire`.
pub fn canonical_order(mut targets: Vec<LockTarget>) -> Vec<LockTarget> {
    targets.sort_by(compare);
    targets
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    Unlocked,
    Locked,
    Contended,
}

/// Outcome of an `acquire` call: per-child lock state, keyed by child index.
#[derive(Debug, Clone)]
pub struct LockSet {
    pub state: Vec<LockState>,
    domain: String,
    targets: Vec<LockTarget>,
}

impl LockSet {
    pub fn locked_children(&self) -> Vec<usize> {
        self.state
            .iter()
            .enumerate()
            .filter(|(_, s)| **s == LockState::Locked)
            .map(|(i, _)| i)
            .collect()
    }

    pub fn any_locked(&self) -> bool {
        self.state.iter().any(|s| *s == LockState::Locked)
    }
}

/// The entry/inode lock manager. Stateless beyond the configured lock
/// domain string (`entrylk_domain`/`inodelk_domain`).
#[derive(Debug, Clone)]
pub struct Elm {
    domain: String,
}

impl Elm {
    pub fn new(domain: impl Into<String>) -> Self {
        Elm {
            domain: domain.into(),
        }
    }

    async fn try_lock_one(
        &self,
        child: &Arc<dyn ChildHandle>,
        target: &LockTarget,
    ) -> Result<(), FopErrno> {
        match target {
            LockTarget::Entry {
                parent,
                basename,
            } => child.try_entrylk(&self.domain, *parent, basename).await,
            LockTarget::Range {
                inode,
                offset,
                len,
            } => child.try_inodelk(&self.domain, *inode, *offset, *len).await,
        }
    }

    async fn lock_one_blocking(
        &self,
        child: &Arc<dyn ChildHandle>,
        target: &LockTarget,
    ) -> Result<(), FopErrno> {
        match target {
            LockTarget::Entry {
                parent,
                basename,
            } => child.entrylk_blocking(&self.domain, *parent, basename).await,
            LockTarget::Range {
                inode,
                offset,
                len,
            } => child.inodelk_blocking(&self.domain, *inode, *offset, *len).await,
        }
    }

    async fn unlock_one(&self, child: &Arc<dyn ChildHandle>, target: &LockTarget) {
        match target {
            LockTarget::Entry {
                parent,
                basename,
            } => child.entry_unlock(&self.domain, *parent, basename).await,
            LockTarget::Range {
                inode,
                offset,
                len,
            } => child.inode_unlock(&self.domain, *inode, *offset, *len).await,
        }
    }

    /// Attempts to acquire every target in `targets` (already in canonical
    /// order) on every up child in `children`, non-blocking. On EAGAIN from
    /// any child, releases everything already granted and retries serially
    /// in ascending child-index order using blocking waits.
    pub async fn acquire(
        &self,
        children: &[Arc<dyn ChildHandle>],
        targets: Vec<LockTarget>,
    ) -> Result<LockSet, LockError> {
        let targets = canonical_order(targets);
        let up: Vec<usize> = children
            .iter()
            .enumerate()
            .filter(|(_, c)| c.is_up())
            .map(|(i, _)| i)
            .collect();

        if up.is_empty() {
            return Err(LockError::AllChildrenDown);
        }

        let mut state = vec![LockState::Unlocked; children.len()];

        // Phase 1: parallel non-blocking attempt across all up children.
        let attempts = join_all(up.iter().map(|&i| {
            let targets = &targets;
            async move {
                for t in targets {
                    if self.try_lock_one(&children[i], t).await.is_err() {
                        // roll back whatever we granted on this child
                        for done in targets {
                            if done == t {
                                break;
                            }
                            self.unlock_one(&children[i], done).await;
                        }
                        return (i, false);
                    }
                }
                (i, true)
            }
        }))
        .await;

        let mut contended = false;
        for (i, ok) in attempts {
            state[i] = if ok {
                LockState::Locked
            } else {
                contended = true;
                LockState::Contended
            };
        }

        if !contended {
            debug!(children = ?up, "lock acquired on first non-blocking pass");
            return Ok(LockSet {
                state,
                domain: self.domain.clone(),
                targets,
            });
        }

        // Phase 2: release everything granted in phase 1, then retry
        // serially in ascending index order with blocking waits. The
        // globally agreed serial order bounds deadlock risk.
        trace!("lock contention detected, releasing and retrying serially");
        for &i in &up {
            if state[i] == LockState::Locked {
                for t in &targets {
                    self.unlock_one(&children[i], t).await;
                }
            }
            state[i] = LockState::Unlocked;
        }

        for &i in &up {
            if !children[i].is_up() {
                continue;
            }
            let mut ok = true;
            for (pos, t) in targets.iter().enumerate() {
                if let Err(e) = self.lock_one_blocking(&children[i], t).await {
                    warn!(child = i, errno = %e, "blocking lock failed, treating as permanent refusal");
                    for done in &targets[.. pos] {
                        self.unlock_one(&children[i], done).await;
                    }
                    ok = false;
                    break;
                }
            }
            state[i] = if ok {
                LockState::Locked
            } else {
                LockState::Unlocked
            };
        }

        Ok(LockSet {
            state,
            domain: self.domain.clone(),
            targets,
        })
    }

    /// Releases locks on exactly the children whose `lock_state == Locked`.
    /// Idempotent, safe to call in any phase.
    pub async fn release(&self, children: &[Arc<dyn ChildHandle>], set: &LockSet) {
        for i in set.locked_children() {
            if i >= children.len() {
                continue;
            }
            for t in &set.targets {
                self.unlock_one(&children[i], t).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn canonical_order_is_total_and_stable() {
        let p1 = Uuid::new_v4();
        let p2 = Uuid::new_v4();
        let t1 = LockTarget::Entry {
            parent: p1,
            basename: "b".into(),
        };
        let t2 = LockTarget::Entry {
            parent: p2,
            basename: "a".into(),
        };
        let sorted_once = canonical_order(vec![t1.clone(), t2.clone()]);
        let sorted_swapped = canonical_order(vec![t2, t1]);
        assert_eq!(sorted_once, sorted_swapped);
    }

    #[test]
    fn compare_is_antisymmetric() {
        let inode = Uuid::new_v4();
        let a = LockTarget::Range {
            inode,
            offset: 0,
            len: 10,
        };
        let b = LockTarget::Range {
            inode,
            offset: 20,
            len: 10,
        };
        assert_eq!(compare(&a, &b), Ordering::Less);
        assert_eq!(compare(&b, &a), Ordering::Greater);
    }
}
