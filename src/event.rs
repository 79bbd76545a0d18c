//! Event Router (ER).
//!
//! Translates substrate liveness notifications (child connected/
//! disconnected, parent shutting down) into the bookkeeping every other
//! component depends on: per-child `up` state, the `IC.event_generation`
//! bump that invalidates RSS's cache, and the decision of which inodes a
//! down→up transition should schedule for self-heal.

use std::{sync::Arc, time::Duration};

use parking_lot::Mutex;
use rand::Rng;
use tracing::{info, warn};

use crate::{fop::InodeId, inode::InodeTable};

/// Upward notification emitted to the caller translator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpwardEvent {
    ChildUp,
    ChildDown,
    ParentDown,
}

/// The event router. Owns the authoritative per-child liveness vector;
/// every `ChildHandle::is_up()` implementation is expected to agree with
/// it, but the router does not read back through the trait — it is the
/// source of truth the rest of the core consults indirectly via the IC.
#[derive(Debug)]
pub struct Er {
    up: Mutex<Vec<bool>>,
}

impl Er {
    pub fn new(n: usize) -> Self {
        Er {
            up: Mutex::new(vec![true; n]),
        }
    }

    pub fn is_up(&self, i: usize) -> bool {
        self.up.lock().get(i).copied().unwrap_or(false)
    }

    pub fn any_up(&self) -> bool {
        self.up.lock().iter().any(|&u| u)
    }

    /// A child reconnected. Bumps every tracked IC's generation (a global
    /// counter is acceptable in practice), and reports `ChildUp` only on
    /// the all-down → some-up transition.
    pub fn on_child_connected(&self, i: usize, inodes: &InodeTable) -> Option<UpwardEvent> {
        let was_all_down;
        {
            let mut guard = self.up.lock();
            was_all_down = guard.iter().all(|&u| !u);
            if let Some(slot) = guard.get_mut(i) {
                *slot = true;
            }
        }
        inodes.bump_all();
        info!(child = i, "child connected");
        if was_all_down {
            Some(UpwardEvent::ChildUp)
        } else {
            None
        }
    }

    /// A child disconnected. Any outstanding fop on that child is expected
    /// to observe `is_up() == false` and synthesize its own ENOTCONN (the
    /// RPC transport itself is an external collaborator; the core does
    /// not forcibly abort in-flight requests). Reports `ChildDown` only on
    /// the transition into all-down.
    pub fn on_child_disconnected(&self, i: usize, inodes: &InodeTable) -> Option<UpwardEvent> {
        {
            let mut guard = self.up.lock();
            if let Some(slot) = guard.get_mut(i) {
                *slot = false;
            }
        }
        inodes.bump_all();
        let now_all_down = !self.any_up();
        if now_all_down {
            warn!("all children down, fops will fail fast with ENOTCONN");
            Some(UpwardEvent::ChildDown)
        } else {
            info!(child = i, "child disconnected");
            None
        }
    }

    /// The parent translator is shutting down.
    pub fn on_parent_down(&self) -> UpwardEvent {
        warn!("parent translator shutting down");
        UpwardEvent::ParentDown
    }

    /// On any transition from down → up, optionally schedules SHE on the
    /// root inode and on any inode with `need_heal` set — the decision of
    /// *which* inodes, left to the caller to actually dispatch (so this
    /// stays synchronous and unit-testable; the orchestrator spawns one
    /// `She::heal_inode` task per returned id when `self_heal_daemon` is
    /// enabled).
    pub fn heal_candidates_on_reconnect(
        &self,
        self_heal_daemon: bool,
        inodes: &InodeTable,
        root_inode: InodeId,
    ) -> Vec<InodeId> {
        if !self_heal_daemon {
            return vec![];
        }
        let mut candidates = inodes.needing_heal();
        if !candidates.contains(&root_inode) {
            candidates.push(root_inode);
        }
        candidates
    }
}

/// Spawns one background heal task per candidate inode, logging and
/// swallowing individual failures so one bad inode does not stop the rest
/// (SHE is idempotent, safe to retrigger). Each task's start is jittered by
/// a few tens of milliseconds so a reconnect carrying thousands of
/// candidate inodes doesn't fire them all in the same instant against
/// every up child at once.
pub fn spawn_reconnect_heals(
    she: Arc<crate::heal::She>,
    children: Vec<Arc<dyn crate::csh::ChildHandle>>,
    inode_table: Arc<InodeTable>,
    candidates: Vec<InodeId>,
) {
    for inode in candidates {
        let she = she.clone();
        let children = children.clone();
        let inode_table = inode_table.clone();
        let jitter = Duration::from_millis(rand::thread_rng().gen_range(0 .. 50));
        tokio::spawn(async move {
            if !jitter.is_zero() {
                tokio::time::sleep(jitter).await;
            }
            let ic = inode_table.get_or_create(inode);
            if let Err(err) = she.heal_inode(&children, &ic, inode, None).await {
                warn!(%inode, error = %crate::error::VerboseError::verbose(&err), "background heal failed");
            }
        });
    }
}
