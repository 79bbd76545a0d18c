//! Read-Subvol Selector (RSS) and arbitration.
//!
//! Two distinct selections share the same underlying readable-mask
//! algorithm: the *arbitration subvolume* (whose reply is forwarded as the
//! canonical result of a replicated mutation) and the *read subvolume*
//! (for pure reads, with ENOTCONN failover). This core never balances
//! load across children — it always picks the lowest-index subvolume
//! whose copy is certifiably current.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::{
    error::RssError,
    fd::FdContext,
    inode::{InodeContext, ReadableMask},
};

/// The operation class a read decision is computed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OpClassTag {
    Data,
    Metadata,
    Entry,
}

fn mask_for<'a>(ic: &'a InodeContext, class: OpClassTag) -> &'a ReadableMask {
    match class {
        OpClassTag::Data => &ic.data_readable,
        OpClassTag::Metadata => &ic.metadata_readable,
        OpClassTag::Entry => &ic.entry_readable,
    }
}

/// The read-subvolume selector.
#[derive(Debug, Clone, Copy)]
pub struct Rss {
    /// Optional forced preferred read subvolume (`read_child` config): RSS
    /// picks it first and falls back on ENOTCONN like any other.
    pub preferred: Option<usize>,
}

impl Rss {
    pub fn new(preferred: Option<usize>) -> Self {
        Rss {
            preferred,
        }
    }

    /// Computes (and caches) the read subvolume for `class`, consulting the
    /// cached decision only if `ic.event_generation` has not advanced since
    /// it was stamped.
    pub fn pick(&self, ic: &Arc<Mutex<InodeContext>>, class: OpClassTag) -> Result<usize, RssError> {
        let mut guard = ic.lock();
        if let Some((cached_class, subvol, gen)) = guard.last_read_subvol {
            if cached_class == class && gen == guard.event_generation {
                return Ok(subvol);
            }
        }

        let mask = *mask_for(&guard, class);
        let chosen = self.choose_from_mask(&mask).ok_or(RssError::NoReadableChild)?;

        let gen = guard.event_generation;
        guard.last_read_subvol = Some((class, chosen, gen));
        Ok(chosen)
    }

    fn choose_from_mask(&self, mask: &ReadableMask) -> Option<usize> {
        if let Some(pref) = self.preferred {
            if mask.is_set(pref) {
                return Some(pref);
            }
        }
        mask.lowest()
    }

    /// Advances to the next readable child after `current` on an ENOTCONN
    /// from the previously selected child. Returns `RssError::Exhausted`
    /// once there is no next candidate, at which point the caller must
    /// surface ENOTCONN.
    pub fn advance(
        &self,
        ic: &Arc<Mutex<InodeContext>>,
        class: OpClassTag,
        current: usize,
    ) -> Result<usize, RssError> {
        let mut guard = ic.lock();
        let mask = *mask_for(&guard, class);
        match mask.next_after(current) {
            Some(next) => {
                let gen = guard.event_generation;
                guard.last_read_subvol = Some((class, next, gen));
                trace!(from = current, to = next, "RSS failover");
                Ok(next)
            }
            None => Err(RssError::Exhausted),
        }
    }

    /// Readdir selection honors the fd's sticky pin: once
    /// `fdc.readdir_subvol` is bound, every subsequent readdir for that fd
    /// MUST use it regardless of readability changes. There is deliberately
    /// no failover on readdir: a disconnect mid stream surfaces ENOTCONN
    /// to the caller rather than silently switching children, since
    /// directory cookies are not portable across children.
    pub fn pick_for_readdir(&self, ic: &Arc<Mutex<InodeContext>>, fdc: &FdContext) -> Result<usize, RssError> {
        if let Some(subvol) = fdc.readdir_subvol {
            return Ok(subvol);
        }
        self.pick(ic, OpClassTag::Entry)
    }
}

/// Result of arbitration-subvolume selection for a completed transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Arbitration {
    pub subvol: usize,
    /// Set when the arbitration fell back to "lowest-index successful
    /// child" because no successful child had both readable bits set —
    /// the caller must also set `IC.need_heal`.
    pub needs_heal: bool,
}

/// Picks the arbitration subvolume among children whose reply succeeded,
/// given their post-FOP readability and the `consistent_metadata` option.
pub fn arbitrate(
    successful: &[usize],
    ic: &InodeContext,
    consistent_metadata: bool,
) -> Option<Arbitration> {
    let mut candidates: Vec<usize> = successful
        .iter()
        .copied()
        .filter(|&i| {
            ic.data_readable.is_set(i)
                && (!consistent_metadata || ic.metadata_readable.is_set(i))
        })
        .collect();
    candidates.sort_unstable();

    if let Some(&i) = candidates.first() {
        return Some(Arbitration {
            subvol: i,
            needs_heal: false,
        });
    }

    let mut fallback: Vec<usize> = successful.to_vec();
    fallback.sort_unstable();
    fallback.first().map(|&i| Arbitration {
        subvol: i,
        needs_heal: true,
    })
}
