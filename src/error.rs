//! Crate-wide error taxonomy: one `snafu` enum per component, plus a
//! `VerboseError` trait that flattens an error's `source()` chain into a
//! single diagnostic line.

use std::fmt;

use serde::{Deserialize, Serialize};
use snafu::Snafu;

/// Obtain the full error chain as a single string, walking `Error::source()`.
pub trait VerboseError {
    fn verbose(&self) -> String;
}

impl<T> VerboseError for T
where
    T: std::error::Error,
{
    fn verbose(&self) -> String {
        let mut msg = format!("{}", self);
        let mut opt_source = self.source();
        while let Some(source) = opt_source {
            msg = format!("{}: {}", msg, source);
            opt_source = source.source();
        }
        msg
    }
}

/// Errno-shaped outcome of a fop reply.
///
/// The crate has no FFI boundary to a real POSIX errno of its own; a
/// `ChildHandle` implementation maps its own transport/back-end errors into
/// this enum. Ordering matches the TXE's priority list: a lower variant
/// wins arbitration of `first_error`, i.e. `Enospc` always beats
/// `Eio` when both are observed among failed children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FopErrno {
    Enospc,
    Edquot,
    Erofs,
    Eacces,
    Eexist,
    Enoent,
    Enotempty,
    Enotdir,
    Enotconn,
    Eagain,
    Edeadlk,
    Ecanceled,
    Eio,
    Other(i32),
}

impl FopErrno {
    /// Priority rank used by the TXE's `first_error` selection:
    /// `ENOSPC > EDQUOT > EROFS > EACCES > EEXIST > ENOENT > EIO > other`.
    fn priority(self) -> u8 {
        match self {
            FopErrno::Enospc => 0,
            FopErrno::Edquot => 1,
            FopErrno::Erofs => 2,
            FopErrno::Eacces => 3,
            FopErrno::Eexist => 4,
            FopErrno::Enoent => 5,
            FopErrno::Eio => 6,
            FopErrno::Enotempty => 7,
            FopErrno::Enotdir => 8,
            FopErrno::Enotconn => 9,
            FopErrno::Eagain => 10,
            FopErrno::Edeadlk => 11,
            FopErrno::Ecanceled => 12,
            FopErrno::Other(_) => 13,
        }
    }
}

impl PartialOrd for FopErrno {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FopErrno {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.priority().cmp(&other.priority())
    }
}

impl fmt::Display for FopErrno {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FopErrno::Enospc => write!(f, "ENOSPC"),
            FopErrno::Edquot => write!(f, "EDQUOT"),
            FopErrno::Erofs => write!(f, "EROFS"),
            FopErrno::Eacces => write!(f, "EACCES"),
            FopErrno::Eexist => write!(f, "EEXIST"),
            FopErrno::Enoent => write!(f, "ENOENT"),
            FopErrno::Enotempty => write!(f, "ENOTEMPTY"),
            FopErrno::Enotdir => write!(f, "ENOTDIR"),
            FopErrno::Enotconn => write!(f, "ENOTCONN"),
            FopErrno::Eagain => write!(f, "EAGAIN"),
            FopErrno::Edeadlk => write!(f, "EDEADLK"),
            FopErrno::Ecanceled => write!(f, "ECANCELED"),
            FopErrno::Eio => write!(f, "EIO"),
            FopErrno::Other(n) => write!(f, "errno({})", n),
        }
    }
}

/// Errors raised by the change-log codec (CLC).
#[derive(Debug, Snafu, Clone, PartialEq)]
#[snafu(visibility = "pub(crate)")]
pub enum ClcError {
    #[snafu(display(
        "Malformed pending vector: expected width {}, got {}",
        expected,
        got
    ))]
    Malformed { expected: usize, got: usize },
}

/// Errors raised by the entry/inode lock manager (ELM).
#[derive(Debug, Snafu, Clone, PartialEq)]
#[snafu(visibility = "pub(crate)")]
pub enum LockError {
    #[snafu(display("Lock acquisition cancelled"))]
    Cancelled,
    #[snafu(display("All children are down, cannot acquire any lock"))]
    AllChildrenDown,
    #[snafu(display("Child {} refused lock permanently: {}", child, reason))]
    Refused { child: usize, reason: String },
}

/// Errors raised by the transaction engine (TXE).
#[derive(Debug, Snafu, Clone)]
#[snafu(visibility = "pub(crate)")]
pub enum TxnError {
    #[snafu(display("Failed to acquire locks for transaction: {}", source))]
    Lock { source: LockError },
    #[snafu(display("Pre-op phase failed on every up child"))]
    PreOpAllFailed,
    #[snafu(display("Fop failed on every child that completed pre-op: {}", errno))]
    FopAllFailed { errno: FopErrno },
    #[snafu(display("Transaction was cancelled"))]
    Cancelled,
    #[snafu(display("All children are down"))]
    AllChildrenDown,
}

impl TxnError {
    /// Maps a transaction-level failure onto the single errno surfaced to
    /// the caller.
    pub fn as_fop_errno(&self) -> FopErrno {
        match self {
            TxnError::Lock {
                source: LockError::AllChildrenDown,
            } => FopErrno::Enotconn,
            TxnError::Lock {
                ..
            } => FopErrno::Eagain,
            TxnError::PreOpAllFailed => FopErrno::Enotconn,
            TxnError::FopAllFailed {
                errno,
            } => *errno,
            TxnError::Cancelled => FopErrno::Ecanceled,
            TxnError::AllChildrenDown => FopErrno::Enotconn,
        }
    }
}

/// Errors raised by the self-heal engine (SHE).
#[derive(Debug, Snafu, Clone)]
#[snafu(visibility = "pub(crate)")]
pub enum HealError {
    #[snafu(display(
        "Split brain on inode {} for counter kind {:?}: matrix = {:?}",
        inode,
        kind,
        matrix
    ))]
    SplitBrain {
        inode: String,
        kind: crate::clc::CounterKind,
        matrix: Vec<Vec<i64>>,
    },
    #[snafu(display("No up children available to heal inode {}", inode))]
    NoUpChildren { inode: String },
    #[snafu(display("Failed to lock inode {} for heal: {}", inode, source))]
    Lock { inode: String, source: LockError },
    #[snafu(display(
        "Heal of inode {} already in progress, dropping duplicate trigger",
        inode
    ))]
    AlreadyHealing { inode: String },
    #[snafu(display("I/O error healing inode {} from child {}: {}", inode, child, errno))]
    Io {
        inode: String,
        child: usize,
        errno: FopErrno,
    },
}

/// Errors raised by the read-subvolume selector (RSS).
#[derive(Debug, Snafu, Clone, Copy, PartialEq)]
#[snafu(visibility = "pub(crate)")]
pub enum RssError {
    #[snafu(display("No readable child for the requested operation class"))]
    NoReadableChild,
    #[snafu(display("All readable children are disconnected"))]
    Exhausted,
}
