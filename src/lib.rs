//! `afr-core`: a synchronous mirror-replication core — the replicated
//! transaction engine, self-heal resolver and read-subvolume selector for
//! an N-way fop translator. The on-wire RPC codec, the below-translator
//! protocol client and the actual storage back-end are external
//! collaborators the host process supplies through [`csh::ChildHandle`].
//!
//! One file per subsystem, with a top-level orchestrator
//! ([`translator::Translator`]) that wires the subsystems together and is
//! the crate's actual public entrypoint.

pub mod clc;
pub mod config;
pub mod csh;
pub mod error;
pub mod event;
pub mod fd;
pub mod fop;
pub mod heal;
pub mod inode;
pub mod lock;
pub mod rss;
pub mod translator;
pub mod txn;

pub use config::Config;
pub use csh::ChildHandle;
pub use error::{FopErrno, VerboseError};
pub use fop::{FopReply, InodeId, MutatingFop};
pub use translator::Translator;
