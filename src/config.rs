//! Configuration.
//!
//! A `serde`-backed struct with `#[serde(default)]`, loadable from YAML,
//! with a `OnceCell`-backed global accessor for hosts that want one
//! process-wide instance. Every internal component takes a `Config` by
//! value/reference so unit tests never touch the global.

use std::{fs, path::Path};

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

static CONFIG: OnceCell<Config> = OnceCell::new();

/// Recognized options: the core behavioral knobs plus the operational
/// ones governing lock-grace and heal throughput.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// N, fixed at init.
    pub child_count: usize,
    /// Optional forced preferred read subvolume index.
    pub read_child: Option<usize>,
    /// When true, arbitration additionally verifies the chosen read
    /// subvol's metadata-readable bit.
    pub consistent_metadata: bool,
    /// When true, the event router triggers background self-heal on
    /// transitions; when false, self-heal runs only inline.
    pub self_heal_daemon: bool,
    /// Whether to retain granted locks across a transient disconnect
    /// before they are administratively cleared.
    pub lock_heal: bool,
    /// How long (seconds) to retain them for, when `lock_heal` is set.
    pub grace_timeout_secs: u64,
    /// The `volume` domain string for ENTRY locks (ELM).
    pub entrylk_domain: String,
    /// The `volume` domain string for byte-range/whole-inode locks (ELM).
    pub inodelk_domain: String,
    /// The `volume` domain string SHE uses for its own locks, kept
    /// distinct from `entrylk_domain`/`inodelk_domain` so a heal can never
    /// self-deadlock against a live transaction.
    pub heal_domain: String,
    /// Bytes copied per SHE content-sync chunk.
    pub heal_segment_size: u64,
    /// Max concurrent per-inode heals the self-heal engine runs at once.
    pub heal_concurrency: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            child_count: 2,
            read_child: None,
            consistent_metadata: false,
            self_heal_daemon: true,
            lock_heal: true,
            grace_timeout_secs: 10,
            entrylk_domain: "afr.entrylk".to_string(),
            inodelk_domain: "afr.inodelk".to_string(),
            heal_domain: "afr.heal".to_string(),
            heal_segment_size: 128 * 1024,
            heal_concurrency: 4,
        }
    }
}

impl Config {
    /// Initializes the process-wide config if not already set, returning a
    /// reference to it either way.
    pub fn get_or_init<F>(f: F) -> &'static Self
    where
        F: FnOnce() -> Config,
    {
        CONFIG.get_or_init(f)
    }

    /// Returns the process-wide config; panics if never initialized.
    pub fn get() -> &'static Self {
        CONFIG.get().expect("Config::get_or_init was never called")
    }

    /// Reads a YAML config file from disk. Missing fields fall back to
    /// `Default`, so a partial config file is always valid.
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
        let bytes = fs::read(path.as_ref()).map_err(|source| ConfigError::Read {
            path: path.as_ref().display().to_string(),
            source,
        })?;
        serde_yaml::from_slice(&bytes).map_err(|source| ConfigError::Parse {
            path: path.as_ref().display().to_string(),
            source,
        })
    }
}

#[derive(Debug, snafu::Snafu)]
#[snafu(visibility = "pub(crate)")]
pub enum ConfigError {
    #[snafu(display("Failed to read config file {}: {}", path, source))]
    Read { path: String, source: std::io::Error },
    #[snafu(display("Failed to parse config file {}: {}", path, source))]
    Parse { path: String, source: serde_yaml::Error },
}
