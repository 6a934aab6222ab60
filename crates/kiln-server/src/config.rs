//! Configuration file parsing.
//!
//! The config file is line-oriented: whitespace-separated tokens, first
//! token is the directive. Unknown directives are ignored; a line that
//! fails to parse is logged and skipped, never fatal. A missing file
//! yields the defaults.

use std::fs;
use std::path::{Path, PathBuf};

use kiln_core::{EvictionPolicy, StoreConfig};
use kiln_persistence::FsyncPolicy;
use tracing::warn;

/// One `save <secs> <keys>` snapshot rule: persist when at least
/// `keys_changed` mutations happened within a `secs`-second window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaveRule {
    pub secs: u64,
    pub keys_changed: u64,
}

/// Parsed server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Working directory for persistence files; created if missing.
    pub dir: PathBuf,
    /// Snapshot filename within `dir`.
    pub rdb_filename: String,
    /// Snapshot rules; empty means no scheduled snapshots.
    pub save_rules: Vec<SaveRule>,
    /// Whether the append-only log is enabled.
    pub aof_enabled: bool,
    /// Append-only log filename within `dir`.
    pub aof_filename: String,
    /// Append-only log sync discipline.
    pub aof_fsync: FsyncPolicy,
    /// Plaintext password for AUTH; `None` disables the auth gate.
    pub requirepass: Option<String>,
    /// Memory ceiling in bytes; `0` disables it.
    pub max_memory: u64,
    /// Eviction policy once the ceiling is hit.
    pub eviction: EvictionPolicy,
    /// Sample size per eviction pass.
    pub mem_samples: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("."),
            rdb_filename: "dump.rdb".into(),
            save_rules: Vec::new(),
            aof_enabled: false,
            aof_filename: "appendonly.aof".into(),
            aof_fsync: FsyncPolicy::default(),
            requirepass: None,
            max_memory: 0,
            eviction: EvictionPolicy::NoEviction,
            mem_samples: 5,
        }
    }
}

impl Config {
    /// Full path of the snapshot file.
    pub fn rdb_path(&self) -> PathBuf {
        self.dir.join(&self.rdb_filename)
    }

    /// Full path of the append-only log.
    pub fn aof_path(&self) -> PathBuf {
        self.dir.join(&self.aof_filename)
    }

    /// The limits the keyspace enforces.
    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            max_memory: self.max_memory,
            eviction: self.eviction,
            mem_samples: self.mem_samples,
        }
    }
}

/// Reads the config file at `path`. An unreadable file logs a warning
/// and falls back to defaults. Ensures `dir` exists afterwards.
pub fn read_config(path: &Path) -> Config {
    let mut config = Config::default();

    match fs::read_to_string(path) {
        Ok(contents) => {
            for (idx, line) in contents.lines().enumerate() {
                if let Err(msg) = parse_line(line, &mut config) {
                    warn!(line = idx + 1, "config: {msg}, skipping");
                }
            }
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "cannot read config, using defaults");
        }
    }

    if let Err(e) = fs::create_dir_all(&config.dir) {
        warn!(dir = %config.dir.display(), error = %e, "cannot create working directory");
    }

    config
}

/// Applies one config line to `config`.
fn parse_line(line: &str, config: &mut Config) -> Result<(), String> {
    let mut tokens = line.split_whitespace();
    let Some(directive) = tokens.next() else {
        return Ok(());
    };
    let args: Vec<&str> = tokens.collect();
    let arg = |i: usize| -> Result<&str, String> {
        args.get(i)
            .copied()
            .ok_or_else(|| format!("'{directive}' is missing an argument"))
    };

    match directive {
        "dir" => config.dir = PathBuf::from(arg(0)?),
        "dbfilename" => config.rdb_filename = arg(0)?.to_owned(),
        "appendfilename" => config.aof_filename = arg(0)?.to_owned(),
        "appendonly" => config.aof_enabled = arg(0)? == "yes",
        "appendfsync" => config.aof_fsync = arg(0)?.parse()?,
        "save" => {
            let secs = arg(0)?
                .parse::<u64>()
                .map_err(|_| "invalid number of seconds for 'save'".to_owned())?;
            let keys_changed = arg(1)?
                .parse::<u64>()
                .map_err(|_| "invalid key count for 'save'".to_owned())?;
            config.save_rules.push(SaveRule { secs, keys_changed });
        }
        "requirepass" => config.requirepass = Some(arg(0)?.to_owned()),
        "maxmemory" => config.max_memory = parse_mem(arg(0)?)?,
        "maxmemory-policy" => config.eviction = arg(0)?.parse()?,
        "maxmemory-samples" => {
            config.mem_samples = arg(0)?
                .parse::<usize>()
                .map_err(|_| "invalid value for 'maxmemory-samples'".to_owned())?;
        }
        // unknown directives are ignored
        _ => {}
    }
    Ok(())
}

/// Parses a memory size with optional `b`/`kb`/`mb`/`gb` suffix
/// (powers of 1024), e.g. "1024kb" -> 1048576.
pub fn parse_mem(input: &str) -> Result<u64, String> {
    let lower = input.trim().to_ascii_lowercase();

    let (num, multiplier) = if let Some(n) = lower.strip_suffix("kb") {
        (n, 1024)
    } else if let Some(n) = lower.strip_suffix("mb") {
        (n, 1024 * 1024)
    } else if let Some(n) = lower.strip_suffix("gb") {
        (n, 1024 * 1024 * 1024)
    } else if let Some(n) = lower.strip_suffix('b') {
        (n, 1)
    } else {
        (lower.as_str(), 1)
    };

    let num: u64 = num
        .parse()
        .map_err(|_| format!("invalid memory size '{input}'"))?;
    num.checked_mul(multiplier)
        .ok_or_else(|| format!("memory size overflow '{input}'"))
}
