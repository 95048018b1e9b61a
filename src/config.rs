//! Daemon bootstrap configuration.
//!
//! This is *not* `DIR_CONFIG`/`HOST_CONFIG` — those describe distribution
//! jobs and hosts and are explicitly out of scope. `RuntimeConfig` covers
//! only what the supervisor itself needs to start: working directory,
//! tick cadence, shutdown budget, and the link-count back-pressure
//! thresholds from the design doc. Built from CLI flags layered over an
//! optional TOML file: parse the flags, then fold a config file over them,
//! the same two-stage shape as everywhere else in this crate.

use std::path::PathBuf;

use clap::Parser;
use serde::{Deserialize, Serialize};

/// Maximum parallel transfers allowed for any single host.
pub const MAX_NO_PARALLEL_JOBS: usize = 10;

/// `LINK_MAX` fallback used by the back-pressure calculation when the
/// filesystem doesn't report one (matches the original's portable default).
pub const LINK_MAX: i64 = 1000;

/// Directories that always exist under the outgoing file directory and
/// must be excluded from the link-count job estimate (".", "..", "error",
/// "pool", "time", "incoming").
pub const DIRS_IN_FILE_DIR: i64 = 6;

pub const STOP_AMG_THRESHOLD: i64 = 20;
pub const START_AMG_THRESHOLD: i64 = 100;

/// Half of `LINK_MAX`, the per-host queue-saturation danger threshold.
pub const DANGER_NO_OF_JOBS: i64 = LINK_MAX / 2;

pub const NO_OF_SAVED_CORE_FILES: usize = 10;

#[derive(Parser, Debug, Clone)]
#[command(name = "init_afd", about = "Automatic File Distribution supervisor")]
pub struct Cli {
    /// AFD working directory. Falls back to `AFD_WORK_DIR`, then a
    /// compiled-in default.
    #[arg(short = 'w', long, env = "AFD_WORK_DIR")]
    pub work_dir: Option<PathBuf>,

    /// Start components but leave ingestion disabled (`-nd`, "no delete/
    /// dispatch" — the original's "don't touch the queue yet" startup
    /// flag).
    #[arg(short = 'n', long = "no-dispatch")]
    pub no_dispatch: bool,

    /// Optional TOML file with `RuntimeConfig` overrides.
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl Cli {
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}

/// Tunables the supervisor and worker pool read at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub work_dir: PathBuf,
    /// Seconds between supervisor tick iterations (`AFD_RESCAN_TIME`).
    pub rescan_time_secs: u64,
    /// Seconds the supervisor waits for AMG/FD to drain on shutdown.
    pub max_shutdown_time_secs: u64,
    pub max_no_parallel_jobs: usize,
    pub link_max: i64,
    pub stop_amg_threshold: i64,
    pub start_amg_threshold: i64,
    pub dirs_in_file_dir: i64,
    pub danger_no_of_jobs: i64,
    pub no_of_saved_core_files: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            work_dir: default_work_dir(),
            rescan_time_secs: 10,
            max_shutdown_time_secs: 60,
            max_no_parallel_jobs: MAX_NO_PARALLEL_JOBS,
            link_max: LINK_MAX,
            stop_amg_threshold: STOP_AMG_THRESHOLD,
            start_amg_threshold: START_AMG_THRESHOLD,
            dirs_in_file_dir: DIRS_IN_FILE_DIR,
            danger_no_of_jobs: DANGER_NO_OF_JOBS,
            no_of_saved_core_files: NO_OF_SAVED_CORE_FILES,
        }
    }
}

fn default_work_dir() -> PathBuf {
    PathBuf::from("/tmp/afd")
}

impl RuntimeConfig {
    /// Build from CLI flags, optionally layering a TOML file over the
    /// defaults first.
    pub fn from_cli(cli: &Cli) -> anyhow::Result<Self> {
        let mut cfg = if let Some(path) = &cli.config {
            let text = std::fs::read_to_string(path)?;
            toml::from_str(&text)?
        } else {
            RuntimeConfig::default()
        };

        if let Some(dir) = &cli.work_dir {
            cfg.work_dir = dir.clone();
        } else if let Ok(dir) = std::env::var("AFD_WORK_DIR") {
            cfg.work_dir = PathBuf::from(dir);
        }

        Ok(cfg)
    }

    pub fn fifo_dir(&self) -> PathBuf {
        self.work_dir.join("fifodir")
    }

    pub fn messages_dir(&self) -> PathBuf {
        self.work_dir.join("messages")
    }

    pub fn files_dir(&self) -> PathBuf {
        self.work_dir.join("files")
    }

    pub fn log_dir(&self) -> PathBuf {
        self.work_dir.join("log")
    }

    pub fn archive_dir(&self) -> PathBuf {
        self.work_dir.join("archive")
    }

    pub fn etc_dir(&self) -> PathBuf {
        self.work_dir.join("etc")
    }

    /// The full set of sub-directories startup must ensure exist (§4.6
    /// step 2: fifo, message, file, outgoing, store, CRC, pool, time,
    /// incoming, file-mask, ls-data, log, archive).
    pub fn required_subdirs(&self) -> Vec<PathBuf> {
        vec![
            self.fifo_dir(),
            self.messages_dir(),
            self.files_dir(),
            self.files_dir().join("outgoing"),
            self.files_dir().join("store"),
            self.files_dir().join("crc"),
            self.files_dir().join("pool"),
            self.files_dir().join("time"),
            self.files_dir().join("incoming"),
            self.files_dir().join("error"),
            self.work_dir.join("file-mask"),
            self.work_dir.join("ls-data"),
            self.log_dir(),
            self.archive_dir(),
            self.etc_dir(),
        ]
    }
}
