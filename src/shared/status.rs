//! AfdStatus: component-state bytes, rolling log-level history, and the
//! fleet-wide counters the Motif status viewers poll.
//!
//! Ported from `original_source/common/afddefs.h`'s `afd_status` struct.

use crate::shared::handle::{AreaKind, Handle};
use crate::error::Result;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentState {
    On,
    Off,
    Shutdown,
    Stopped,
}

/// Process classes AfdStatus tracks individually (supervisor, AMG, FD,
/// archive-watch, statistics — matching `ProcessClass` in `shared::lock`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    Amg,
    Fd,
    ArchiveWatch,
    Statistics,
    SystemLog,
    ReceiveLog,
    TransferLog,
    TransDbLog,
}

pub const LOG_FIFO_DEPTH: usize = 5;
pub const LOG_HISTORY_DEPTH: usize = 48;

/// Per-log-channel rolling state: the last `LOG_FIFO_DEPTH` sign bytes
/// seen and a `LOG_HISTORY_DEPTH`-entry ring of daily totals.
#[derive(Debug, Clone)]
pub struct LogChannelHistory {
    pub recent_signs: Vec<u8>,
    pub history: [u32; LOG_HISTORY_DEPTH],
    pub history_pos: usize,
}

impl LogChannelHistory {
    pub fn new() -> Self {
        Self {
            recent_signs: Vec::with_capacity(LOG_FIFO_DEPTH),
            history: [0; LOG_HISTORY_DEPTH],
            history_pos: 0,
        }
    }

    pub fn push_sign(&mut self, sign: u8) {
        if self.recent_signs.len() == LOG_FIFO_DEPTH {
            self.recent_signs.remove(0);
        }
        self.recent_signs.push(sign);
    }

    /// Roll the daily bucket forward, matching §4.6's "once per day emit
    /// the log-statistics summary and roll the month label".
    pub fn roll_day(&mut self, count: u32) {
        self.history[self.history_pos] = count;
        self.history_pos = (self.history_pos + 1) % LOG_HISTORY_DEPTH;
    }
}

impl Default for LogChannelHistory {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
pub struct AfdStatusRecord {
    pub amg: ComponentState,
    pub fd: ComponentState,
    pub archive_watch: ComponentState,
    pub statistics: ComponentState,

    pub system_log: LogChannelHistory,
    pub receive_log: LogChannelHistory,
    pub transfer_log: LogChannelHistory,
    pub trans_db_log: LogChannelHistory,

    pub fork_counter: u64,
    pub burst_counter: u64,
    pub queue_length_high_water: u64,
    pub dir_scan_counter: u64,

    pub no_of_transfers: u32,
    pub jobs_in_queue: u64,
    pub start_time: i64,
}

impl AfdStatusRecord {
    pub fn new(start_time: i64) -> Self {
        Self {
            amg: ComponentState::Off,
            fd: ComponentState::Off,
            archive_watch: ComponentState::Off,
            statistics: ComponentState::Off,
            system_log: LogChannelHistory::new(),
            receive_log: LogChannelHistory::new(),
            transfer_log: LogChannelHistory::new(),
            trans_db_log: LogChannelHistory::new(),
            fork_counter: 0,
            burst_counter: 0,
            queue_length_high_water: 0,
            dir_scan_counter: 0,
            no_of_transfers: 0,
            jobs_in_queue: 0,
            start_time,
        }
    }

    pub fn component_state_mut(&mut self, component: Component) -> Option<&mut ComponentState> {
        match component {
            Component::Amg => Some(&mut self.amg),
            Component::Fd => Some(&mut self.fd),
            Component::ArchiveWatch => Some(&mut self.archive_watch),
            Component::Statistics => Some(&mut self.statistics),
            _ => None,
        }
    }

    pub fn note_queue_length(&mut self, length: u64) {
        self.jobs_in_queue = length;
        if length > self.queue_length_high_water {
            self.queue_length_high_water = length;
        }
    }
}

pub const STATUS_VERSION: u8 = 1;

pub struct AfdStatus {
    handle: Handle,
    pub record: AfdStatusRecord,
}

impl AfdStatus {
    pub fn attach_or_create(fifo_dir: &Path, start_time: i64) -> Result<Self> {
        let handle = Handle::attach_or_create(fifo_dir, AreaKind::Status, STATUS_VERSION, 1, || vec![0u8; 64])?;
        Ok(Self {
            handle,
            record: AfdStatusRecord::new(start_time),
        })
    }

    pub fn attach(fifo_dir: &Path) -> Result<Self> {
        let handle = Handle::attach(fifo_dir, AreaKind::Status, STATUS_VERSION)?;
        Ok(Self {
            handle,
            record: AfdStatusRecord::new(0),
        })
    }

    pub fn check_stale(&self) -> bool {
        self.handle.check_stale()
    }
}
