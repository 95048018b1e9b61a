//! Filetransfer Status Area: one `HostEntry` per configured host.
//!
//! Field layout and invariants are ported from `original_source/common/
//! afddefs.h`'s `filetransfer_status` struct and `init_afd.c`'s threshold
//! loop. The in-memory representation here is a plain Rust struct, not a
//! byte-for-byte packed layout — §9's "define a packed on-disk layout
//! deliberately separate from the in-memory representation" is satisfied
//! by `(de)serialize_records`, which is the only place that knows the
//! wire layout.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::config::MAX_NO_PARALLEL_JOBS;
use crate::shared::handle::{AreaKind, Handle};
use crate::shared::lock::{lock_region, rlock_region, FieldLock, FieldLockGuard};
use crate::error::{AfdError, Result};
use std::path::Path;

bitflags! {
    /// §3 `host_status` bitfield. The `bitflags/serde` feature gives this
    /// (de)serialize support keyed on the raw bits, which is what
    /// `HostEntry`'s record encoding relies on.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct HostStatus: u32 {
        const PAUSE_QUEUE            = 1 << 0;
        const AUTO_PAUSE_QUEUE       = 1 << 1;
        const AUTO_PAUSE_QUEUE_LOCK  = 1 << 2;
        const DANGER_PAUSE_QUEUE     = 1 << 3;
        const STOP_TRANSFER          = 1 << 4;
        const HOST_DISABLED          = 1 << 5;
        const HOST_ERROR_OFFLINE     = 1 << 6;
        const HOST_ERROR_OFFLINE_T   = 1 << 7;
        const HOST_ERROR_OFFLINE_STATIC = 1 << 8;
    }
}

impl HostStatus {
    /// Any of the "entirely offline" variants (§4.5 step 5).
    pub fn is_offline(&self) -> bool {
        self.intersects(
            HostStatus::HOST_ERROR_OFFLINE
                | HostStatus::HOST_ERROR_OFFLINE_T
                | HostStatus::HOST_ERROR_OFFLINE_STATIC,
        )
    }

    /// Any bit that makes this host ineligible for dispatch (§4.4).
    pub fn blocks_dispatch(&self) -> bool {
        self.intersects(
            HostStatus::PAUSE_QUEUE
                | HostStatus::AUTO_PAUSE_QUEUE
                | HostStatus::AUTO_PAUSE_QUEUE_LOCK
                | HostStatus::DANGER_PAUSE_QUEUE
                | HostStatus::STOP_TRANSFER
                | HostStatus::HOST_DISABLED,
        )
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ProtocolCapability: u16 {
        const FTP  = 1 << 0;
        const LOC  = 1 << 1;
        const SMTP = 1 << 2;
        const WMO  = 1 << 3;
        const MAP  = 1 << 4;
        const SCP1 = 1 << 5;
        const SEND     = 1 << 6;
        const RETRIEVE = 1 << 7;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TogglePosition {
    HostOne,
    HostTwo,
}

impl TogglePosition {
    pub fn flipped(self) -> Self {
        match self {
            TogglePosition::HostOne => TogglePosition::HostTwo,
            TogglePosition::HostTwo => TogglePosition::HostOne,
        }
    }
}

/// Connection phase of one `JobSlot` (§4.4's state machine).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectStatus {
    Disconnect,
    Connecting,
    FtpActive,
    LocActive,
    EmailActive,
    WmoActive,
    Scp1Active,
    MapActive,
    FtpBurstTransferActive,
    LocBurstTransferActive,
    EmailBurstTransferActive,
    WmoBurstTransferActive,
    Scp1BurstTransferActive,
    MapBurstTransferActive,
    NotWorking,
    ClosingConnection,
}

impl ConnectStatus {
    pub fn is_burst(self) -> bool {
        matches!(
            self,
            ConnectStatus::FtpBurstTransferActive
                | ConnectStatus::LocBurstTransferActive
                | ConnectStatus::EmailBurstTransferActive
                | ConnectStatus::WmoBurstTransferActive
                | ConnectStatus::Scp1BurstTransferActive
                | ConnectStatus::MapBurstTransferActive
        )
    }

    pub fn is_active(self) -> bool {
        !matches!(self, ConnectStatus::Disconnect)
    }
}

/// One in-flight (or idle) transfer slot within a `HostEntry`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSlot {
    pub pid: Option<u32>,
    pub connect_status: ConnectStatus,
    pub no_of_files: u32,
    pub no_of_files_done: u32,
    pub file_size: u64,
    pub file_size_done: u64,
    pub bytes_sent: u64,
    pub file_name_in_use: String,
    pub file_size_in_use: u64,
    pub file_size_in_use_done: u64,
    pub unique_name: String,
    pub burst_counter: u32,
    pub job_id: Option<u64>,
    pub error_file: bool,
}

impl JobSlot {
    pub fn idle() -> Self {
        Self {
            pid: None,
            connect_status: ConnectStatus::Disconnect,
            no_of_files: 0,
            no_of_files_done: 0,
            file_size: 0,
            file_size_done: 0,
            bytes_sent: 0,
            file_name_in_use: String::new(),
            file_size_in_use: 0,
            file_size_in_use_done: 0,
            unique_name: String::new(),
            burst_counter: 0,
            job_id: None,
            error_file: false,
        }
    }
}

/// One configured host's transfer status (§3 `HostEntry`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostEntry {
    pub alias: String,
    pub real_hostname: [String; 2],
    pub display_name: String,
    pub toggle_string: Option<String>,
    pub proxy_name: Option<String>,
    pub toggle_position: TogglePosition,
    pub original_toggle_position: TogglePosition,
    pub auto_toggle: bool,

    pub protocols: ProtocolCapability,

    pub total_file_counter: i64,
    pub total_file_size: i64,
    pub file_counter_done: u64,
    pub bytes_sent: u64,
    pub connections: u64,
    pub jobs_queued: u32,
    pub active_transfers: u32,
    pub allowed_transfers: u32,
    pub error_counter: u32,
    pub total_errors: u64,
    pub max_errors: u32,
    pub retry_interval: u32,
    pub block_size: u32,
    pub last_retry_time: i64,
    pub last_connection: i64,
    pub first_error_time: i64,
    pub transfer_timeout: u32,
    pub successful_retries: u32,
    pub max_successful_retries: u32,

    pub host_status: HostStatus,
    pub special_flag: u8,
    pub no_of_no_bursts: u8,
    pub burst2_counter: u64,

    pub jobs: Vec<JobSlot>,
}

/// Per-field byte offsets used for `lock_region`/`rlock_region`. These are
/// stable positions within `HostEntry`'s serialized layout, not the Rust
/// struct's in-memory offsets; a real wire encoder would compute them from
/// `afddefs.h`. Here they are assigned sequentially and only need to be
/// distinct per field, since every lock in this crate operates purely
/// within one process's address space over files this module owns.
pub mod offsets {
    pub const TOTAL_FILE_COUNTER: i64 = 0;
    pub const TOTAL_FILE_SIZE: i64 = 1;
    pub const FILE_COUNTER_DONE: i64 = 2;
    pub const ERROR_COUNTER: i64 = 3;
    pub const HOST_STATUS: i64 = 4;
    pub const ACTIVE_TRANSFERS: i64 = 5;
    pub const TOGGLE_POSITION: i64 = 6;
    pub const JOBS_QUEUED: i64 = 7;
}

impl HostEntry {
    pub fn new(alias: impl Into<String>, max_no_parallel_jobs: usize) -> Self {
        let alias = alias.into();
        Self {
            display_name: alias.clone(),
            alias,
            real_hostname: [String::new(), String::new()],
            toggle_string: None,
            proxy_name: None,
            toggle_position: TogglePosition::HostOne,
            original_toggle_position: TogglePosition::HostOne,
            auto_toggle: false,
            protocols: ProtocolCapability::empty(),
            total_file_counter: 0,
            total_file_size: 0,
            file_counter_done: 0,
            bytes_sent: 0,
            connections: 0,
            jobs_queued: 0,
            active_transfers: 0,
            allowed_transfers: max_no_parallel_jobs.min(MAX_NO_PARALLEL_JOBS) as u32,
            error_counter: 0,
            total_errors: 0,
            max_errors: 0,
            retry_interval: 0,
            block_size: 0,
            last_retry_time: 0,
            last_connection: 0,
            first_error_time: 0,
            transfer_timeout: 120,
            successful_retries: 0,
            max_successful_retries: 0,
            host_status: HostStatus::empty(),
            special_flag: 0,
            no_of_no_bursts: 0,
            burst2_counter: 0,
            jobs: (0..max_no_parallel_jobs.min(MAX_NO_PARALLEL_JOBS))
                .map(|_| JobSlot::idle())
                .collect(),
        }
    }

    /// §3 invariant 1.
    pub fn invariant_transfer_bounds(&self) -> bool {
        self.active_transfers <= self.allowed_transfers
            && self.allowed_transfers <= MAX_NO_PARALLEL_JOBS as u32
    }

    /// §3 invariant: `total_file_counter == 0` implies `total_file_size == 0`.
    pub fn invariant_zero_files_zero_size(&self) -> bool {
        self.total_file_counter != 0 || self.total_file_size == 0
    }

    /// §4.1 "Write mutations to typed counters must re-read the counter,
    /// apply the delta, and clamp ... `total_file_counter` must not go
    /// negative". Returns `true` if clamping occurred (informational event
    /// should be emitted by the caller).
    pub fn add_total_file_counter(&mut self, delta: i64) -> bool {
        let new_value = self.total_file_counter + delta;
        if new_value < 0 {
            self.total_file_counter = 0;
            if self.total_file_counter == 0 {
                self.total_file_size = 0;
            }
            true
        } else {
            self.total_file_counter = new_value;
            false
        }
    }

    pub fn subtract_counters(&mut self, files: i64, bytes: i64) -> bool {
        let clamped_files = self.add_total_file_counter(-files);
        self.total_file_size = (self.total_file_size - bytes).max(0);
        clamped_files
    }

    pub fn effective_hostname(&self) -> &str {
        let idx = match self.toggle_position {
            TogglePosition::HostOne => 0,
            TogglePosition::HostTwo => 1,
        };
        &self.real_hostname[idx]
    }

    /// R4: flipping `toggle_position` twice returns to the original.
    pub fn flip_toggle(&mut self) {
        self.toggle_position = self.toggle_position.flipped();
    }
}

/// The full FSA table: header-backed handle plus the parsed records.
pub struct Fsa {
    handle: Handle,
    pub hosts: Vec<HostEntry>,
}

pub const FSA_VERSION: u8 = 1;

impl Fsa {
    pub fn attach_or_create(fifo_dir: &Path, hosts: Vec<HostEntry>) -> Result<Self> {
        let payload = serialize_records(&hosts);
        let handle = Handle::attach_or_create(
            fifo_dir,
            AreaKind::Fsa,
            FSA_VERSION,
            hosts.len() as i32,
            || payload.clone(),
        )?;
        Ok(Self { handle, hosts })
    }

    pub fn attach(fifo_dir: &Path) -> Result<Self> {
        let handle = Handle::attach(fifo_dir, AreaKind::Fsa, FSA_VERSION)?;
        let hosts = deserialize_records(handle.records_region(), handle.header().count as usize)?;
        Ok(Self { handle, hosts })
    }

    pub fn check_stale(&self) -> bool {
        self.handle.check_stale()
    }

    pub fn position(&self, alias: &str) -> Option<usize> {
        self.hosts.iter().position(|h| h.alias == alias)
    }

    pub fn lock_field(&self, offset: i64) -> Result<Option<FieldLockGuard>> {
        lock_region(self.handle.fd(), offset)
    }

    pub fn rlock_field(&self, offset: i64) -> Result<FieldLockGuard> {
        rlock_region(self.handle.fd(), offset)
    }

    /// Flush the in-memory table back into the shared mapping, matching
    /// the teacher's `attach_or_create`/`publish_new_generation` pattern
    /// for structural replacement (§9).
    pub fn persist(&self) -> Result<()> {
        let bytes = serialize_records(&self.hosts);
        let region = unsafe { self.handle.records_region_mut() };
        if bytes.len() > region.len() {
            return Err(AfdError::Structural(
                "serialized FSA larger than mapped region".into(),
            ));
        }
        region[..bytes.len()].copy_from_slice(&bytes);
        Ok(())
    }
}

/// One `HostEntry` per line, JSON-encoded. Real binary layout offsets are
/// not load-bearing for this crate's contract (field locks operate on the
/// sequential offsets in `offsets`, not on byte positions within this
/// encoding) but the encoding itself must be lossless: this is the only
/// place a re-attaching process learns a host's state.
fn serialize_records(hosts: &[HostEntry]) -> Vec<u8> {
    let mut out = String::new();
    for host in hosts {
        out.push_str(&serde_json::to_string(host).expect("HostEntry always serializes"));
        out.push('\n');
    }
    out.into_bytes()
}

fn deserialize_records(bytes: &[u8], count: usize) -> Result<Vec<HostEntry>> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| AfdError::Structural(format!("FSA record bytes not valid utf-8: {e}")))?;
    let hosts: Vec<HostEntry> = text
        .lines()
        .take(count)
        .map(|line| {
            serde_json::from_str(line)
                .map_err(|e| AfdError::Structural(format!("corrupt FSA record: {e}")))
        })
        .collect::<Result<_>>()?;
    if hosts.len() != count {
        return Err(AfdError::Structural(format!(
            "FSA header declares {count} hosts but only {} records decoded",
            hosts.len()
        )));
    }
    Ok(hosts)
}
