//! Protocol drivers and the per-slot connection state machine.
//!
//! `ProtocolDriver` follows the same init/submit/poll/cleanup shape as a
//! pluggable IO engine trait, generalized to AFD's one-shot-transfer-per-dispatch
//! model. Only two concrete drivers are implemented: `LocDriver` (the
//! `LOC` protocol — plain local file copy, simple enough to implement
//! without drifting into the out-of-scope wire protocols) and
//! `MockDriver` for tests and as a stand-in for the unimplemented wire
//! protocols (FTP/SMTP/WMO/SCP1/MAP).

use std::path::{Path, PathBuf};

use crate::error::{AfdError, Result};
use crate::shared::fsa::ConnectStatus;

#[derive(Debug, Clone)]
pub struct TransferJob {
    pub recipient: String,
    pub files: Vec<PathBuf>,
    pub options: Option<String>,
}

#[derive(Debug, Clone)]
pub struct TransferOutcome {
    pub files_done: u32,
    pub bytes_done: u64,
    pub success: bool,
}

pub trait ProtocolDriver: Send {
    fn active_status(&self) -> ConnectStatus;
    fn burst_status(&self) -> ConnectStatus;

    /// Run one dispatch's worth of transfer. Errors returned here are
    /// transient-network/protocol errors in §7's taxonomy; the caller
    /// decides how they feed the error/threshold state machine.
    fn transfer(&mut self, job: &TransferJob) -> Result<TransferOutcome>;
}

/// `LOC`: copy files into a local destination directory. `recipient` is a
/// `loc://<path>` URL; everything after the scheme is the destination
/// directory.
pub struct LocDriver;

impl LocDriver {
    fn destination_dir(recipient: &str) -> &str {
        recipient.strip_prefix("loc://").unwrap_or(recipient)
    }
}

impl ProtocolDriver for LocDriver {
    fn active_status(&self) -> ConnectStatus {
        ConnectStatus::LocActive
    }

    fn burst_status(&self) -> ConnectStatus {
        ConnectStatus::LocBurstTransferActive
    }

    fn transfer(&mut self, job: &TransferJob) -> Result<TransferOutcome> {
        let dest_dir = Path::new(Self::destination_dir(&job.recipient));
        std::fs::create_dir_all(dest_dir)
            .map_err(|e| AfdError::transient(format!("create_dir_all {dest_dir:?}"), e))?;

        let mut files_done = 0;
        let mut bytes_done = 0;
        for file in &job.files {
            let file_name = file
                .file_name()
                .ok_or_else(|| AfdError::Structural(format!("{file:?}: no file name")))?;
            let bytes = std::fs::copy(file, dest_dir.join(file_name))
                .map_err(|e| AfdError::transient(format!("copy {file:?}"), e))?;
            files_done += 1;
            bytes_done += bytes;
        }

        Ok(TransferOutcome {
            files_done,
            bytes_done,
            success: true,
        })
    }
}

/// A scriptable driver for tests and for exercising protocols this crate
/// doesn't implement. Each call to `transfer` pops the next scripted
/// outcome (or repeats the last one once the script is exhausted).
pub struct MockDriver {
    script: Vec<Result<TransferOutcome>>,
    calls: usize,
}

impl MockDriver {
    pub fn new(script: Vec<Result<TransferOutcome>>) -> Self {
        Self { script, calls: 0 }
    }

    pub fn always_succeeds(files_done: u32, bytes_done: u64) -> Self {
        Self::new(vec![Ok(TransferOutcome {
            files_done,
            bytes_done,
            success: true,
        })])
    }

    pub fn calls(&self) -> usize {
        self.calls
    }
}

impl ProtocolDriver for MockDriver {
    fn active_status(&self) -> ConnectStatus {
        ConnectStatus::FtpActive
    }

    fn burst_status(&self) -> ConnectStatus {
        ConnectStatus::FtpBurstTransferActive
    }

    fn transfer(&mut self, _job: &TransferJob) -> Result<TransferOutcome> {
        let idx = self.calls.min(self.script.len().saturating_sub(1));
        self.calls += 1;
        match &self.script[idx] {
            Ok(outcome) => Ok(outcome.clone()),
            Err(AfdError::Transient { context, source }) => Err(AfdError::Transient {
                context: context.clone(),
                source: std::io::Error::new(source.kind(), source.to_string()),
            }),
            Err(other) => Err(AfdError::Fatal(other.to_string())),
        }
    }
}

/// §4.4's state diagram, driven one edge at a time.
pub fn on_dispatch_start() -> ConnectStatus {
    ConnectStatus::Connecting
}

pub fn on_connect_ok(driver: &impl ProtocolDriver) -> ConnectStatus {
    driver.active_status()
}

pub fn on_connect_fail() -> ConnectStatus {
    ConnectStatus::NotWorking
}

pub fn on_more_messages_same_job(driver: &impl ProtocolDriver) -> ConnectStatus {
    driver.burst_status()
}

pub fn on_done(current: ConnectStatus) -> ConnectStatus {
    match current {
        ConnectStatus::NotWorking => ConnectStatus::ClosingConnection,
        _ => ConnectStatus::ClosingConnection,
    }
}

pub fn on_closed(_current: ConnectStatus) -> ConnectStatus {
    ConnectStatus::Disconnect
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loc_driver_copies_files_into_destination() {
        let src_dir = tempfile::tempdir().unwrap();
        let dst_dir = tempfile::tempdir().unwrap();
        let src_file = src_dir.path().join("a.txt");
        std::fs::write(&src_file, b"hello").unwrap();

        let mut driver = LocDriver;
        let job = TransferJob {
            recipient: format!("loc://{}", dst_dir.path().display()),
            files: vec![src_file],
            options: None,
        };
        let outcome = driver.transfer(&job).unwrap();
        assert_eq!(outcome.files_done, 1);
        assert_eq!(outcome.bytes_done, 5);
        assert!(dst_dir.path().join("a.txt").exists());
    }

    #[test]
    fn mock_driver_replays_scripted_outcomes_then_repeats_last() {
        let mut driver = MockDriver::always_succeeds(3, 100);
        let job = TransferJob {
            recipient: "ftp://h/d".into(),
            files: vec![],
            options: None,
        };
        let first = driver.transfer(&job).unwrap();
        let second = driver.transfer(&job).unwrap();
        assert_eq!(first.files_done, second.files_done);
        assert_eq!(driver.calls(), 2);
    }

    #[test]
    fn state_machine_path_reaches_disconnect_after_failure() {
        let status = on_dispatch_start();
        assert_eq!(status, ConnectStatus::Connecting);
        let status = on_connect_fail();
        assert_eq!(status, ConnectStatus::NotWorking);
        let status = on_done(status);
        assert_eq!(status, ConnectStatus::ClosingConnection);
        let status = on_closed(status);
        assert_eq!(status, ConnectStatus::Disconnect);
    }

    #[test]
    fn state_machine_path_supports_burst_transfer() {
        let driver = MockDriver::always_succeeds(1, 1);
        let status = on_connect_ok(&driver);
        assert_eq!(status, ConnectStatus::FtpActive);
        let status = on_more_messages_same_job(&driver);
        assert_eq!(status, ConnectStatus::FtpBurstTransferActive);
        assert!(status.is_burst());
    }
}
