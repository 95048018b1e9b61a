//! AfdActive: the supervisor's own lock file — PID slots in fixed
//! process-class order, a heartbeat word, and a one-byte shutdown flag.
//!
//! Ported from `original_source/init_afd/check_afd_heartbeat.c` (the
//! startup contention check) and `original_source/common/log_pid.c` (slot
//! write-back after fork/restart).

use std::fs::OpenOptions;
use std::io::{Read, Seek, SeekFrom, Write};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::error::{AfdError, Result};
use crate::shared::lock::{lock_region, FieldLockGuard};
use crate::supervisor::childspec::ProcessSlot;

/// Fixed layout: one `u32` PID per process slot, then a `u32` heartbeat,
/// then one shutdown byte.
fn heartbeat_offset(n_slots: usize) -> usize {
    n_slots * 4
}

fn shutdown_offset(n_slots: usize) -> usize {
    heartbeat_offset(n_slots) + 4
}

fn file_len(n_slots: usize) -> usize {
    shutdown_offset(n_slots) + 1
}

pub struct AfdActive {
    file: std::fs::File,
    path: PathBuf,
    n_slots: usize,
}

impl AfdActive {
    fn active_path(fifo_dir: &Path) -> PathBuf {
        fifo_dir.join("afd_active")
    }

    /// §4.6 step 3: if the file exists and its heartbeat advances within
    /// `wait`, another supervisor already owns this working directory.
    pub fn check_heartbeat(fifo_dir: &Path, n_slots: usize, wait: Duration) -> Result<bool> {
        let path = Self::active_path(fifo_dir);
        if !path.exists() {
            return Ok(false);
        }

        let mut file = OpenOptions::new()
            .read(true)
            .open(&path)
            .map_err(|e| AfdError::transient(format!("open {path:?}"), e))?;

        let offset = heartbeat_offset(n_slots);
        let first = read_u32_at(&mut file, offset)
            .map_err(|e| AfdError::transient(format!("read heartbeat {path:?}"), e))?;

        let deadline = Instant::now() + wait;
        while Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(200));
            let current = read_u32_at(&mut file, offset)
                .map_err(|e| AfdError::transient(format!("read heartbeat {path:?}"), e))?;
            if current != first {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// §4.6 step 4: truncate, write the size-zero sentinel (encoded here
    /// as an all-zero heartbeat plus cleared shutdown byte), and map the
    /// PID-slot region.
    pub fn create(fifo_dir: &Path, n_slots: usize) -> Result<Self> {
        std::fs::create_dir_all(fifo_dir)
            .map_err(|e| AfdError::transient(format!("create_dir_all {fifo_dir:?}"), e))?;
        let path = Self::active_path(fifo_dir);
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .map_err(|e| AfdError::Fatal(format!("cannot create {path:?}: {e}")))?;

        let buf = vec![0u8; file_len(n_slots)];
        file.write_all(&buf)
            .map_err(|e| AfdError::Fatal(format!("cannot initialize {path:?}: {e}")))?;
        file.flush().ok();

        Ok(Self { file, path, n_slots })
    }

    pub fn open(fifo_dir: &Path, n_slots: usize) -> Result<Self> {
        let path = Self::active_path(fifo_dir);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| AfdError::AreaUnavailable(format!("{path:?}: {e}")))?;
        Ok(Self { file, path, n_slots })
    }

    pub fn lock_whole_file(&self) -> Result<Option<FieldLockGuard>> {
        lock_region(self.file.as_raw_fd(), 0)
    }

    pub fn set_pid(&mut self, slot: ProcessSlot, pid: u32) -> Result<()> {
        let offset = (slot.index() * 4) as u64;
        self.file
            .seek(SeekFrom::Start(offset))
            .and_then(|_| self.file.write_all(&pid.to_ne_bytes()))
            .map_err(|e| AfdError::transient(format!("write pid slot {slot:?}"), e))
    }

    pub fn get_pid(&mut self, slot: ProcessSlot) -> Result<u32> {
        let offset = (slot.index() * 4) as u64;
        read_u32_at_offset(&mut self.file, offset)
            .map_err(|e| AfdError::transient(format!("read pid slot {slot:?}"), e))
    }

    pub fn all_pids(&mut self) -> Result<Vec<(ProcessSlot, u32)>> {
        let mut out = Vec::new();
        for slot in ProcessSlot::all() {
            let pid = self.get_pid(slot)?;
            if pid != 0 {
                out.push((slot, pid));
            }
        }
        Ok(out)
    }

    /// Increment the heartbeat word — called once per supervisor tick.
    pub fn beat(&mut self) -> Result<u32> {
        let offset = heartbeat_offset(self.n_slots) as u64;
        let current = read_u32_at_offset(&mut self.file, offset)
            .map_err(|e| AfdError::transient("read heartbeat", e))?;
        let next = current.wrapping_add(1);
        self.file
            .seek(SeekFrom::Start(offset))
            .and_then(|_| self.file.write_all(&next.to_ne_bytes()))
            .map_err(|e| AfdError::transient("write heartbeat", e))?;
        Ok(next)
    }

    pub fn set_shutdown(&mut self, flag: bool) -> Result<()> {
        let offset = shutdown_offset(self.n_slots) as u64;
        self.file
            .seek(SeekFrom::Start(offset))
            .and_then(|_| self.file.write_all(&[flag as u8]))
            .map_err(|e| AfdError::transient("write shutdown byte", e))
    }

    pub fn is_shutdown(&mut self) -> Result<bool> {
        let offset = shutdown_offset(self.n_slots) as u64;
        let mut byte = [0u8; 1];
        self.file
            .seek(SeekFrom::Start(offset))
            .and_then(|_| self.file.read_exact(&mut byte))
            .map_err(|e| AfdError::transient("read shutdown byte", e))?;
        Ok(byte[0] != 0)
    }

    /// §4.6's `atexit`-equivalent: unlink the file after every child has
    /// been signalled. The supervisor calls this last.
    pub fn unlink(self) -> Result<()> {
        std::fs::remove_file(&self.path)
            .map_err(|e| AfdError::transient(format!("unlink {:?}", self.path), e))
    }
}

fn read_u32_at(file: &mut std::fs::File, offset: usize) -> std::io::Result<u32> {
    read_u32_at_offset(file, offset as u64)
}

fn read_u32_at_offset(file: &mut std::fs::File, offset: u64) -> std::io::Result<u32> {
    let mut buf = [0u8; 4];
    file.seek(SeekFrom::Start(offset))?;
    file.read_exact(&mut buf)?;
    Ok(u32::from_ne_bytes(buf))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_active_file_has_no_heartbeat_contention() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!AfdActive::check_heartbeat(dir.path(), 5, Duration::from_millis(50)).unwrap());
    }

    #[test]
    fn set_and_get_pid_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let mut active = AfdActive::create(dir.path(), 5).unwrap();
        active.set_pid(ProcessSlot::Fd, 4242).unwrap();
        assert_eq!(active.get_pid(ProcessSlot::Fd).unwrap(), 4242);
        assert_eq!(active.get_pid(ProcessSlot::Amg).unwrap(), 0);
    }

    #[test]
    fn beat_increments_monotonically() {
        let dir = tempfile::tempdir().unwrap();
        let mut active = AfdActive::create(dir.path(), 5).unwrap();
        assert_eq!(active.beat().unwrap(), 1);
        assert_eq!(active.beat().unwrap(), 2);
    }

    #[test]
    fn shutdown_flag_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let mut active = AfdActive::create(dir.path(), 5).unwrap();
        assert!(!active.is_shutdown().unwrap());
        active.set_shutdown(true).unwrap();
        assert!(active.is_shutdown().unwrap());
    }
}
