//! Fileretrieve Status Area: one `DirEntry` per watched directory.
//!
//! Ported from `original_source/common/afddefs.h`'s `fileretrieve_status`
//! struct. The retrieval side (actually scanning directories, fetching
//! over FTP, matching `time_option` crontab-style patterns) is out of
//! scope; only the status-area shape and its cross-references into FSA
//! and the directory-name buffer are modeled, since C4's dispatcher and
//! C5's threshold machine both read `DirEntry.error_counter`.

use serde::{Deserialize, Serialize};

use crate::shared::handle::{AreaKind, Handle};
use crate::error::{AfdError, Result};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DirStatus {
    Normal,
    Disabled,
    Stopped,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct DirFlags {
    pub remove: bool,
    pub stupid_mode: bool,
    pub force_reread: bool,
    pub queued: bool,
    pub delete_unknown_files: bool,
    pub report_unknown_files: bool,
    pub important_dir: bool,
    pub time_option: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirEntry {
    pub dir_alias: String,
    pub url: String,
    pub host_alias: String,
    pub priority: char,
    pub time_pattern: Option<String>,

    pub files_in_dir: u64,
    pub bytes_in_dir: u64,
    pub files_queued: u64,
    pub bytes_in_queue: u64,
    pub files_received: u64,
    pub bytes_received: u64,
    pub error_counter: u32,

    pub dir_status: DirStatus,
    pub flags: DirFlags,
    pub old_file_time: u32,
    pub end_character: Option<u8>,
    pub next_check_time: i64,
    pub last_retrieval: i64,

    pub dir_pos: usize,
    pub fsa_pos: Option<usize>,
}

impl DirEntry {
    pub fn new(dir_alias: impl Into<String>, dir_pos: usize) -> Self {
        Self {
            dir_alias: dir_alias.into(),
            url: String::new(),
            host_alias: String::new(),
            priority: '5',
            time_pattern: None,
            files_in_dir: 0,
            bytes_in_dir: 0,
            files_queued: 0,
            bytes_in_queue: 0,
            files_received: 0,
            bytes_received: 0,
            error_counter: 0,
            dir_status: DirStatus::Normal,
            flags: DirFlags::default(),
            old_file_time: 0,
            end_character: None,
            next_check_time: 0,
            last_retrieval: 0,
            dir_pos,
            fsa_pos: None,
        }
    }
}

pub const FRA_VERSION: u8 = 1;

pub struct Fra {
    handle: Handle,
    pub dirs: Vec<DirEntry>,
}

impl Fra {
    pub fn attach_or_create(fifo_dir: &Path, dirs: Vec<DirEntry>) -> Result<Self> {
        let handle = Handle::attach_or_create(fifo_dir, AreaKind::Fra, FRA_VERSION, dirs.len() as i32, || {
            serialize_records(&dirs)
        })?;
        Ok(Self { handle, dirs })
    }

    pub fn attach(fifo_dir: &Path) -> Result<Self> {
        let handle = Handle::attach(fifo_dir, AreaKind::Fra, FRA_VERSION)?;
        let count = handle.header().count.max(0) as usize;
        let dirs = deserialize_records(handle.records_region(), count)?;
        Ok(Self { handle, dirs })
    }

    pub fn check_stale(&self) -> bool {
        self.handle.check_stale()
    }

    pub fn position(&self, dir_alias: &str) -> Option<usize> {
        self.dirs.iter().position(|d| d.dir_alias == dir_alias)
    }
}

/// One `DirEntry` per line, JSON-encoded — same scheme as `fsa.rs`'s
/// record encoding, and for the same reason: this is the only place a
/// re-attaching process learns a directory's state.
fn serialize_records(dirs: &[DirEntry]) -> Vec<u8> {
    let mut out = String::new();
    for dir in dirs {
        out.push_str(&serde_json::to_string(dir).expect("DirEntry always serializes"));
        out.push('\n');
    }
    out.into_bytes()
}

fn deserialize_records(bytes: &[u8], count: usize) -> Result<Vec<DirEntry>> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| AfdError::Structural(format!("FRA record bytes not valid utf-8: {e}")))?;
    let dirs: Vec<DirEntry> = text
        .lines()
        .take(count)
        .map(|line| {
            serde_json::from_str(line)
                .map_err(|e| AfdError::Structural(format!("corrupt FRA record: {e}")))
        })
        .collect::<Result<_>>()?;
    if dirs.len() != count {
        return Err(AfdError::Structural(format!(
            "FRA header declares {count} dirs but only {} records decoded",
            dirs.len()
        )));
    }
    Ok(dirs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_dir_entry_is_normal_and_unflagged() {
        let entry = DirEntry::new("dir1", 0);
        assert_eq!(entry.dir_status, DirStatus::Normal);
        assert!(!entry.flags.stupid_mode);
    }

    #[test]
    fn attach_or_create_round_trips_through_attach() {
        let dir = tempfile::tempdir().unwrap();
        let mut incoming = DirEntry::new("incoming", 0);
        incoming.url = "ftp://h/incoming/".into();
        incoming.error_counter = 3;
        incoming.flags.stupid_mode = true;
        let archive = DirEntry::new("archive", 1);
        let fra = Fra::attach_or_create(dir.path(), vec![incoming, archive]).unwrap();
        assert_eq!(fra.position("incoming"), Some(0));

        let reattached = Fra::attach(dir.path()).unwrap();
        assert_eq!(reattached.dirs.len(), 2);
        assert_eq!(reattached.dirs[0].dir_alias, "incoming");
        assert_eq!(reattached.dirs[0].url, "ftp://h/incoming/");
        assert_eq!(reattached.dirs[0].error_counter, 3);
        assert!(reattached.dirs[0].flags.stupid_mode);
        assert_eq!(reattached.dirs[1].dir_alias, "archive");
        assert_eq!(reattached.position("archive"), Some(1));
    }
}
