//! Attach/detach to a versioned, memory-mapped status area.
//!
//! Grounded on `original_source/common/fra_attach.c`: resolve the area's
//! numeric id from a small ID file (read under a lock so a concurrent
//! writer flipping it mid-read can't be observed half-updated), then
//! `mmap` the `<name>.<id>` backing file: `fstat` for size, then
//! `PROT_READ | PROT_WRITE`, `MAP_SHARED`.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::{Path, PathBuf};

use crate::error::{AfdError, Result};
use crate::shared::header::{AreaHeader, HEADER_LEN, STALE};
use crate::shared::lock::{lock_region, rlock_region};

/// Which shared status area a `Handle` resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AreaKind {
    Fsa,
    Fra,
    Status,
}

impl AreaKind {
    fn id_file_name(self) -> &'static str {
        match self {
            AreaKind::Fsa => "fsa.id",
            AreaKind::Fra => "fra.id",
            AreaKind::Status => "afd_status.id",
        }
    }

    fn stat_file_prefix(self) -> &'static str {
        match self {
            AreaKind::Fsa => "fsa_status",
            AreaKind::Fra => "fra_status",
            AreaKind::Status => "afd.status",
        }
    }
}

struct Mapping {
    addr: *mut u8,
    size: usize,
}

// Safety: a Mapping is only ever reached through a Handle that owns it
// exclusively; nothing else retains the pointer.
unsafe impl Send for Mapping {}

impl Drop for Mapping {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.addr as *mut libc::c_void, self.size);
        }
    }
}

/// A live attachment to one generation of a shared status area.
pub struct Handle {
    kind: AreaKind,
    fifo_dir: PathBuf,
    id: i32,
    file: File,
    mapping: Mapping,
    version: u8,
}

fn read_id_locked(id_path: &Path) -> std::io::Result<i32> {
    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .open(id_path)?;
    let fd = file.as_raw_fd();

    // Shared-to-the-reader region lock over the id value itself.
    let guard = rlock_region(fd, 0).map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;

    let mut buf = [0u8; 4];
    file.seek(SeekFrom::Start(0))?;
    let n = file.read(&mut buf)?;
    drop(guard);

    if n < 4 {
        // Freshly created id file: generation 0.
        file.seek(SeekFrom::Start(0))?;
        file.write_all(&0i32.to_ne_bytes())?;
        file.flush()?;
        return Ok(0);
    }
    Ok(i32::from_ne_bytes(buf))
}

fn write_id_locked(id_path: &Path, new_id: i32) -> std::io::Result<()> {
    let mut file = OpenOptions::new().write(true).create(true).open(id_path)?;
    let fd = file.as_raw_fd();
    let _guard = lock_region(fd, 0);
    file.seek(SeekFrom::Start(0))?;
    file.write_all(&new_id.to_ne_bytes())?;
    file.flush()
}

fn stat_file_path(fifo_dir: &Path, kind: AreaKind, id: i32) -> PathBuf {
    fifo_dir.join(format!("{}.{}", kind.stat_file_prefix(), id))
}

impl Handle {
    /// Attach to the current generation of `kind`. If the area does not
    /// exist yet, `initial` is called once to produce the record payload
    /// (header-less — the header is synthesized here) that seeds the new
    /// generation.
    pub fn attach_or_create(
        fifo_dir: &Path,
        kind: AreaKind,
        version: u8,
        record_count: i32,
        initial: impl FnOnce() -> Vec<u8>,
    ) -> Result<Self> {
        std::fs::create_dir_all(fifo_dir)
            .map_err(|e| AfdError::transient(format!("create_dir_all {fifo_dir:?}"), e))?;

        let id_path = fifo_dir.join(kind.id_file_name());
        let id = read_id_locked(&id_path)
            .map_err(|e| AfdError::transient(format!("resolve id for {kind:?}"), e))?;

        let stat_path = stat_file_path(fifo_dir, kind, id);
        if !stat_path.exists() {
            let payload = initial();
            let mut bytes = Vec::with_capacity(HEADER_LEN + payload.len());
            bytes.extend_from_slice(&AreaHeader::new(record_count, version).to_bytes());
            bytes.extend_from_slice(&payload);
            std::fs::write(&stat_path, &bytes)
                .map_err(|e| AfdError::transient(format!("create {stat_path:?}"), e))?;
        }

        Self::open_existing(fifo_dir, kind, id, version)
    }

    /// Attach to whatever generation the ID file currently names. Fails
    /// with `AreaUnavailable` if nothing has created it yet.
    pub fn attach(fifo_dir: &Path, kind: AreaKind, version: u8) -> Result<Self> {
        let id_path = fifo_dir.join(kind.id_file_name());
        if !id_path.exists() {
            return Err(AfdError::AreaUnavailable(format!(
                "{:?}: no id file at {:?}",
                kind, id_path
            )));
        }
        let id = read_id_locked(&id_path)
            .map_err(|e| AfdError::transient(format!("resolve id for {kind:?}"), e))?;
        Self::open_existing(fifo_dir, kind, id, version)
    }

    fn open_existing(fifo_dir: &Path, kind: AreaKind, id: i32, version: u8) -> Result<Self> {
        let stat_path = stat_file_path(fifo_dir, kind, id);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&stat_path)
            .map_err(|e| AfdError::AreaUnavailable(format!("{stat_path:?}: {e}")))?;

        let size = file
            .metadata()
            .map_err(|e| AfdError::transient(format!("fstat {stat_path:?}"), e))?
            .len() as usize;

        if size < HEADER_LEN {
            return Err(AfdError::AreaUnavailable(format!(
                "{stat_path:?} too small to hold area header"
            )));
        }

        let fd = file.as_raw_fd();
        let addr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd,
                0,
            )
        };
        if addr == libc::MAP_FAILED {
            return Err(AfdError::transient(
                format!("mmap {stat_path:?}"),
                std::io::Error::last_os_error(),
            ));
        }

        let handle = Self {
            kind,
            fifo_dir: fifo_dir.to_path_buf(),
            id,
            file,
            mapping: Mapping {
                addr: addr as *mut u8,
                size,
            },
            version,
        };

        let header = handle.header();
        if header.version != version {
            return Err(AfdError::IncorrectVersion {
                area: format!("{kind:?}"),
                found: header.version,
                expected: version,
            });
        }

        Ok(handle)
    }

    pub fn kind(&self) -> AreaKind {
        self.kind
    }

    pub fn fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }

    pub fn header(&self) -> AreaHeader {
        AreaHeader::from_bytes(self.as_bytes()).expect("mapping shorter than header")
    }

    pub fn as_bytes(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.mapping.addr, self.mapping.size) }
    }

    /// # Safety
    /// The caller must hold the appropriate field lock before writing
    /// through this slice, per the concurrency contract in §4.1/§5.
    pub unsafe fn as_bytes_mut(&self) -> &mut [u8] {
        std::slice::from_raw_parts_mut(self.mapping.addr, self.mapping.size)
    }

    pub fn records_region(&self) -> &[u8] {
        &self.as_bytes()[HEADER_LEN..]
    }

    /// # Safety
    /// See `as_bytes_mut`.
    pub unsafe fn records_region_mut(&self) -> &mut [u8] {
        &mut self.as_bytes_mut()[HEADER_LEN..]
    }

    /// Cheap "is this mapping stale" probe. Callers must call this before
    /// any long-running loop iteration that touches the area (§4.1).
    pub fn check_stale(&self) -> bool {
        AreaHeader::peek_count(self.as_bytes()) == Some(STALE)
    }

    /// Explicit detach; equivalent to dropping the handle, but named to
    /// match the operation in the design (`detach(Handle)`).
    pub fn detach(self) {
        drop(self)
    }

    /// Publish a new generation and mark this one STALE so readers detach
    /// and re-resolve through the ID file (§3 "Lifecycles").
    pub fn publish_new_generation(
        fifo_dir: &Path,
        kind: AreaKind,
        version: u8,
        record_count: i32,
        payload: Vec<u8>,
        old: Option<&Handle>,
    ) -> Result<Self> {
        let id_path = fifo_dir.join(kind.id_file_name());
        let current_id = read_id_locked(&id_path)
            .map_err(|e| AfdError::transient(format!("resolve id for {kind:?}"), e))?;
        let new_id = current_id.wrapping_add(1);

        let stat_path = stat_file_path(fifo_dir, kind, new_id);
        let mut bytes = Vec::with_capacity(HEADER_LEN + payload.len());
        bytes.extend_from_slice(&AreaHeader::new(record_count, version).to_bytes());
        bytes.extend_from_slice(&payload);
        std::fs::write(&stat_path, &bytes)
            .map_err(|e| AfdError::transient(format!("create {stat_path:?}"), e))?;

        write_id_locked(&id_path, new_id)
            .map_err(|e| AfdError::transient(format!("flip id file for {kind:?}"), e))?;

        if let Some(old) = old {
            old.mark_stale();
        }

        Self::open_existing(fifo_dir, kind, new_id, version)
    }

    /// Write the STALE sentinel into this mapping's count field.
    pub fn mark_stale(&self) {
        let bytes = unsafe { self.as_bytes_mut() };
        bytes[0..4].copy_from_slice(&STALE.to_ne_bytes());
    }

    pub fn id(&self) -> i32 {
        self.id
    }
}
