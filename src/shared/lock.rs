//! fcntl byte-range advisory locks.
//!
//! Ported from `original_source/common/lock_region.c` and
//! `rlock_region.c`, using the same `libc::fcntl`/`libc::flock` byte-range
//! locking pattern as a file-backed `lock()`/`LockGuard` pair. Each
//! lockable field is a single byte at a
//! known offset; writers take `F_WRLCK` non-blocking (`lock_region`,
//! contending writers get `AlreadyLocked` back instead of stalling),
//! readers take `F_RDLCK` blocking (`rlock_region`), and `lock_proc`
//! reserves a whole-process-class slot the same way.

use std::os::unix::io::RawFd;

use crate::error::{AfdError, Result};

/// Acquire a non-blocking exclusive lock on the single byte at `offset`.
/// Returns `Ok(None)` immediately if another holder already has it
/// (`EACCES`/`EAGAIN`), matching `lock_region()`'s `IS_LOCKED` return.
/// Any other `fcntl` failure is fatal, matching the original's
/// `exit(LOCK_REGION_ERROR)`.
pub fn lock_region(fd: RawFd, offset: i64) -> Result<Option<FieldLockGuard>> {
    let flock = libc::flock {
        l_type: libc::F_WRLCK as i16,
        l_whence: libc::SEEK_SET as i16,
        l_start: offset,
        l_len: 1,
        l_pid: 0,
    };

    let result = unsafe { libc::fcntl(fd, libc::F_SETLK, &flock) };
    if result == -1 {
        let err = std::io::Error::last_os_error();
        match err.raw_os_error() {
            Some(libc::EACCES) | Some(libc::EAGAIN) => return Ok(None),
            _ => {
                return Err(AfdError::Fatal(format!(
                    "fcntl(F_SETLK) error at offset {offset}: {err}"
                )))
            }
        }
    }

    Ok(Some(FieldLockGuard {
        fd,
        offset,
        exclusive: true,
    }))
}

/// Acquire a blocking shared (read) lock on the single byte at `offset`.
/// Ported from `rlock_region()`: blocks until granted, any failure is
/// fatal.
pub fn rlock_region(fd: RawFd, offset: i64) -> Result<FieldLockGuard> {
    let flock = libc::flock {
        l_type: libc::F_RDLCK as i16,
        l_whence: libc::SEEK_SET as i16,
        l_start: offset,
        l_len: 1,
        l_pid: 0,
    };

    let result = unsafe { libc::fcntl(fd, libc::F_SETLKW, &flock) };
    if result == -1 {
        let err = std::io::Error::last_os_error();
        return Err(AfdError::Fatal(format!(
            "fcntl(F_SETLKW) error at offset {offset}: {err}"
        )));
    }

    Ok(FieldLockGuard {
        fd,
        offset,
        exclusive: false,
    })
}

/// RAII guard releasing the byte-range lock on drop.
pub struct FieldLockGuard {
    fd: RawFd,
    offset: i64,
    exclusive: bool,
}

impl Drop for FieldLockGuard {
    fn drop(&mut self) {
        let flock = libc::flock {
            l_type: libc::F_UNLCK as i16,
            l_whence: libc::SEEK_SET as i16,
            l_start: self.offset,
            l_len: 1,
            l_pid: 0,
        };
        unsafe {
            libc::fcntl(self.fd, libc::F_SETLK, &flock);
        }
        // Ignore errors on unlock, same as the teacher's LockGuard: there's
        // nothing a Drop impl can usefully do about it.
    }
}

impl FieldLockGuard {
    pub fn is_exclusive(&self) -> bool {
        self.exclusive
    }
}

/// Typed handle for a lockable field at a compile-time-known offset,
/// preventing a `lock_region` call against an offset that wasn't derived
/// from the record layout.
pub struct FieldLock<T> {
    offset: i64,
    _marker: std::marker::PhantomData<T>,
}

impl<T> FieldLock<T> {
    pub const fn at(offset: i64) -> Self {
        Self {
            offset,
            _marker: std::marker::PhantomData,
        }
    }

    pub fn offset(&self) -> i64 {
        self.offset
    }

    pub fn try_write(&self, fd: RawFd) -> Result<Option<FieldLockGuard>> {
        lock_region(fd, self.offset)
    }

    pub fn read(&self, fd: RawFd) -> Result<FieldLockGuard> {
        rlock_region(fd, self.offset)
    }
}

/// One process-class slot in the shared lock-proc file (editor, AMG, FD,
/// archive-watch, statistics — §4.1's "only one of each may run").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessClass {
    Editor,
    Amg,
    Fd,
    ArchiveWatch,
    Statistics,
}

impl ProcessClass {
    fn slot(self) -> i64 {
        match self {
            ProcessClass::Editor => 0,
            ProcessClass::Amg => 1,
            ProcessClass::Fd => 2,
            ProcessClass::ArchiveWatch => 3,
            ProcessClass::Statistics => 4,
        }
    }
}

/// Acquire (or, with `test_only`, merely probe) the single-instance lock
/// for a process class. Ported from `lock_proc()`: a write lock at the
/// class's fixed offset in the shared lock file. Returns `Some(holder)`
/// with an opaque process identifier when the class is already locked by
/// someone else.
pub fn lock_proc(fd: RawFd, class: ProcessClass, test_only: bool) -> Result<LockProcOutcome> {
    let offset = class.slot();
    if test_only {
        let mut probe = libc::flock {
            l_type: libc::F_WRLCK as i16,
            l_whence: libc::SEEK_SET as i16,
            l_start: offset,
            l_len: 1,
            l_pid: 0,
        };
        let result = unsafe { libc::fcntl(fd, libc::F_GETLK, &mut probe) };
        if result == -1 {
            return Err(AfdError::Fatal(format!(
                "fcntl(F_GETLK) error for process class {class:?}: {}",
                std::io::Error::last_os_error()
            )));
        }
        if probe.l_type == libc::F_UNLCK as i16 {
            return Ok(LockProcOutcome::Acquired(None));
        }
        return Ok(LockProcOutcome::HeldBy(probe.l_pid as u32));
    }

    match lock_region(fd, offset)? {
        Some(guard) => Ok(LockProcOutcome::Acquired(Some(guard))),
        None => Ok(LockProcOutcome::HeldBy(0)),
    }
}

pub enum LockProcOutcome {
    Acquired(Option<FieldLockGuard>),
    HeldBy(u32),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::os::unix::io::AsRawFd;

    fn tmp_fd() -> (tempfile::NamedTempFile, RawFd) {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(&[0u8; 64]).unwrap();
        let fd = f.as_raw_fd();
        (f, fd)
    }

    #[test]
    fn write_lock_excludes_second_writer_same_offset() {
        let (_f, fd) = tmp_fd();
        let guard = lock_region(fd, 8).unwrap();
        assert!(guard.is_some());

        // A second fd onto the same file contends for the same byte.
        let fd2 = unsafe { libc::dup(fd) };
        let second = lock_region(fd2, 8).unwrap();
        assert!(second.is_none(), "expected contention on same byte");
        unsafe { libc::close(fd2) };
    }

    #[test]
    fn unrelated_offsets_do_not_contend() {
        let (_f, fd) = tmp_fd();
        let _g1 = lock_region(fd, 8).unwrap().unwrap();
        let fd2 = unsafe { libc::dup(fd) };
        let g2 = lock_region(fd2, 16).unwrap();
        assert!(g2.is_some());
        unsafe { libc::close(fd2) };
    }

    #[test]
    fn guard_drop_releases_lock() {
        let (_f, fd) = tmp_fd();
        {
            let _g = lock_region(fd, 8).unwrap().unwrap();
        }
        let fd2 = unsafe { libc::dup(fd) };
        let g2 = lock_region(fd2, 8).unwrap();
        assert!(g2.is_some(), "lock should have been released on drop");
        unsafe { libc::close(fd2) };
    }
}
