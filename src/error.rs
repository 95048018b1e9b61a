//! Error taxonomy for the AFD core.
//!
//! Mirrors the classification in the design doc: transient network/local
//! errors are recoverable by the caller, structural corruption drops the
//! offending entry, programmer invariants are clamped, and fatal errors
//! terminate the process so the supervisor can restart it.

use std::path::PathBuf;

use thiserror::Error;

/// Errors produced by the shared-area, catalog, queue and supervisor layers.
#[derive(Debug, Error)]
pub enum AfdError {
    /// A byte-range lock is already held by another process/caller.
    #[error("region already locked: {0}")]
    AlreadyLocked(String),

    /// `fcntl`/`mmap`/`open` failed with a system error that is not simple
    /// contention — the caller's current operation cannot continue, but
    /// the area itself is not condemned.
    #[error("transient I/O failure in {context}: {source}")]
    Transient {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// The mapped area's version byte does not match what this binary was
    /// compiled against.
    #[error("incorrect schema version for {area}: found {found}, expected {expected}")]
    IncorrectVersion {
        area: String,
        found: u8,
        expected: u8,
    },

    /// The area's ID file or mapping could not be resolved at all.
    #[error("area unavailable: {0}")]
    AreaUnavailable(String),

    /// Consistency failure: a job catalog/queue/message-file reference
    /// could not be resolved. The offending entry must be dropped, never
    /// fabricated.
    #[error("structural corruption: {0}")]
    Structural(String),

    /// A path did not exist or could not be created where the supervisor's
    /// startup contract requires it.
    #[error("required path missing or unusable: {0}")]
    PathUnavailable(PathBuf),

    /// Unrecoverable: the caller should exit non-zero so a supervising
    /// process can restart it.
    #[error("fatal: {0}")]
    Fatal(String),
}

impl AfdError {
    pub fn transient(context: impl Into<String>, source: std::io::Error) -> Self {
        AfdError::Transient {
            context: context.into(),
            source,
        }
    }

    /// Whether this error should be treated as fatal to the current process
    /// (per the propagation policy in the error-handling design).
    pub fn is_fatal(&self) -> bool {
        matches!(self, AfdError::Fatal(_) | AfdError::PathUnavailable(_))
    }
}

pub type Result<T> = std::result::Result<T, AfdError>;
