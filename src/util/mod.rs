//! Small shared utilities.

pub mod nul_iter;

pub use nul_iter::NulTerminated;

/// Monotonic seconds-since-epoch used for `creation_time`/`last_retry_time`
/// style fields. Split out so call sites read like the original's
/// `time(NULL)` without sprinkling `SystemTime` plumbing everywhere.
pub fn now_epoch() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system clock before epoch")
        .as_secs() as i64
}
