//! Fixed-order child process table and restart policy.
//!
//! Ported from `original_source/init_afd/init_afd.c`'s fork sequence and
//! `original_source/init_afd/zombie_check.c`'s exit-code dispatch.

use std::process::ExitStatus;

/// One process-class slot in the AfdActive PID table, in the fixed order
/// the supervisor forks them (§4.6 step 8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessSlot {
    SystemLog,
    Amg,
    Fd,
    ArchiveWatch,
    Statistics,
}

impl ProcessSlot {
    pub fn index(self) -> usize {
        match self {
            ProcessSlot::SystemLog => 0,
            ProcessSlot::Amg => 1,
            ProcessSlot::Fd => 2,
            ProcessSlot::ArchiveWatch => 3,
            ProcessSlot::Statistics => 4,
        }
    }

    pub fn all() -> [ProcessSlot; 5] {
        [
            ProcessSlot::SystemLog,
            ProcessSlot::Amg,
            ProcessSlot::Fd,
            ProcessSlot::ArchiveWatch,
            ProcessSlot::Statistics,
        ]
    }

    /// Children the supervisor always restarts on abnormal exit,
    /// regardless of `RestartPolicy::OnAbnormal`'s general case (§4.6
    /// restart policy: "log, archive-watch, FD, statistics, and protocol
    /// logger children are always restarted").
    pub fn always_restarts(self) -> bool {
        !matches!(self, ProcessSlot::Amg)
    }
}

/// What the supervisor does in response to a child's exit, per §4.6's
/// restart policy / §7's "workers ... exit with a code that the
/// supervisor's zombie-check maps to one of {normal-stop, user-stop,
/// restart-on-HUP, restart-on-memory-loss, restart-on-abnormal,
/// leave-off}".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartDecision {
    Stopped,
    LeftOff,
    RestartImmediately,
    RestartAfterCoreHandling,
}

/// Classify a child's exit per the fixed exit-code table.
pub fn classify_exit(slot: ProcessSlot, status: &ExitStatus) -> RestartDecision {
    use std::os::unix::process::ExitStatusExt;

    if let Some(code) = status.code() {
        return match code {
            0 => RestartDecision::Stopped,
            2 | 3 => RestartDecision::RestartImmediately,
            1 => RestartDecision::LeftOff,
            _ => {
                if slot.always_restarts() {
                    RestartDecision::RestartImmediately
                } else {
                    RestartDecision::LeftOff
                }
            }
        };
    }

    if status.signal().is_some() {
        return RestartDecision::RestartAfterCoreHandling;
    }

    RestartDecision::LeftOff
}

/// An entry in the supervisor's in-process child table. Real `fork` +
/// `execlp` of protocol drivers is out of scope (§9); each "child" here is
/// an in-process component task, and `handle` is its `JoinHandle`.
pub struct ChildSpec<H> {
    pub slot: ProcessSlot,
    pub handle: Option<H>,
    pub pid: u32,
    pub restarts: u32,
}

impl<H> ChildSpec<H> {
    pub fn new(slot: ProcessSlot, handle: H, pid: u32) -> Self {
        Self {
            slot,
            handle: Some(handle),
            pid,
            restarts: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::process::ExitStatusExt;

    fn status_from_code(code: i32) -> ExitStatus {
        ExitStatus::from_raw(code << 8)
    }

    #[test]
    fn exit_zero_is_stopped() {
        assert_eq!(
            classify_exit(ProcessSlot::Fd, &status_from_code(0)),
            RestartDecision::Stopped
        );
    }

    #[test]
    fn exit_one_is_user_stop_left_off() {
        assert_eq!(
            classify_exit(ProcessSlot::Fd, &status_from_code(1)),
            RestartDecision::LeftOff
        );
    }

    #[test]
    fn exit_two_and_three_restart_immediately() {
        assert_eq!(
            classify_exit(ProcessSlot::Fd, &status_from_code(2)),
            RestartDecision::RestartImmediately
        );
        assert_eq!(
            classify_exit(ProcessSlot::Fd, &status_from_code(3)),
            RestartDecision::RestartImmediately
        );
    }

    #[test]
    fn signal_exit_triggers_core_handling_path() {
        let status = ExitStatus::from_raw(libc::SIGSEGV);
        assert_eq!(
            classify_exit(ProcessSlot::ArchiveWatch, &status),
            RestartDecision::RestartAfterCoreHandling
        );
    }

    #[test]
    fn always_restart_classes_restart_on_other_abnormal_codes() {
        assert_eq!(
            classify_exit(ProcessSlot::Fd, &status_from_code(17)),
            RestartDecision::RestartImmediately
        );
        assert_eq!(
            classify_exit(ProcessSlot::Amg, &status_from_code(17)),
            RestartDecision::LeftOff
        );
    }
}
