//! C5: the error/threshold state machine run over every HostEntry on
//! every supervisor tick.
//!
//! Ported from `original_source/init_afd/init_afd.c`'s per-tick FSA scan.
//! That loop tests `fsa[i].error_counter >= (2 * fsa[i].max_errors)`
//! before raising AUTO_PAUSE_QUEUE_STAT; this module instead follows
//! spec.md's literal, testable invariant `error_counter >= max_errors`
//! (§3 invariant list, §8 property 2, and scenario S2's exact numbers).
//! The `2x` factor in the original reads as a local tuning artifact
//! (a second, softer warning threshold layered on top of the hard one)
//! rather than part of the portable contract, so it is not carried
//! forward — see DESIGN.md's Open Question entry for this module.

use crate::shared::fsa::{HostEntry, HostStatus};
use crate::supervisor::linkcount::{danger_pause_should_clear, danger_pause_should_set};
use crate::threshold::events::ThresholdEvent;

pub trait ErrorActionHook {
    fn error_action(&mut self, alias: &str, action: &str);
}

/// No-op hook for tests and for configurations without an external
/// error-action script configured.
pub struct NullHook;
impl ErrorActionHook for NullHook {
    fn error_action(&mut self, _alias: &str, _action: &str) {}
}

/// Run the five §4.5 steps for a single host and return whatever events
/// fired. Idempotent: a tick that observes no change returns an empty
/// vector.
pub fn tick_host(
    entry: &mut HostEntry,
    danger_no_of_files: i64,
    link_max: i64,
    hook: &mut impl ErrorActionHook,
) -> Vec<ThresholdEvent> {
    let mut events = Vec::new();

    // Step 1 & 2: AUTO_PAUSE_QUEUE crossing.
    let auto_paused = entry.host_status.contains(HostStatus::AUTO_PAUSE_QUEUE);
    if entry.error_counter >= entry.max_errors && !auto_paused {
        entry.host_status.insert(HostStatus::AUTO_PAUSE_QUEUE);
        events.push(ThresholdEvent::StopQueue {
            host_alias: entry.alias.clone(),
            error_counter: entry.error_counter,
            max_errors: entry.max_errors,
        });
        hook.error_action(&entry.alias, "start");
    } else if entry.error_counter < entry.max_errors && auto_paused {
        entry.host_status.remove(HostStatus::AUTO_PAUSE_QUEUE);
        if entry.last_connection > entry.first_error_time {
            entry.host_status.remove(HostStatus::AUTO_PAUSE_QUEUE_LOCK);
        }
        events.push(ThresholdEvent::StartQueue {
            host_alias: entry.alias.clone(),
            error_counter: entry.error_counter,
            max_errors: entry.max_errors,
        });
        hook.error_action(&entry.alias, "stop");
    }

    // Step 3: DANGER_PAUSE_QUEUE on queue saturation.
    let danger_set = entry.host_status.contains(HostStatus::DANGER_PAUSE_QUEUE);
    let should_set = danger_pause_should_set(entry.jobs_queued as u64, link_max, entry.total_file_counter, danger_no_of_files);
    let should_clear = danger_pause_should_clear(entry.jobs_queued as u64, link_max, entry.total_file_counter, danger_no_of_files);
    if should_set && !danger_set {
        entry.host_status.insert(HostStatus::DANGER_PAUSE_QUEUE);
        events.push(ThresholdEvent::DangerPauseSet {
            host_alias: entry.alias.clone(),
        });
    } else if !should_set && danger_set && should_clear {
        entry.host_status.remove(HostStatus::DANGER_PAUSE_QUEUE);
        events.push(ThresholdEvent::DangerPauseCleared {
            host_alias: entry.alias.clone(),
        });
    }

    // Step 4: clear a stale AUTO_PAUSE_QUEUE_LOCK once the backlog is gone.
    if entry.total_file_counter == 0 && entry.host_status.contains(HostStatus::AUTO_PAUSE_QUEUE_LOCK) {
        entry.host_status.remove(HostStatus::AUTO_PAUSE_QUEUE_LOCK);
        events.push(ThresholdEvent::AutoPauseLockCleared {
            host_alias: entry.alias.clone(),
        });
    }

    // Step 5 (sign selection) is left to the logging call site: it just
    // needs to know `entry.host_status.is_offline()`.

    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::fsa::HostEntry;

    #[test]
    fn crossing_max_errors_sets_auto_pause_and_emits_stop_event() {
        let mut entry = HostEntry::new("host1", 3);
        entry.max_errors = 2;
        entry.error_counter = 2;
        let mut hook = NullHook;
        let events = tick_host(&mut entry, 500, 1000, &mut hook);
        assert!(entry.host_status.contains(HostStatus::AUTO_PAUSE_QUEUE));
        assert_eq!(
            events[0],
            ThresholdEvent::StopQueue {
                host_alias: "host1".into(),
                error_counter: 2,
                max_errors: 2
            }
        );
    }

    #[test]
    fn dropping_below_max_errors_clears_auto_pause_and_emits_start_event() {
        let mut entry = HostEntry::new("host1", 3);
        entry.max_errors = 2;
        entry.error_counter = 2;
        entry.host_status.insert(HostStatus::AUTO_PAUSE_QUEUE);
        entry.last_connection = 100;
        entry.first_error_time = 10;
        entry.error_counter = 0;
        let mut hook = NullHook;
        let events = tick_host(&mut entry, 500, 1000, &mut hook);
        assert!(!entry.host_status.contains(HostStatus::AUTO_PAUSE_QUEUE));
        assert!(matches!(events[0], ThresholdEvent::StartQueue { .. }));
    }

    #[test]
    fn idempotent_tick_with_no_state_change_emits_nothing() {
        let mut entry = HostEntry::new("host1", 3);
        entry.max_errors = 5;
        entry.error_counter = 0;
        let mut hook = NullHook;
        let events = tick_host(&mut entry, 500, 1000, &mut hook);
        assert!(events.is_empty());
    }

    #[test]
    fn danger_pause_sets_when_queue_saturated_and_clears_below_half_thresholds() {
        let mut entry = HostEntry::new("host1", 3);
        entry.jobs_queued = 600;
        entry.total_file_counter = 600;
        let mut hook = NullHook;
        let events = tick_host(&mut entry, 500, 1000, &mut hook);
        assert!(entry.host_status.contains(HostStatus::DANGER_PAUSE_QUEUE));
        assert!(matches!(events[0], ThresholdEvent::DangerPauseSet { .. }));

        entry.jobs_queued = 10;
        entry.total_file_counter = 10;
        let events = tick_host(&mut entry, 500, 1000, &mut hook);
        assert!(!entry.host_status.contains(HostStatus::DANGER_PAUSE_QUEUE));
        assert!(matches!(events[0], ThresholdEvent::DangerPauseCleared { .. }));
    }

    #[test]
    fn stale_auto_pause_lock_clears_once_backlog_drains() {
        let mut entry = HostEntry::new("host1", 3);
        entry.total_file_counter = 0;
        entry.host_status.insert(HostStatus::AUTO_PAUSE_QUEUE_LOCK);
        let mut hook = NullHook;
        let events = tick_host(&mut entry, 500, 1000, &mut hook);
        assert!(!entry.host_status.contains(HostStatus::AUTO_PAUSE_QUEUE_LOCK));
        assert!(matches!(events[0], ThresholdEvent::AutoPauseLockCleared { .. }));
    }
}
