//! Global link-count back-pressure on the outgoing-file directory.
//!
//! Ported from the AMG stop/start thresholds in `original_source/
//! init_afd/init_afd.c`'s tick loop (§4.4 "Global link-count
//! back-pressure").

use crate::config::RuntimeConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmgSupervisionAction {
    Stop,
    Start,
    NoChange,
}

/// Current AMG supervision state, needed because the stop/start decision
/// is edge-triggered (§8 B3): crossing the stop threshold emits STOP only
/// once, crossing the start threshold emits START only once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmgRunState {
    Running,
    Stopped,
}

/// Evaluate the outgoing-directory `st_nlink` count against the
/// configured thresholds and decide whether the message-generator needs a
/// STOP or START command this tick.
pub fn evaluate(cfg: &RuntimeConfig, link_count: i64, current: AmgRunState) -> AmgSupervisionAction {
    let stop_threshold = cfg.link_max - cfg.stop_amg_threshold - cfg.dirs_in_file_dir;
    let start_threshold = cfg.link_max - cfg.start_amg_threshold;

    match current {
        AmgRunState::Running if link_count > stop_threshold => AmgSupervisionAction::Stop,
        AmgRunState::Stopped if link_count < start_threshold => AmgSupervisionAction::Start,
        _ => AmgSupervisionAction::NoChange,
    }
}

/// §4.5 step 3: per-host queue-saturation back-pressure. `danger_no_of_files`
/// is the host-specific threshold (normally `cfg.danger_no_of_jobs`, but a
/// host can override it via its own configuration in the full system —
/// out of scope here, so callers pass the resolved value).
pub fn danger_pause_should_set(
    jobs_in_queue: u64,
    link_max: i64,
    total_file_counter: i64,
    danger_no_of_files: i64,
) -> bool {
    jobs_in_queue as i64 >= link_max / 2 && total_file_counter > danger_no_of_files
}

pub fn danger_pause_should_clear(
    jobs_in_queue: u64,
    link_max: i64,
    total_file_counter: i64,
    danger_no_of_files: i64,
) -> bool {
    (jobs_in_queue as i64) < link_max / 2 && total_file_counter <= danger_no_of_files / 2
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> RuntimeConfig {
        RuntimeConfig::default()
    }

    #[test]
    fn stop_threshold_boundary_triggers_stop_exactly_at_boundary() {
        let cfg = cfg();
        let boundary = cfg.link_max - cfg.stop_amg_threshold - cfg.dirs_in_file_dir + 1;
        assert_eq!(
            evaluate(&cfg, boundary, AmgRunState::Running),
            AmgSupervisionAction::Stop
        );
    }

    #[test]
    fn start_threshold_boundary_remains_stopped_one_below() {
        let cfg = cfg();
        let one_below = cfg.link_max - cfg.start_amg_threshold - 1;
        assert_eq!(
            evaluate(&cfg, one_below, AmgRunState::Stopped),
            AmgSupervisionAction::NoChange
        );
    }

    #[test]
    fn start_threshold_boundary_restarts_at_threshold() {
        let cfg = cfg();
        let at_threshold = cfg.link_max - cfg.start_amg_threshold;
        assert_eq!(
            evaluate(&cfg, at_threshold - 1, AmgRunState::Stopped),
            AmgSupervisionAction::Start
        );
    }

    #[test]
    fn danger_pause_sets_and_clears_symmetrically() {
        assert!(danger_pause_should_set(600, 1000, 600, 500));
        assert!(!danger_pause_should_set(400, 1000, 600, 500));
        assert!(danger_pause_should_clear(100, 1000, 100, 500));
    }
}
