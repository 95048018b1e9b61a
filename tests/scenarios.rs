//! Integration tests for the six worked scenarios.

use afd_core::catalog::JobCatalog;
use afd_core::error::AfdError;
use afd_core::message::create_message;
use afd_core::queue::{MockDriver, WorkerPool};
use afd_core::shared::fsa::{HostEntry, HostStatus, TogglePosition};
use afd_core::supervisor::{Supervisor, SupervisorCommand};
use afd_core::threshold::{tick_host, NullHook, ThresholdEvent};
use afd_core::RuntimeConfig;

fn io_err(msg: &str) -> AfdError {
    AfdError::transient(msg, std::io::Error::other(msg))
}

struct Fixture {
    pool: WorkerPool,
    _dir: tempfile::TempDir,
}

fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let messages_dir = dir.path().join("messages");
    let files_dir = dir.path().join("files");
    std::fs::create_dir_all(&messages_dir).unwrap();
    std::fs::create_dir_all(&files_dir).unwrap();

    let catalog = JobCatalog::new();
    let dir_pos = catalog.intern_dir("/incoming/a");
    let job_id = catalog.intern_job(
        dir_pos,
        vec!["a.txt".into()],
        vec![],
        String::new(),
        "ftp://u:p@h/d/".into(),
        "host1".into(),
        '5',
    );
    create_message(&messages_dir, job_id, "ftp://u:p@h/d/", None).unwrap();

    let mut hosts = vec![HostEntry::new("host1", 3)];
    hosts[0].real_hostname = ["h1.example".into(), "h2.example".into()];
    let mut pool = WorkerPool::new(hosts, catalog, messages_dir, files_dir);
    pool.queue.push('5', 1_700_000_000, format!("5_1700000000_00001_{job_id:x}"), job_id, 0);

    Fixture { pool, _dir: dir }
}

/// S1: successful dispatch drains the queue and updates FSA counters.
#[test]
fn s1_successful_dispatch_updates_counters_and_drains_queue() {
    let mut fx = fixture();
    let mut driver = MockDriver::always_succeeds(1, 10);

    let dispatched = fx.pool.dispatch_once(&mut driver).unwrap();

    assert!(dispatched);
    assert_eq!(fx.pool.hosts[0].file_counter_done, 1);
    assert_eq!(fx.pool.hosts[0].connections, 1);
    assert!(fx.pool.queue.is_empty());
}

/// S2: two failures trip AUTO_PAUSE_QUEUE; a following success clears it.
#[test]
fn s2_error_threshold_trips_and_clears_auto_pause_queue() {
    let mut fx = fixture();
    fx.pool.hosts[0].max_errors = 2;

    let mut failing = MockDriver::new(vec![Err(io_err("connect refused")), Err(io_err("connect refused"))]);
    // Re-enqueue after each failed attempt — dispatch_once does not remove
    // a failed entry from the queue, so the second attempt targets the
    // same message (§4.4: failures stay queued for retry).
    assert!(fx.pool.dispatch_once(&mut failing).is_err());
    assert_eq!(fx.pool.hosts[0].error_counter, 1);
    assert!(fx.pool.dispatch_once(&mut failing).is_err());
    assert_eq!(fx.pool.hosts[0].error_counter, 2);

    let mut hook = NullHook;
    let events = tick_host(&mut fx.pool.hosts[0], 500, 1000, &mut hook);
    assert!(fx.pool.hosts[0].host_status.contains(HostStatus::AUTO_PAUSE_QUEUE));
    assert_eq!(
        events[0],
        ThresholdEvent::StopQueue {
            host_alias: "host1".into(),
            error_counter: 2,
            max_errors: 2,
        }
    );

    let mut succeeding = MockDriver::always_succeeds(1, 5);
    fx.pool.dispatch_once(&mut succeeding).unwrap();
    assert_eq!(fx.pool.hosts[0].error_counter, 0);

    let events = tick_host(&mut fx.pool.hosts[0], 500, 1000, &mut hook);
    assert!(!fx.pool.hosts[0].host_status.contains(HostStatus::AUTO_PAUSE_QUEUE));
    assert!(matches!(events[0], ThresholdEvent::StartQueue { .. }));
}

/// S3: a failed transfer with `auto_toggle` on flips to the secondary host.
#[test]
fn s3_auto_toggle_flips_to_secondary_host_on_failure() {
    let mut fx = fixture();
    fx.pool.hosts[0].auto_toggle = true;
    fx.pool.hosts[0].toggle_position = TogglePosition::HostOne;

    let mut failing = MockDriver::new(vec![Err(io_err("connection refused"))]);
    assert!(fx.pool.dispatch_once(&mut failing).is_err());

    assert_eq!(fx.pool.hosts[0].toggle_position, TogglePosition::HostTwo);
    assert_eq!(fx.pool.hosts[0].effective_hostname(), "h2.example");
}

/// S4: link-count back-pressure stops then restarts the message generator.
#[test]
fn s4_link_count_back_pressure_stops_and_restarts_amg() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = RuntimeConfig::default();
    cfg.work_dir = dir.path().to_path_buf();

    let mut supervisor = Supervisor::startup(cfg.clone(), vec![]).unwrap();

    let stop_point = cfg.link_max - cfg.stop_amg_threshold - cfg.dirs_in_file_dir + 1;
    supervisor.tick(stop_point).unwrap();
    assert_eq!(supervisor.amg_running(), afd_core::supervisor::AmgRunState::Stopped);

    let restart_point = cfg.link_max - cfg.start_amg_threshold - 1;
    supervisor.tick(restart_point).unwrap();
    assert_eq!(supervisor.amg_running(), afd_core::supervisor::AmgRunState::Running);
}

/// S5: a second supervisor against the same working directory backs off
/// once it observes the heartbeat advancing.
#[test]
fn s5_second_supervisor_detects_active_heartbeat_and_refuses_startup() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = RuntimeConfig::default();
    cfg.work_dir = dir.path().to_path_buf();

    let mut first = Supervisor::startup(cfg.clone(), vec![]).unwrap();
    first.tick(0).unwrap();

    let handle = std::thread::spawn(move || {
        for _ in 0..10 {
            first.tick(0).unwrap();
            std::thread::sleep(std::time::Duration::from_millis(50));
        }
    });

    let second = Supervisor::startup(cfg, vec![]);
    assert!(second.is_err());

    handle.join().unwrap();
}

/// S6: `DELETE_JOB` while FD is stopped removes the outgoing directory and
/// message file and decrements the host's counters by the exact amounts.
#[test]
fn s6_delete_job_while_fd_stopped_removes_files_and_decrements_counters() {
    let mut fx = fixture();
    fx.pool.hosts[0].total_file_counter = 5;
    fx.pool.hosts[0].total_file_size = 500;

    let msg_name = fx
        .pool
        .queue
        .iter_in_order()
        .next()
        .map(|e| e.msg_name.clone())
        .unwrap();
    let outgoing = fx.pool.outgoing_dir(&msg_name);
    std::fs::create_dir_all(&outgoing).unwrap();
    std::fs::write(outgoing.join("a.txt"), b"hello").unwrap();

    let handled = fx.pool.delete_job(&msg_name).unwrap();

    assert!(handled);
    assert!(fx.pool.queue.is_empty());
    assert!(!outgoing.exists());
    assert_eq!(fx.pool.hosts[0].total_file_counter, 4);
    assert_eq!(fx.pool.hosts[0].total_file_size, 495);
}

/// `DELETE_JOB` while FD is active defers to the caller rather than acting
/// locally (the other branch of the same contract S6 exercises).
#[test]
fn delete_job_while_fd_active_defers_to_caller() {
    let mut fx = fixture();
    fx.pool.fd_state = afd_core::queue::FdState::Active;

    let msg_name = fx
        .pool
        .queue
        .iter_in_order()
        .next()
        .map(|e| e.msg_name.clone())
        .unwrap();
    let handled = fx.pool.delete_job(&msg_name).unwrap();

    assert!(!handled);
    assert!(!fx.pool.queue.is_empty());
}

/// Shutdown flips every component's status to `Shutdown` and sets the
/// shared shutdown byte so the tick loop in `main.rs` can exit cleanly.
#[test]
fn shutdown_command_marks_components_and_flips_shutdown_byte() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = RuntimeConfig::default();
    cfg.work_dir = dir.path().to_path_buf();

    let mut supervisor = Supervisor::startup(cfg, vec![]).unwrap();
    supervisor.handle_command(SupervisorCommand::Shutdown).unwrap();
    supervisor.finish_shutdown().unwrap();
}
