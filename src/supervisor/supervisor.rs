//! The supervisor (C6): single writer of AfdActive, owner of the
//! heartbeat, parent of every component, enforcer of shutdown.
//!
//! Ported from `original_source/init_afd/init_afd.c`'s startup sequence
//! and tick loop. Real `fork`/`execlp` of protocol-driver and log-writer
//! children is out of scope (§9); `ProcessSlot` PIDs here are recorded
//! for the in-process `WorkerPool`/component tasks this crate actually
//! runs — the File Distributor's dispatch cycle is driven straight out of
//! `tick()` rather than through a separate child process.

use std::process::ExitStatus;
use std::time::Duration;

use crate::catalog::JobCatalog;
use crate::config::RuntimeConfig;
use crate::error::{AfdError, Result};
use crate::log::Sign;
use crate::system_log;
use crate::queue::driver::LocDriver;
use crate::queue::WorkerPool;
use crate::shared::active::AfdActive;
use crate::shared::fsa::{Fsa, HostEntry};
use crate::shared::status::{AfdStatus, Component};
use crate::supervisor::childspec::{classify_exit, ChildSpec, ProcessSlot, RestartDecision};
use crate::supervisor::linkcount::{self, AmgRunState};
use crate::threshold::{tick_host, NullHook};

#[derive(Debug, Clone)]
pub enum SupervisorCommand {
    Shutdown,
    Stop(ProcessSlot),
    Start(ProcessSlot),
    IsAlive,
    DeleteJob(String),
}

pub struct Supervisor {
    cfg: RuntimeConfig,
    active: AfdActive,
    status: AfdStatus,
    fsa: Fsa,
    pub worker_pool: WorkerPool,
    driver: LocDriver,
    amg_run_state: AmgRunState,
    children: Vec<ChildSpec<()>>,
    tick_count: u64,
}

impl Supervisor {
    /// §4.6 startup, steps 1-4 and 8 (fifo creation and atexit/signal
    /// registration are steps 5-7, handled at the process level in
    /// `main.rs` rather than here).
    pub fn startup(cfg: RuntimeConfig, hosts: Vec<HostEntry>) -> Result<Self> {
        for dir in cfg.required_subdirs() {
            std::fs::create_dir_all(&dir)
                .map_err(|e| AfdError::Fatal(format!("cannot create {dir:?}: {e}")))?;
        }

        let fifo_dir = cfg.fifo_dir();
        let n_slots = ProcessSlot::all().len();

        if AfdActive::check_heartbeat(&fifo_dir, n_slots, Duration::from_secs(2))? {
            return Err(AfdError::Fatal(
                "another instance is active (heartbeat advancing)".into(),
            ));
        }

        let mut active = AfdActive::create(&fifo_dir, n_slots)?;
        let status = AfdStatus::attach_or_create(&fifo_dir, crate::util::now_epoch())?;
        let fsa = Fsa::attach_or_create(&fifo_dir, hosts)?;

        let catalog = JobCatalog::new();
        let worker_pool = WorkerPool::new(
            fsa.hosts.clone(),
            catalog,
            cfg.messages_dir(),
            cfg.files_dir().join("outgoing"),
        );

        let mut children = Vec::new();
        for (i, slot) in ProcessSlot::all().into_iter().enumerate() {
            let simulated_pid = 1000 + i as u32;
            active.set_pid(slot, simulated_pid)?;
            children.push(ChildSpec::new(slot, (), simulated_pid));
        }

        system_log!(Sign::Info, "init_afd started, working directory {:?}", cfg.work_dir);

        Ok(Self {
            cfg,
            active,
            status,
            fsa,
            worker_pool,
            driver: LocDriver,
            amg_run_state: AmgRunState::Running,
            children,
            tick_count: 0,
        })
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.cfg
    }

    /// One supervisor tick (§4.6's tick loop): heartbeat, shutdown check,
    /// back-pressure, threshold state machine.
    pub fn tick(&mut self, link_count: i64) -> Result<()> {
        self.active.beat()?;
        self.tick_count += 1;

        if self.active.is_shutdown()? {
            return Ok(());
        }

        match linkcount::evaluate(&self.cfg, link_count, self.amg_run_state) {
            linkcount::AmgSupervisionAction::Stop => {
                self.amg_run_state = AmgRunState::Stopped;
                system_log!(Sign::Info, "Have stopped AMG");
            }
            linkcount::AmgSupervisionAction::Start => {
                self.amg_run_state = AmgRunState::Running;
                system_log!(Sign::Info, "Have started AMG");
            }
            linkcount::AmgSupervisionAction::NoChange => {}
        }

        let danger_no_of_files = self.cfg.danger_no_of_jobs;
        let mut hook = NullHook;
        for host in self.fsa.hosts.iter_mut() {
            let events = tick_host(host, danger_no_of_files, self.cfg.link_max, &mut hook);
            for event in events {
                system_log!(Sign::Info, "{:?}", event);
            }
        }
        self.worker_pool.hosts = self.fsa.hosts.clone();

        let queued_at_tick_start = self.worker_pool.queue.len();
        for _ in 0..queued_at_tick_start {
            match self.worker_pool.dispatch_once(&mut self.driver) {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) => system_log!(Sign::Error, "dispatch failed: {e}"),
            }
        }
        self.fsa.hosts = self.worker_pool.hosts.clone();

        crate::queue::worker_pool::recompute_jobs_queued(
            &mut self.fsa.hosts,
            &self.worker_pool.queue,
            &self.worker_pool.catalog,
        );
        let total_queued: u64 = self.fsa.hosts.iter().map(|h| h.jobs_queued as u64).sum();
        self.status.record.note_queue_length(total_queued);

        Ok(())
    }

    pub fn amg_running(&self) -> AmgRunState {
        self.amg_run_state
    }

    pub fn handle_command(&mut self, cmd: SupervisorCommand) -> Result<()> {
        match cmd {
            SupervisorCommand::Shutdown => self.begin_shutdown(),
            SupervisorCommand::Stop(slot) => {
                if let Some(state) = self.status.record.component_state_mut(component_for_slot(slot)) {
                    *state = crate::shared::status::ComponentState::Stopped;
                }
                Ok(())
            }
            SupervisorCommand::Start(slot) => {
                if let Some(state) = self.status.record.component_state_mut(component_for_slot(slot)) {
                    *state = crate::shared::status::ComponentState::On;
                }
                Ok(())
            }
            SupervisorCommand::IsAlive => Ok(()),
            SupervisorCommand::DeleteJob(msg_name) => {
                let handled = self.worker_pool.delete_job(&msg_name)?;
                if !handled {
                    system_log!(Sign::Info, "forwarding DELETE_JOB {msg_name} to FD");
                }
                Ok(())
            }
        }
    }

    fn begin_shutdown(&mut self) -> Result<()> {
        for state in [
            Component::Amg,
            Component::Fd,
            Component::ArchiveWatch,
            Component::Statistics,
        ] {
            if let Some(s) = self.status.record.component_state_mut(state) {
                *s = crate::shared::status::ComponentState::Shutdown;
            }
        }
        self.active.set_shutdown(true)
    }

    /// Apply §4.6's restart policy to a reaped child's exit status.
    pub fn report_child_exit(&mut self, slot: ProcessSlot, status: ExitStatus) -> RestartDecision {
        let decision = classify_exit(slot, &status);
        if let Some(child) = self.children.iter_mut().find(|c| c.slot == slot) {
            if matches!(
                decision,
                RestartDecision::RestartImmediately | RestartDecision::RestartAfterCoreHandling
            ) {
                child.restarts += 1;
            }
        }
        decision
    }

    /// Clean shutdown: unlink AfdActive after every component is
    /// accounted for.
    pub fn finish_shutdown(self) -> Result<()> {
        self.active.unlink()
    }
}

fn component_for_slot(slot: ProcessSlot) -> Component {
    match slot {
        ProcessSlot::SystemLog => Component::SystemLog,
        ProcessSlot::Amg => Component::Amg,
        ProcessSlot::Fd => Component::Fd,
        ProcessSlot::ArchiveWatch => Component::ArchiveWatch,
        ProcessSlot::Statistics => Component::Statistics,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg_for(dir: &std::path::Path) -> RuntimeConfig {
        let mut cfg = RuntimeConfig::default();
        cfg.work_dir = dir.to_path_buf();
        cfg
    }

    #[test]
    fn startup_creates_required_directories_and_active_file() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = cfg_for(dir.path());
        let supervisor = Supervisor::startup(cfg.clone(), vec![HostEntry::new("host1", 3)]).unwrap();
        assert!(cfg.fifo_dir().join("afd_active").exists());
        assert_eq!(supervisor.amg_running(), AmgRunState::Running);
    }

    #[test]
    fn tick_advances_heartbeat_and_runs_threshold_machine() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = cfg_for(dir.path());
        let mut supervisor = Supervisor::startup(cfg, vec![HostEntry::new("host1", 3)]).unwrap();
        supervisor.fsa.hosts[0].max_errors = 1;
        supervisor.fsa.hosts[0].error_counter = 1;
        supervisor.tick(0).unwrap();
        assert!(supervisor.fsa.hosts[0]
            .host_status
            .contains(crate::shared::fsa::HostStatus::AUTO_PAUSE_QUEUE));
    }

    #[test]
    fn scenario_s4_link_count_back_pressure_stops_and_restarts_amg() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = cfg_for(dir.path());
        let mut supervisor = Supervisor::startup(cfg.clone(), vec![]).unwrap();
        let stop_point = cfg.link_max - cfg.stop_amg_threshold - cfg.dirs_in_file_dir + 1;
        supervisor.tick(stop_point).unwrap();
        assert_eq!(supervisor.amg_running(), AmgRunState::Stopped);

        let restart_point = cfg.link_max - cfg.start_amg_threshold - 1;
        supervisor.tick(restart_point).unwrap();
        assert_eq!(supervisor.amg_running(), AmgRunState::Running);
    }

    #[test]
    fn scenario_s5_second_supervisor_detects_active_heartbeat() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = cfg_for(dir.path());
        let mut supervisor = Supervisor::startup(cfg.clone(), vec![]).unwrap();
        supervisor.tick(0).unwrap();

        let bg = std::thread::spawn(move || {
            for _ in 0..10 {
                supervisor.tick(0).unwrap();
                std::thread::sleep(Duration::from_millis(50));
            }
        });

        let result = Supervisor::startup(cfg, vec![]);
        assert!(result.is_err());
        bg.join().unwrap();
    }

    #[test]
    fn shutdown_sets_components_to_shutdown_and_flips_shared_byte() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = cfg_for(dir.path());
        let mut supervisor = Supervisor::startup(cfg, vec![]).unwrap();
        supervisor.handle_command(SupervisorCommand::Shutdown).unwrap();
        assert_eq!(
            supervisor.status.record.fd,
            crate::shared::status::ComponentState::Shutdown
        );
    }
}
