//! The File Distributor worker pool (C4): ties dispatch, protocol
//! drivers, and FSA mutation together; implements the `DELETE_JOB`
//! contract from §4.4 and scenario S6.

use std::collections::HashMap;
use std::path::PathBuf;

use crate::catalog::JobCatalog;
use crate::message::emitter::read_message;
use crate::queue::dispatch::{find_burst_candidate, select_dispatch};
use crate::queue::driver::{ProtocolDriver, TransferJob};
use crate::queue::message_queue::MessageQueue;
use crate::shared::fsa::{ConnectStatus, HostEntry};
use crate::error::Result;

/// Whether the File Distributor process is currently running, needed by
/// the `DELETE_JOB` contract (§4.4): "If FD is active, the command is
/// forwarded ... If FD is not active, the deleter removes the job's
/// files ...".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FdState {
    Active,
    Stopped,
}

pub struct WorkerPool {
    pub hosts: Vec<HostEntry>,
    pub queue: MessageQueue,
    pub catalog: JobCatalog,
    pub fd_state: FdState,
    messages_dir: PathBuf,
    files_dir: PathBuf,
}

impl WorkerPool {
    pub fn new(hosts: Vec<HostEntry>, catalog: JobCatalog, messages_dir: PathBuf, files_dir: PathBuf) -> Self {
        Self {
            hosts,
            queue: MessageQueue::new(),
            catalog,
            fd_state: FdState::Stopped,
            messages_dir,
            files_dir,
        }
    }

    fn host_pos_for_job(&self, job_id: u64) -> Option<usize> {
        let job = self.catalog.lookup_job(job_id)?;
        self.hosts.iter().position(|h| h.alias == job.host_alias)
    }

    /// Run exactly one dispatch-transfer-completion cycle against
    /// `driver`, matching scenario S1. Returns `false` if nothing was
    /// eligible to dispatch.
    pub fn dispatch_once(&mut self, driver: &mut impl ProtocolDriver) -> Result<bool> {
        let Some((msg_number, host_pos)) = select_dispatch(&self.queue, &self.hosts, |id| self.host_pos_for_job(id))
        else {
            return Ok(false);
        };

        let entry = self.queue.iter_in_order().find(|e| e.msg_number == msg_number).unwrap().clone();
        self.hosts[host_pos].active_transfers += 1;
        self.hosts[host_pos].jobs[0].connect_status = crate::queue::driver::on_dispatch_start();

        let message = read_message(&self.messages_dir.join(format!("{:x}", entry.job_id)));
        let files = message
            .as_ref()
            .ok()
            .map(|_| vec![self.files_dir.join(&entry.msg_name)])
            .unwrap_or_default();
        let recipient = message.map(|m| m.recipient).unwrap_or_default();

        let outcome = driver.transfer(&TransferJob {
            recipient,
            files,
            options: None,
        });

        self.hosts[host_pos].active_transfers = self.hosts[host_pos].active_transfers.saturating_sub(1);

        match outcome {
            Ok(outcome) => {
                self.hosts[host_pos].file_counter_done += outcome.files_done as u64;
                self.hosts[host_pos].bytes_sent += outcome.bytes_done;
                self.hosts[host_pos].connections += 1;
                self.hosts[host_pos].error_counter = 0;
                self.hosts[host_pos].last_connection = crate::util::now_epoch();
                self.queue.remove(msg_number);

                // §4.4 bursting: keep transferring on this connection for
                // any other queued message belonging to the same job
                // rather than tear it down, capped by `no_of_no_bursts`.
                let mut bursts_in_flight = 0u8;
                while let Some(burst_msg_number) = self.next_burst(entry.job_id, host_pos, bursts_in_flight) {
                    let Some(burst_entry) =
                        self.queue.iter_in_order().find(|e| e.msg_number == burst_msg_number).cloned()
                    else {
                        break;
                    };
                    self.hosts[host_pos].jobs[0].connect_status = driver.burst_status();

                    let burst_message = read_message(&self.messages_dir.join(format!("{:x}", burst_entry.job_id)));
                    let burst_files = burst_message
                        .as_ref()
                        .ok()
                        .map(|_| vec![self.files_dir.join(&burst_entry.msg_name)])
                        .unwrap_or_default();
                    let burst_recipient = burst_message.map(|m| m.recipient).unwrap_or_default();

                    let burst_outcome = driver.transfer(&TransferJob {
                        recipient: burst_recipient,
                        files: burst_files,
                        options: None,
                    });
                    bursts_in_flight += 1;

                    match burst_outcome {
                        Ok(o) => {
                            self.hosts[host_pos].file_counter_done += o.files_done as u64;
                            self.hosts[host_pos].bytes_sent += o.bytes_done;
                            self.queue.remove(burst_msg_number);
                        }
                        // Leave it queued for a fresh, non-burst dispatch.
                        Err(_) => break,
                    }
                }
                self.hosts[host_pos].jobs[0].connect_status = ConnectStatus::Disconnect;
            }
            Err(e) => {
                self.hosts[host_pos].error_counter += 1;
                self.hosts[host_pos].total_errors += 1;
                self.hosts[host_pos].last_retry_time = crate::util::now_epoch();
                self.hosts[host_pos].jobs[0].connect_status = ConnectStatus::Disconnect;
                if self.hosts[host_pos].error_counter == 1 {
                    self.hosts[host_pos].first_error_time = self.hosts[host_pos].last_retry_time;
                }
                if self.hosts[host_pos].auto_toggle {
                    self.hosts[host_pos].flip_toggle();
                }
                return Err(e);
            }
        }

        Ok(true)
    }

    /// Whether the just-finished job at `host_pos` should burst into the
    /// next queued message for the same job rather than tear down the
    /// connection. `bursts_in_flight` is how many burst transfers already
    /// happened on this connection since the initial dispatch.
    pub fn next_burst(&self, finished_job_id: u64, host_pos: usize, bursts_in_flight: u8) -> Option<u64> {
        let no_of_no_bursts = self.hosts.get(host_pos).map(|h| h.no_of_no_bursts).unwrap_or(0);
        find_burst_candidate(
            &self.queue,
            finished_job_id,
            host_pos,
            |id| self.host_pos_for_job(id),
            no_of_no_bursts,
            bursts_in_flight,
        )
    }

    /// `DELETE_JOB <msg>` (§4.4, scenario S6). Returns `true` if this call
    /// performed the deletion locally (FD was stopped); `false` means the
    /// caller must forward the command on `delete_jobs.fifo` instead.
    pub fn delete_job(&mut self, msg_name: &str) -> Result<bool> {
        if self.fd_state == FdState::Active {
            return Ok(false);
        }

        let Some(msg_number) = self.queue.find_by_name(msg_name) else {
            return Ok(true);
        };
        let entry = self.queue.remove(msg_number).unwrap();

        let message_path = self.messages_dir.join(format!("{:x}", entry.job_id));
        let outgoing_dir = self.files_dir.join(&entry.msg_name);

        let (mut files_removed, mut bytes_removed) = (0i64, 0i64);
        if outgoing_dir.exists() {
            if let Ok(read_dir) = std::fs::read_dir(&outgoing_dir) {
                for file in read_dir.flatten() {
                    if let Ok(meta) = file.metadata() {
                        bytes_removed += meta.len() as i64;
                        files_removed += 1;
                    }
                }
            }
            let _ = std::fs::remove_dir_all(&outgoing_dir);
        }
        let _ = std::fs::remove_file(&message_path);

        if let Some(host_pos) = self.host_pos_for_job(entry.job_id) {
            self.hosts[host_pos].subtract_counters(files_removed, bytes_removed);
        }

        Ok(true)
    }

    pub fn outgoing_dir(&self, msg_name: &str) -> PathBuf {
        self.files_dir.join(msg_name)
    }
}

/// Resolve, for every host, how many entries in the queue currently
/// target it — used to keep `jobs_queued` in sync (§8 property 4:
/// `AfdStatus.jobs_in_queue == sum over FSA of jobs_queued`).
pub fn recompute_jobs_queued(hosts: &mut [HostEntry], queue: &MessageQueue, catalog: &JobCatalog) {
    let mut counts: HashMap<usize, u32> = HashMap::new();
    for entry in queue.iter_in_order() {
        if let Some(job) = catalog.lookup_job(entry.job_id) {
            if let Some(pos) = hosts.iter().position(|h| h.alias == job.host_alias) {
                *counts.entry(pos).or_default() += 1;
            }
        }
    }
    for (pos, host) in hosts.iter_mut().enumerate() {
        host.jobs_queued = counts.get(&pos).copied().unwrap_or(0);
    }
}
