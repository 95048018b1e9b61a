//! C2's public surface: `intern_job`/`lookup_job`/`lookup_dir`/
//! `reload_generation`, all serialized behind the single EDIT lock.
//!
//! Ported from the JID/dir-name-buffer reload path described in §4.2 and
//! §5 ("Configuration reloads are serialized against all readers by the
//! EDIT lock").

use std::sync::{Arc, RwLock};

use crate::catalog::dirname_buffer::{DirNameBuffer, DirNameEntry};
use crate::catalog::job::{compute_job_id, JobData};

#[derive(Debug, Default)]
struct Generation {
    dirs: DirNameBuffer,
    jobs: Vec<JobData>,
    edit_counter: u32,
}

/// The live job catalog. Readers take a shared read lock; reload replaces
/// the whole `Generation` atomically under a write lock, giving the same
/// "readers see either the old or the new generation, never a partial
/// one" guarantee the EDIT lock provides in the original.
#[derive(Clone)]
pub struct JobCatalog {
    inner: Arc<RwLock<Generation>>,
}

impl JobCatalog {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(Generation::default())),
        }
    }

    pub fn intern_dir(&self, canonical_path: &str) -> usize {
        self.inner.write().unwrap().dirs.intern_dir(canonical_path)
    }

    pub fn lookup_dir(&self, dir_id_pos: usize) -> Option<DirNameEntry> {
        self.inner.read().unwrap().dirs.lookup_dir(dir_id_pos).cloned()
    }

    #[allow(clippy::too_many_arguments)]
    pub fn intern_job(
        &self,
        dir_id_pos: usize,
        file_list: Vec<String>,
        loptions: Vec<String>,
        soptions: String,
        recipient: String,
        host_alias: String,
        priority: char,
    ) -> u64 {
        let id = compute_job_id(
            dir_id_pos,
            &file_list,
            &loptions,
            &soptions,
            &recipient,
            &host_alias,
            priority,
        );
        let mut gen = self.inner.write().unwrap();
        if gen.jobs.iter().any(|j| j.job_id == id) {
            return id;
        }
        gen.jobs.push(JobData {
            job_id: id,
            dir_id_pos,
            priority,
            file_list,
            loptions,
            soptions,
            recipient,
            host_alias,
        });
        gen.edit_counter += 1;
        id
    }

    pub fn lookup_job(&self, job_id: u64) -> Option<JobData> {
        self.inner
            .read()
            .unwrap()
            .jobs
            .iter()
            .find(|j| j.job_id == job_id)
            .cloned()
    }

    pub fn edit_counter(&self) -> u32 {
        self.inner.read().unwrap().edit_counter
    }

    /// Atomically replace both catalogs with the result of a
    /// configuration reload. Any `job_id` not present in `new_jobs` is
    /// simply absent afterward — per §3's invariant, it's the caller's
    /// job to treat vanished ids as "unknown", never to fabricate one.
    pub fn reload_generation(&self, new_dirs: DirNameBuffer, new_jobs: Vec<JobData>) {
        let mut gen = self.inner.write().unwrap();
        gen.edit_counter += 1;
        gen.dirs = new_dirs;
        gen.jobs = new_jobs;
    }
}

impl Default for JobCatalog {
    fn default() -> Self {
        Self::new()
    }
}
