//! Job catalog (JID): content-addressed distribution-job records.
//!
//! Ported from the `struct job_id_data` layout mentioned throughout
//! `original_source/amg/*` and `original_source/tools/jid_view.c`'s
//! field list; `job_id` is computed exactly as `intern_job`'s contract
//! in §4.2 requires — a pure hash of the defining tuple, so two
//! independently started processes derive the same id.

use crate::util::nul_iter::{pack, NulTerminated};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobData {
    pub job_id: u64,
    pub dir_id_pos: usize,
    pub priority: char,
    pub file_list: Vec<String>,
    pub loptions: Vec<String>,
    pub soptions: String,
    pub recipient: String,
    pub host_alias: String,
}

impl JobData {
    pub fn file_list_packed(&self) -> Vec<u8> {
        pack(self.file_list.iter().map(String::as_str))
    }

    pub fn loptions_packed(&self) -> Vec<u8> {
        pack(self.loptions.iter().map(String::as_str))
    }

    pub fn unpack_file_list(buf: &[u8]) -> Vec<String> {
        NulTerminated::new(buf)
            .filter(|s| !s.is_empty())
            .map(|s| String::from_utf8_lossy(s).into_owned())
            .collect()
    }
}

/// Compute `job_id` from the tuple that defines a job, per §3's
/// "(dir_id_pos, file_list, loptions, soptions, recipient, host_alias,
/// priority) uniquely determines job_id".
pub fn compute_job_id(
    dir_id_pos: usize,
    file_list: &[String],
    loptions: &[String],
    soptions: &str,
    recipient: &str,
    host_alias: &str,
    priority: char,
) -> u64 {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    dir_id_pos.hash(&mut hasher);
    file_list.hash(&mut hasher);
    loptions.hash(&mut hasher);
    soptions.hash(&mut hasher);
    recipient.hash(&mut hasher);
    host_alias.hash(&mut hasher);
    priority.hash(&mut hasher);
    hasher.finish()
}
