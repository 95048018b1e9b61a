//! Dispatch: pick the next runnable queue entry and decide whether a
//! finishing driver should burst into the next message for the same host
//! (§4.4).

use crate::queue::message_queue::MessageQueue;
use crate::shared::fsa::HostEntry;

/// Walk the queue in dispatch order and return the first entry whose
/// resolved host is eligible to receive work right now. The head is
/// skipped (not reordered) when its host can't run, so priority is never
/// starved by one blocked host (§4.4).
pub fn select_dispatch(
    queue: &MessageQueue,
    hosts: &[HostEntry],
    host_pos_for_job: impl Fn(u64) -> Option<usize>,
) -> Option<(u64, usize)> {
    for entry in queue.iter_in_order() {
        let Some(host_pos) = host_pos_for_job(entry.job_id) else {
            continue;
        };
        let Some(host) = hosts.get(host_pos) else {
            continue;
        };
        if host.active_transfers < host.allowed_transfers && !host.host_status.blocks_dispatch() {
            return Some((entry.msg_number, host_pos));
        }
    }
    None
}

/// When a driver finishes, decide whether there's an eligible same-job
/// message it can burst into instead of tearing down the connection.
/// `bursts_in_flight` is how many parallel drivers to `host_pos` have
/// already declined to burst this round; `no_of_no_bursts` caps it.
pub fn find_burst_candidate(
    queue: &MessageQueue,
    finished_job_id: u64,
    host_pos: usize,
    host_pos_for_job: impl Fn(u64) -> Option<usize>,
    no_of_no_bursts: u8,
    bursts_in_flight: u8,
) -> Option<u64> {
    if bursts_in_flight >= no_of_no_bursts {
        return None;
    }
    queue
        .iter_in_order()
        .find(|e| e.job_id == finished_job_id && host_pos_for_job(e.job_id) == Some(host_pos))
        .map(|e| e.msg_number)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::fsa::HostStatus;

    fn queue_with(entries: &[(char, i64, &str, u64)]) -> MessageQueue {
        let mut queue = MessageQueue::new();
        for (priority, time, name, job_id) in entries {
            queue.push(*priority, *time, (*name).to_string(), *job_id, 0);
        }
        queue
    }

    #[test]
    fn skips_blocked_host_and_picks_next_eligible_entry() {
        let queue = queue_with(&[('5', 100, "a", 1), ('5', 200, "b", 2)]);
        let mut h0 = HostEntry::new("blocked", 3);
        h0.host_status.insert(HostStatus::PAUSE_QUEUE);
        let h1 = HostEntry::new("ok", 3);
        let hosts = vec![h0, h1];

        let result = select_dispatch(&queue, &hosts, |job_id| if job_id == 1 { Some(0) } else { Some(1) });
        assert!(result.is_some());
        let (_, host_pos) = result.unwrap();
        assert_eq!(host_pos, 1);
    }

    #[test]
    fn empty_queue_dispatches_nothing() {
        let queue = MessageQueue::new();
        let hosts = vec![HostEntry::new("h1", 3)];
        assert!(select_dispatch(&queue, &hosts, |_| Some(0)).is_none());
    }

    #[test]
    fn full_host_at_allowed_transfers_is_skipped() {
        let queue = queue_with(&[('5', 100, "a", 1)]);
        let mut host = HostEntry::new("h1", 3);
        host.active_transfers = host.allowed_transfers;
        let hosts = vec![host];
        assert!(select_dispatch(&queue, &hosts, |_| Some(0)).is_none());
    }

    #[test]
    fn burst_candidate_found_for_matching_job_id_under_cap() {
        let queue = queue_with(&[('5', 100, "a", 7), ('5', 200, "b", 7)]);
        let candidate = find_burst_candidate(&queue, 7, 0, |_| Some(0), 2, 0);
        assert!(candidate.is_some());
    }

    #[test]
    fn burst_candidate_none_when_no_burst_cap_reached() {
        let queue = queue_with(&[('5', 100, "a", 7)]);
        let candidate = find_burst_candidate(&queue, 7, 0, |_| Some(0), 2, 2);
        assert!(candidate.is_none());
    }
}
