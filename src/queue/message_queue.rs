//! The message queue: always consumed in `(priority, creation_time)`
//! order at dispatch time (§4.4, §5).
//!
//! Backed by a `BTreeMap` keyed on `msg_number`, which already encodes
//! priority as its high bits — iteration order is therefore exactly the
//! dispatch order the scheduling contract requires, and satisfies R5's
//! sibling property for the queue: a driver completion never reorders
//! already-dispatched work, since nothing is re-keyed in place.

use std::collections::BTreeMap;

use crate::queue::entry::QueueEntry;

#[derive(Debug, Default)]
pub struct MessageQueue {
    entries: BTreeMap<u64, QueueEntry>,
    next_sequence: u64,
}

impl MessageQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, priority: char, creation_time: i64, msg_name: String, job_id: u64, pos: usize) -> u64 {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        let msg_number = QueueEntry::compute_msg_number(priority, creation_time, sequence);
        self.entries.insert(
            msg_number,
            QueueEntry {
                msg_name,
                msg_number,
                job_id,
                priority,
                creation_time,
                worker: crate::queue::entry::QueueWorker::Pending,
                pos,
                connect_pos: None,
                in_error_dir: false,
            },
        );
        msg_number
    }

    /// Iterate in dispatch order (priority, then creation time).
    pub fn iter_in_order(&self) -> impl Iterator<Item = &QueueEntry> {
        self.entries.values()
    }

    pub fn iter_in_order_mut(&mut self) -> impl Iterator<Item = &mut QueueEntry> {
        self.entries.values_mut()
    }

    pub fn remove(&mut self, msg_number: u64) -> Option<QueueEntry> {
        self.entries.remove(&msg_number)
    }

    pub fn find_by_name(&self, msg_name: &str) -> Option<u64> {
        self.entries
            .iter()
            .find(|(_, e)| e.msg_name == msg_name)
            .map(|(k, _)| *k)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn jobs_for_host(&self, connect_pos: usize) -> usize {
        self.entries
            .values()
            .filter(|e| e.connect_pos == Some(connect_pos))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_iterate_in_priority_then_time_order() {
        let mut queue = MessageQueue::new();
        queue.push('5', 200, "5_200_1_a".into(), 1, 0);
        queue.push('0', 300, "0_300_2_b".into(), 2, 0);
        queue.push('5', 100, "5_100_3_c".into(), 3, 0);

        let names: Vec<&str> = queue.iter_in_order().map(|e| e.msg_name.as_str()).collect();
        assert_eq!(names, vec!["0_300_2_b", "5_100_3_c", "5_200_1_a"]);
    }

    #[test]
    fn remove_does_not_reorder_remaining_entries() {
        let mut queue = MessageQueue::new();
        let n1 = queue.push('5', 100, "a".into(), 1, 0);
        queue.push('5', 200, "b".into(), 2, 0);
        queue.remove(n1);
        let names: Vec<&str> = queue.iter_in_order().map(|e| e.msg_name.as_str()).collect();
        assert_eq!(names, vec!["b"]);
    }

    #[test]
    fn empty_queue_reports_empty() {
        let queue = MessageQueue::new();
        assert!(queue.is_empty());
        assert_eq!(queue.len(), 0);
    }
}
