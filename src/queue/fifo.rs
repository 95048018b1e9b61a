//! Command and completion channels.
//!
//! §9 calls out named fifos as a pattern needing re-architecture for a
//! single-process Rust daemon: here they're `std::sync::mpsc` channels,
//! which preserve every contract §5 requires of them (a blocking read at
//! a fixed site, single-message command semantics, a natural suspension
//! point) without the multi-process plumbing real POSIX fifos would need
//! to be testable in one process.

use std::sync::mpsc::{Receiver, Sender};

/// Single-byte command surface (§6's "Command bytes"), restricted to the
/// subset C4's worker pool actually interprets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FdCommand {
    Stop,
    QuickStop,
    CheckFileDir,
    Retry,
    DeleteJob(String),
    DeleteJobsHost(String),
    FsaUpdated,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FdResponse {
    FdReady,
    Ackn,
}

/// A driver completion, read off `sf_fin.fifo` in the original.
#[derive(Debug, Clone)]
pub struct Completion {
    pub msg_name: String,
    pub pid: u32,
    pub files_done: u32,
    pub bytes_done: u64,
    pub success: bool,
}

pub struct CommandChannel {
    pub sender: Sender<FdCommand>,
    pub receiver: Receiver<FdCommand>,
}

pub fn command_channel() -> CommandChannel {
    let (sender, receiver) = std::sync::mpsc::channel();
    CommandChannel { sender, receiver }
}

pub struct CompletionChannel {
    pub sender: Sender<Completion>,
    pub receiver: Receiver<Completion>,
}

pub fn completion_channel() -> CompletionChannel {
    let (sender, receiver) = std::sync::mpsc::channel();
    CompletionChannel { sender, receiver }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_sent_is_received_in_order() {
        let chan = command_channel();
        chan.sender.send(FdCommand::Stop).unwrap();
        chan.sender.send(FdCommand::Retry).unwrap();
        assert_eq!(chan.receiver.recv().unwrap(), FdCommand::Stop);
        assert_eq!(chan.receiver.recv().unwrap(), FdCommand::Retry);
    }

    #[test]
    fn completion_channel_carries_driver_outcome() {
        let chan = completion_channel();
        chan.sender
            .send(Completion {
                msg_name: "5_1_1_1".into(),
                pid: 123,
                files_done: 2,
                bytes_done: 40,
                success: true,
            })
            .unwrap();
        let completion = chan.receiver.recv().unwrap();
        assert_eq!(completion.pid, 123);
        assert!(completion.success);
    }
}
