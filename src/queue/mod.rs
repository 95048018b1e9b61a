pub mod dispatch;
pub mod driver;
pub mod entry;
pub mod fifo;
pub mod message_queue;
pub mod worker_pool;

pub use driver::{LocDriver, MockDriver, ProtocolDriver, TransferJob, TransferOutcome};
pub use entry::QueueEntry;
pub use message_queue::MessageQueue;
pub use worker_pool::{FdState, WorkerPool};
