//! C6: the supervisor process — startup sequence, heartbeat, the
//! per-child restart policy, and the link-count back-pressure check.

pub mod childspec;
pub mod linkcount;
pub mod supervisor;

pub use childspec::{classify_exit, ChildSpec, ProcessSlot, RestartDecision};
pub use linkcount::{AmgRunState, AmgSupervisionAction};
pub use supervisor::{Supervisor, SupervisorCommand};
