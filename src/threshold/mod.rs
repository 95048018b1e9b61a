pub mod events;
pub mod state_machine;

pub use events::ThresholdEvent;
pub use state_machine::{tick_host, ErrorActionHook, NullHook};
