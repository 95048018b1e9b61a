pub mod emitter;
pub mod naming;

pub use emitter::{create_message, read_message, Message};
pub use naming::{msg_name, parse_msg_name, AfdCounter};
