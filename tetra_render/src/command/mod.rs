/// Command module - deferred render commands and the per-frame queue

pub mod render_command;
pub mod command_queue;

pub use render_command::*;
pub use command_queue::*;
