mod command;
mod invoke;
mod runner;

pub use command::ToolCommand;
pub use invoke::{InvokeOptions, invoke_backend};
pub use runner::run_tool;
