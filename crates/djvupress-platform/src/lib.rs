mod commands;
mod environment;
mod paths;

pub use commands::ConsoleHidden;
pub use environment::{tool_env, tool_search_path};
pub use paths::{AppPaths, AppPathsError};
