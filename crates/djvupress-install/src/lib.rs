mod archive;
mod discover;
mod install;

pub use discover::{discover, query_tool_version, version_from_output, versioned_tool_path};
pub use install::{InstallOutcome, install_backend};
