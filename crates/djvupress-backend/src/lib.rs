mod error;
mod progress;
mod registry;
mod types;

pub use error::BackendError;
pub use progress::{ConvertEvent, EventSink, ProgressScale, ProgressUpdate};
pub use registry::{Backend, BackendRegistry, CommandBuilder, ProgressParser, ReleaseSource};
pub use types::{BackendState, DiscoveryResult, StreamingMode, ToolVersion, VersionParseError};
