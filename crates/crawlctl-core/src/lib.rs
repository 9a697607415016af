pub mod artifact;
pub mod buffer;
pub mod client;
pub mod connection;
pub mod entry;
pub mod error;
pub mod normalize;
pub mod run;
pub mod tree;

pub use artifact::{parse_artifact, ParsedArtifact, ARTIFACT_FILE_NAME, ARTIFACT_ROOT_KEY};
pub use buffer::LogBuffer;
pub use client::{parse_base_url, BackendClient, StatusResponse, DEFAULT_API_BASE};
pub use connection::{stream_endpoint, ConnectionState, ConnectionTracker};
pub use entry::{LogEntry, Severity};
pub use error::{BackendError, ConfigError};
pub use normalize::{normalize, normalize_at, parse_timestamp};
pub use run::{RunCoordinator, RunEpoch, RunState, StartRequest};
pub use tree::{NodePath, TreeExplorer, TreeState};
