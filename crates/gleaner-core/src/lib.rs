//! Gleaner Core
//!
//! Fetches a version-pinned repository, lets a build run inside it, and
//! packages exactly the files the build left behind:
//! - Shallow clone and `ls-remote` preflight under hard deadlines
//! - Untracked-file discovery via `git clean --dry-run`
//! - `tar.gz` packaging of the discovered files

pub mod archive;
pub mod config;
pub mod diff;
pub mod error;
pub mod identity;
pub mod params;
pub mod pipeline;
pub mod process;
pub mod sync;
pub mod telemetry;

pub use archive::{ArchiveFormat, ArchiveReport, Archiver};
pub use config::{BuildStage, Deadlines, PipelineConfig};
pub use diff::{parse_clean_output, DiffResult, DiffScanner, BUILD_CONTROL_FILE};
pub use error::{GleanerError, ProcessError, Result};
pub use identity::{RepositoryIdentity, HTTPS};
pub use params::Params;
pub use pipeline::{Pipeline, PipelineReport, StageTiming};
pub use process::{BoundedRunner, CommandRunner, Invocation, ProcessOutput};
pub use sync::{Cloner, RemoteProbe, CLONE_DEADLINE, PROBE_DEADLINE};
pub use telemetry::init_tracing;
