//! Pipeline configuration: deadlines, build stage and archive target.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::archive::ArchiveFormat;
use crate::identity::HTTPS;

/// Per-operation wall-clock limits in seconds. `None` means unbounded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Deadlines {
    pub clone_secs: u64,
    pub probe_secs: u64,
    pub build_secs: Option<u64>,
    pub diff_secs: Option<u64>,
    pub archive_secs: Option<u64>,
}

impl Default for Deadlines {
    fn default() -> Self {
        Self {
            clone_secs: 30,
            probe_secs: 5,
            build_secs: None,
            diff_secs: None,
            archive_secs: None,
        }
    }
}

impl Deadlines {
    pub fn clone_limit(&self) -> Duration {
        Duration::from_secs(self.clone_secs)
    }

    pub fn probe_limit(&self) -> Duration {
        Duration::from_secs(self.probe_secs)
    }

    pub fn build_limit(&self) -> Option<Duration> {
        self.build_secs.map(Duration::from_secs)
    }

    pub fn diff_limit(&self) -> Option<Duration> {
        self.diff_secs.map(Duration::from_secs)
    }

    pub fn archive_limit(&self) -> Option<Duration> {
        self.archive_secs.map(Duration::from_secs)
    }
}

/// The build step run inside the checkout between clone and diff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildStage {
    /// Command to execute (first element is the executable).
    pub command: Vec<String>,

    /// Extra environment, e.g. `GOOS`/`GOARCH`.
    #[serde(default)]
    pub env: Vec<(String, String)>,
}

impl BuildStage {
    pub fn new(command: Vec<String>) -> Self {
        Self {
            command,
            env: Vec::new(),
        }
    }

    pub fn with_env(mut self, env: Vec<(String, String)>) -> Self {
        self.env.extend(env);
        self
    }
}

/// Everything [`crate::pipeline::Pipeline`] needs besides the identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Clone scheme; only `https` is supported.
    pub scheme: String,

    /// Run `git ls-remote` before cloning.
    pub preflight: bool,

    /// Optional build step.
    pub build: Option<BuildStage>,

    /// Archive base path; the format extension is appended.
    pub destination: PathBuf,

    pub format: ArchiveFormat,

    pub deadlines: Deadlines,
}

impl PipelineConfig {
    pub fn new(destination: impl Into<PathBuf>) -> Self {
        Self {
            scheme: HTTPS.to_string(),
            preflight: true,
            build: None,
            destination: destination.into(),
            format: ArchiveFormat::TarGz,
            deadlines: Deadlines::default(),
        }
    }

    pub fn with_build(mut self, build: BuildStage) -> Self {
        self.build = Some(build);
        self
    }

    pub fn without_preflight(mut self) -> Self {
        self.preflight = false;
        self
    }

    pub fn with_format(mut self, format: ArchiveFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_deadlines(mut self, deadlines: Deadlines) -> Self {
        self.deadlines = deadlines;
        self
    }
}
