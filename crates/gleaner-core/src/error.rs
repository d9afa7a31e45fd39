//! Error taxonomy for repository synchronisation and artifact harvesting.

use std::time::Duration;

/// Failures of a single external process invocation.
///
/// `command` is always the redacted command line, so these errors are safe
/// to log even when the invocation carried a token.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` timed out after {}ms and was killed", .limit.as_millis())]
    Timeout {
        command: String,
        limit: Duration,
        pid: Option<u32>,
    },

    #[error("`{command}` exited with {}: {stderr}", exit_label(.code))]
    Exit {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("failed waiting on `{command}`: {source}")]
    Wait {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(c) => format!("code {c}"),
        None => "signal".to_string(),
    }
}

impl ProcessError {
    /// Whether the process was killed because its deadline elapsed.
    pub fn is_timeout(&self) -> bool {
        matches!(self, ProcessError::Timeout { .. })
    }
}

/// Gleaner errors.
#[derive(Debug, thiserror::Error)]
pub enum GleanerError {
    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error("no artifacts found in {0}")]
    NoArtifacts(String),

    #[error("unsupported clone scheme: {0:?}")]
    UnsupportedScheme(String),

    #[error("missing required parameter: {0}")]
    MissingParam(&'static str),

    #[error("invalid parameters: {0}")]
    InvalidParams(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl GleanerError {
    /// Whether this error is a deadline expiry of an external process.
    pub fn is_timeout(&self) -> bool {
        matches!(self, GleanerError::Process(p) if p.is_timeout())
    }
}

/// Result type for gleaner operations.
pub type Result<T> = std::result::Result<T, GleanerError>;
