//! Build output discovery via untracked files.
//!
//! A freshly cloned tree has no untracked files of its own, so whatever
//! `git clean --dry-run` would remove after the build is what the build
//! produced.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{info, instrument, warn};

use crate::identity::RepositoryIdentity;
use crate::process::{CommandRunner, Invocation};

/// Build control file dropped into the checkout by the caller; never an artifact.
pub const BUILD_CONTROL_FILE: &str = "Gleanfile";

const DRY_RUN_PREFIX: &str = "Would remove ";

/// Untracked files under `root`, in the order git reported them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffResult {
    root: PathBuf,
    files: Vec<String>,
}

impl DiffResult {
    pub fn new(root: impl Into<PathBuf>, files: Vec<String>) -> Self {
        Self {
            root: root.into(),
            files,
        }
    }

    /// Directory the file paths are relative to.
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn files(&self) -> &[String] {
        &self.files
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }
}

/// Turn `git clean --dry-run` output into bare relative paths.
///
/// Paths git wrapped in double quotes are C-unescaped.
pub fn parse_clean_output(raw: &str) -> Vec<String> {
    raw.split('\n')
        .filter(|line| !line.is_empty())
        .map(|line| line.strip_prefix(DRY_RUN_PREFIX).unwrap_or(line))
        .map(|path| unquote_path(path).unwrap_or_else(|| path.to_owned()))
        .filter(|path| !path.is_empty() && path != BUILD_CONTROL_FILE)
        .collect()
}

/// Undo git's C-style path quoting. `None` when `path` is not quoted.
fn unquote_path(path: &str) -> Option<String> {
    let inner = path.strip_prefix('"')?.strip_suffix('"')?;
    let mut bytes = Vec::with_capacity(inner.len());
    let mut chars = inner.bytes().peekable();
    while let Some(b) = chars.next() {
        if b != b'\\' {
            bytes.push(b);
            continue;
        }
        let escaped = chars.next()?;
        let byte = match escaped {
            b'a' => 0x07,
            b'b' => 0x08,
            b't' => b'\t',
            b'n' => b'\n',
            b'v' => 0x0b,
            b'f' => 0x0c,
            b'r' => b'\r',
            b'0'..=b'7' => {
                let mut value = u32::from(escaped - b'0');
                for _ in 0..2 {
                    match chars.peek() {
                        Some(d @ b'0'..=b'7') => {
                            value = value * 8 + u32::from(d - b'0');
                            chars.next();
                        }
                        _ => break,
                    }
                }
                u8::try_from(value).ok()?
            }
            other => other,
        };
        bytes.push(byte);
    }
    Some(String::from_utf8_lossy(&bytes).into_owned())
}

/// Lists what the build step left behind in a checkout.
pub struct DiffScanner<'r, R: ?Sized> {
    runner: &'r R,
    deadline: Option<Duration>,
}

impl<'r, R: CommandRunner + ?Sized> DiffScanner<'r, R> {
    pub fn new(runner: &'r R) -> Self {
        Self {
            runner,
            deadline: None,
        }
    }

    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn invocation(&self, checkout: &Path) -> Invocation {
        Invocation::new("git")
            .args(["-c", "core.quotePath=false", "clean", "--dry-run"])
            .current_dir(checkout)
            .deadline(self.deadline)
    }

    /// Scan `identity.local_path()`.
    ///
    /// A failing git query yields an empty result; the archive step turns
    /// that into `NoArtifacts`.
    #[instrument(skip(self, identity), fields(checkout = %identity.local_path().display()))]
    pub async fn diff(&self, identity: &RepositoryIdentity) -> DiffResult {
        self.scan(identity.local_path()).await
    }

    /// Scan an arbitrary checkout directory.
    pub async fn scan(&self, checkout: PathBuf) -> DiffResult {
        let files = match self.runner.run(&self.invocation(&checkout)).await {
            Ok(output) => parse_clean_output(&output.stdout),
            Err(e) => {
                warn!(error = %e, "untracked file query failed, treating as no output");
                Vec::new()
            }
        };
        info!(count = files.len(), "untracked files found");
        DiffResult::new(checkout, files)
    }
}
