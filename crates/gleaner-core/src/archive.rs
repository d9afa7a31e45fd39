//! Packaging of harvested files.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::io::AsyncReadExt;
use tracing::{info, instrument, warn};

use crate::diff::DiffResult;
use crate::error::{GleanerError, Result};
use crate::process::{CommandRunner, Invocation};

/// Archive format requested by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ArchiveFormat {
    /// gzip-compressed tar, extension `tar.gz`.
    TarGz,
    /// Anything else. Archiving is skipped.
    Unsupported(String),
}

impl ArchiveFormat {
    pub fn parse(tag: &str) -> Self {
        match tag {
            "tar.gz" => ArchiveFormat::TarGz,
            other => ArchiveFormat::Unsupported(other.to_string()),
        }
    }

    pub fn tag(&self) -> &str {
        match self {
            ArchiveFormat::TarGz => "tar.gz",
            ArchiveFormat::Unsupported(tag) => tag,
        }
    }

    /// `destination` with this format's extension appended.
    pub fn target(&self, destination: &Path) -> PathBuf {
        let mut name = destination.as_os_str().to_os_string();
        name.push(".");
        name.push(self.tag());
        PathBuf::from(name)
    }
}

impl From<String> for ArchiveFormat {
    fn from(tag: String) -> Self {
        ArchiveFormat::parse(&tag)
    }
}

impl From<ArchiveFormat> for String {
    fn from(format: ArchiveFormat) -> Self {
        format.tag().to_string()
    }
}

impl fmt::Display for ArchiveFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// What an archive run produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveReport {
    /// Archive file written.
    pub path: PathBuf,

    /// Members, relative to the checkout, in archive order.
    pub members: Vec<String>,

    /// Archive size in bytes.
    pub size_bytes: u64,

    /// Hex SHA-256 of the archive file.
    pub sha256: String,
}

/// Packs a [`DiffResult`] into a single archive file.
pub struct Archiver<'r, R: ?Sized> {
    runner: &'r R,
    deadline: Option<Duration>,
}

impl<'r, R: CommandRunner + ?Sized> Archiver<'r, R> {
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

    /// `tar czf <target> -- <file>...` rooted at the diff root.
    ///
    /// `--` keeps build outputs named like options from reaching tar as flags.
    pub fn invocation(&self, diff: &DiffResult, target: &Path) -> Invocation {
        Invocation::new("tar")
            .arg("czf")
            .arg(target.to_string_lossy())
            .arg("--")
            .args(diff.files().iter().cloned())
            .current_dir(diff.root())
            .deadline(self.deadline)
    }

    /// Archive every file in `diff` at `destination.<ext>`.
    ///
    /// Returns `Ok(None)` without writing anything for unsupported formats.
    /// An empty diff is always `NoArtifacts`.
    #[instrument(skip(self, diff), fields(root = %diff.root().display(), format = %format))]
    pub async fn archive(
        &self,
        diff: &DiffResult,
        destination: &Path,
        format: &ArchiveFormat,
    ) -> Result<Option<ArchiveReport>> {
        if diff.is_empty() {
            return Err(GleanerError::NoArtifacts(diff.root().display().to_string()));
        }

        match format {
            ArchiveFormat::TarGz => {}
            ArchiveFormat::Unsupported(tag) => {
                warn!(format = %tag, "unsupported archive format, nothing written");
                return Ok(None);
            }
        }

        let destination = absolute(destination)?;
        let target = format.target(&destination);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        self.runner.run(&self.invocation(diff, &target)).await?;

        let (size_bytes, sha256) = digest_file(&target).await?;
        let report = ArchiveReport {
            path: target,
            members: diff.files().to_vec(),
            size_bytes,
            sha256,
        };
        info!(
            path = %report.path.display(),
            members = report.members.len(),
            size_bytes = report.size_bytes,
            "archive written"
        );
        Ok(Some(report))
    }
}

/// Size and hex SHA-256 of `path`, read in chunks.
async fn digest_file(path: &Path) -> Result<(u64, String)> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 64 * 1024];
    let mut size = 0u64;
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        size += n as u64;
    }
    Ok((size, hex::encode(hasher.finalize())))
}

/// Relative destinations are taken from the caller's cwd, not the checkout.
fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}
