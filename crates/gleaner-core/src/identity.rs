//! Repository identity and clone URL derivation.

use std::fmt;
use std::path::{Path, PathBuf};

/// The only clone scheme gleaner knows how to build a URL for.
pub const HTTPS: &str = "https";

/// Immutable description of a remote-hosted repository and where it is
/// checked out locally.
#[derive(Clone, PartialEq, Eq)]
pub struct RepositoryIdentity {
    remote_host: String,
    organization: Option<String>,
    user: String,
    repo_name: String,
    git_ref: String,
    token: Option<String>,
    work_dir: PathBuf,
}

impl RepositoryIdentity {
    /// Create an identity without organization or token.
    pub fn new(
        remote_host: impl Into<String>,
        user: impl Into<String>,
        repo_name: impl Into<String>,
        git_ref: impl Into<String>,
        work_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            remote_host: remote_host.into(),
            organization: None,
            user: user.into(),
            repo_name: repo_name.into(),
            git_ref: git_ref.into(),
            token: None,
            work_dir: work_dir.into(),
        }
    }

    /// Set the organization. Empty strings are treated as absent.
    pub fn with_organization(mut self, organization: Option<String>) -> Self {
        self.organization = organization.filter(|o| !o.is_empty());
        self
    }

    /// Set the auth token. Empty strings are treated as absent.
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token.filter(|t| !t.is_empty());
        self
    }

    pub fn remote_host(&self) -> &str {
        &self.remote_host
    }

    pub fn organization(&self) -> Option<&str> {
        self.organization.as_deref()
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn repo_name(&self) -> &str {
        &self.repo_name
    }

    /// Branch, tag or version to check out.
    pub fn git_ref(&self) -> &str {
        &self.git_ref
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// `organization/user` when an organization is set, `user` otherwise.
    pub fn owner(&self) -> String {
        match &self.organization {
            Some(org) => format!("{org}/{}", self.user),
            None => self.user.clone(),
        }
    }

    /// Clone URL for `scheme`.
    ///
    /// Only [`HTTPS`] is defined; every other scheme yields an empty string.
    /// A token, when present, is embedded as the URL userinfo.
    pub fn clone_url(&self, scheme: &str) -> String {
        match scheme {
            HTTPS => {
                let credential = self
                    .token
                    .as_deref()
                    .map(|t| format!("{t}@"))
                    .unwrap_or_default();
                format!(
                    "https://{credential}{}/{}/{}.git",
                    self.remote_host,
                    self.owner(),
                    self.repo_name
                )
            }
            _ => String::new(),
        }
    }

    /// Directory the clone lands in: `work_dir/repo_name`.
    pub fn local_path(&self) -> PathBuf {
        self.work_dir.join(&self.repo_name)
    }

    /// Layout-independent identity path: `remote_host/owner/repo_name`.
    pub fn canonical_remote_path(&self) -> PathBuf {
        Path::new(&self.remote_host)
            .join(self.owner())
            .join(&self.repo_name)
    }
}

impl fmt::Debug for RepositoryIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RepositoryIdentity")
            .field("remote_host", &self.remote_host)
            .field("organization", &self.organization)
            .field("user", &self.user)
            .field("repo_name", &self.repo_name)
            .field("git_ref", &self.git_ref)
            .field("token", &self.token.as_ref().map(|_| "***"))
            .field("work_dir", &self.work_dir)
            .finish()
    }
}
