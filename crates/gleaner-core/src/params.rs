//! The named parameter bag that describes what to fetch and build.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{GleanerError, Result};
use crate::identity::RepositoryIdentity;

/// Parameter values keyed as `remote`, `org`, `user`, `repo`, `version`,
/// `token`, `goos` and `goarch`. Absent and empty values are equivalent.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Params {
    #[serde(default)]
    pub remote: String,
    #[serde(default)]
    pub org: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub repo: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub goos: String,
    #[serde(default)]
    pub goarch: String,
}

impl Params {
    /// Build from a raw key/value map. Unknown keys are ignored.
    pub fn from_map(map: &BTreeMap<String, String>) -> Self {
        let get = |key: &str| map.get(key).cloned().unwrap_or_default();
        Self {
            remote: get("remote"),
            org: get("org"),
            user: get("user"),
            repo: get("repo"),
            version: get("version"),
            token: get("token"),
            goos: get("goos"),
            goarch: get("goarch"),
        }
    }

    /// Read a JSON object of string values.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "loading parameters");
        let content = std::fs::read_to_string(path)?;
        let map: BTreeMap<String, String> = serde_json::from_str(&content)?;
        debug!(keys = ?map.keys().collect::<Vec<_>>(), "parameters parsed");
        Ok(Self::from_map(&map))
    }

    /// Overlay every non-empty value of `other` onto `self`.
    pub fn merge(mut self, other: Params) -> Self {
        let fields = [
            (&mut self.remote, other.remote),
            (&mut self.org, other.org),
            (&mut self.user, other.user),
            (&mut self.repo, other.repo),
            (&mut self.version, other.version),
            (&mut self.token, other.token),
            (&mut self.goos, other.goos),
            (&mut self.goarch, other.goarch),
        ];
        for (slot, value) in fields {
            if !value.is_empty() {
                *slot = value;
            }
        }
        self
    }

    /// `org/user` when an org is set, `user` otherwise.
    pub fn owner(&self) -> String {
        if self.org.is_empty() {
            self.user.clone()
        } else {
            format!("{}/{}", self.org, self.user)
        }
    }

    /// Build environment derived from the target platform parameters.
    pub fn build_env(&self) -> Vec<(String, String)> {
        let mut env = Vec::new();
        if !self.goos.is_empty() {
            env.push(("GOOS".to_string(), self.goos.clone()));
        }
        if !self.goarch.is_empty() {
            env.push(("GOARCH".to_string(), self.goarch.clone()));
        }
        env
    }

    /// Validate required keys and produce the identity to clone into `work_dir`.
    pub fn identity(&self, work_dir: impl Into<PathBuf>) -> Result<RepositoryIdentity> {
        let required = [
            ("remote", &self.remote),
            ("user", &self.user),
            ("repo", &self.repo),
            ("version", &self.version),
        ];
        for (key, value) in required {
            if value.is_empty() {
                return Err(GleanerError::MissingParam(key));
            }
        }
        if self.repo.contains('/') || self.repo == "." || self.repo == ".." {
            return Err(GleanerError::InvalidParams(format!(
                "repo must be a single path component, got {:?}",
                self.repo
            )));
        }

        Ok(RepositoryIdentity::new(
            self.remote.clone(),
            self.user.clone(),
            self.repo.clone(),
            self.version.clone(),
            work_dir,
        )
        .with_organization(Some(self.org.clone()))
        .with_token(Some(self.token.clone())))
    }
}

impl std::fmt::Debug for Params {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Params")
            .field("remote", &self.remote)
            .field("org", &self.org)
            .field("user", &self.user)
            .field("repo", &self.repo)
            .field("version", &self.version)
            .field("token", &if self.token.is_empty() { "" } else { "***" })
            .field("goos", &self.goos)
            .field("goarch", &self.goarch)
            .finish()
    }
}
