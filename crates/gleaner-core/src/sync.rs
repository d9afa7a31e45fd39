//! Remote synchronisation: shallow clone and remote preflight probe.

use std::path::PathBuf;
use std::time::Duration;

use tracing::{info, instrument};

use crate::error::{GleanerError, Result};
use crate::identity::{RepositoryIdentity, HTTPS};
use crate::process::{CommandRunner, Invocation};

/// Default wall-clock limit for `git clone`.
pub const CLONE_DEADLINE: Duration = Duration::from_secs(30);

/// Default wall-clock limit for `git ls-remote`.
pub const PROBE_DEADLINE: Duration = Duration::from_secs(5);

/// Fail instead of prompting when credentials are rejected.
const NO_PROMPT: (&str, &str) = ("GIT_TERMINAL_PROMPT", "0");

/// Shallow, single-ref clone of a repository into its work dir.
pub struct Cloner<'r, R: ?Sized> {
    runner: &'r R,
    deadline: Duration,
}

impl<'r, R: CommandRunner + ?Sized> Cloner<'r, R> {
    pub fn new(runner: &'r R) -> Self {
        Self {
            runner,
            deadline: CLONE_DEADLINE,
        }
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    /// `git clone --depth=1 -b <ref> <url>` run from the work dir.
    pub fn invocation(&self, identity: &RepositoryIdentity, scheme: &str) -> Result<Invocation> {
        let url = identity.clone_url(scheme);
        if url.is_empty() {
            return Err(GleanerError::UnsupportedScheme(scheme.to_string()));
        }
        Ok(Invocation::new("git")
            .args(["clone", "--depth=1", "-b", identity.git_ref()])
            .arg(url)
            .current_dir(identity.work_dir())
            .env(NO_PROMPT.0, NO_PROMPT.1)
            .deadline(Some(self.deadline))
            .redact(identity.token()))
    }

    /// Clone `identity` and return the checkout path (`identity.local_path()`).
    ///
    /// Single attempt. The work dir is created when missing.
    #[instrument(
        skip(self, identity),
        fields(repo = %identity.canonical_remote_path().display(), git_ref = %identity.git_ref())
    )]
    pub async fn clone(&self, identity: &RepositoryIdentity, scheme: &str) -> Result<PathBuf> {
        let invocation = self.invocation(identity, scheme)?;
        tokio::fs::create_dir_all(identity.work_dir()).await?;

        let output = self.runner.run(&invocation).await?;

        let path = identity.local_path();
        info!(
            path = %path.display(),
            duration_ms = output.duration.as_millis() as u64,
            "repository cloned"
        );
        Ok(path)
    }
}

/// Cheap credential and reachability check against the remote.
pub struct RemoteProbe<'r, R: ?Sized> {
    runner: &'r R,
    deadline: Duration,
}

impl<'r, R: CommandRunner + ?Sized> RemoteProbe<'r, R> {
    pub fn new(runner: &'r R) -> Self {
        Self {
            runner,
            deadline: PROBE_DEADLINE,
        }
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    /// `git ls-remote <https-url> HEAD`; token embedded when present.
    pub fn invocation(&self, identity: &RepositoryIdentity) -> Invocation {
        Invocation::new("git")
            .arg("ls-remote")
            .arg(identity.clone_url(HTTPS))
            .arg("HEAD")
            .env(NO_PROMPT.0, NO_PROMPT.1)
            .deadline(Some(self.deadline))
            .redact(identity.token())
    }

    #[instrument(
        skip(self, identity),
        fields(repo = %identity.canonical_remote_path().display())
    )]
    pub async fn list_remote(&self, identity: &RepositoryIdentity) -> Result<()> {
        let output = self.runner.run(&self.invocation(identity)).await?;
        info!(
            duration_ms = output.duration.as_millis() as u64,
            head = output.stdout.split_whitespace().next().unwrap_or(""),
            "remote reachable"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProcessError;
    use crate::process::ProcessOutput;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Records invocations and answers with a canned result.
    struct ScriptedRunner {
        seen: Mutex<Vec<Invocation>>,
        timeout: bool,
    }

    impl ScriptedRunner {
        fn ok() -> Self {
            Self {
                seen: Mutex::new(Vec::new()),
                timeout: false,
            }
        }

        fn timing_out() -> Self {
            Self {
                seen: Mutex::new(Vec::new()),
                timeout: true,
            }
        }

        fn seen(&self) -> Vec<Invocation> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CommandRunner for ScriptedRunner {
        async fn run(
            &self,
            invocation: &Invocation,
        ) -> std::result::Result<ProcessOutput, ProcessError> {
            self.seen.lock().unwrap().push(invocation.clone());
            if self.timeout {
                return Err(ProcessError::Timeout {
                    command: invocation.command_line(),
                    limit: invocation.deadline.unwrap_or_default(),
                    pid: None,
                });
            }
            Ok(ProcessOutput {
                stdout: "0123abcd\tHEAD\n".to_string(),
                stderr: String::new(),
                duration: Duration::from_millis(1),
            })
        }
    }

    fn identity(work_dir: &std::path::Path) -> RepositoryIdentity {
        RepositoryIdentity::new("example.com", "o", "r", "v1", work_dir)
            .with_token(Some("sekrit".to_string()))
    }

    #[tokio::test]
    async fn test_clone_command_line_and_deadline() {
        let dir = tempfile::tempdir().unwrap();
        let work_dir = dir.path().join("work");
        let runner = ScriptedRunner::ok();

        let path = Cloner::new(&runner)
            .clone(&identity(&work_dir), HTTPS)
            .await
            .expect("clone failed");

        assert_eq!(path, work_dir.join("r"));
        assert!(work_dir.is_dir(), "work dir should be created");

        let seen = runner.seen();
        assert_eq!(seen.len(), 1);
        let inv = &seen[0];
        assert_eq!(inv.program, "git");
        assert_eq!(
            inv.args,
            vec![
                "clone",
                "--depth=1",
                "-b",
                "v1",
                "https://sekrit@example.com/o/r.git"
            ]
        );
        assert_eq!(inv.current_dir.as_deref(), Some(work_dir.as_path()));
        assert_eq!(inv.deadline, Some(CLONE_DEADLINE));
        assert!(!inv.command_line().contains("sekrit"));
    }

    #[tokio::test]
    async fn test_clone_unsupported_scheme_fails_before_spawn() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ScriptedRunner::ok();

        let err = Cloner::new(&runner)
            .clone(&identity(dir.path()), "ssh")
            .await
            .unwrap_err();

        assert!(matches!(err, GleanerError::UnsupportedScheme(ref s) if s == "ssh"));
        assert!(runner.seen().is_empty());
    }

    #[tokio::test]
    async fn test_clone_timeout_propagates() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ScriptedRunner::timing_out();

        let err = Cloner::new(&runner)
            .with_deadline(Duration::from_secs(2))
            .clone(&identity(dir.path()), HTTPS)
            .await
            .unwrap_err();

        assert!(err.is_timeout());
        assert_eq!(runner.seen()[0].deadline, Some(Duration::from_secs(2)));
    }

    #[tokio::test]
    async fn test_probe_queries_head_only_with_short_deadline() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ScriptedRunner::ok();

        RemoteProbe::new(&runner)
            .list_remote(&identity(dir.path()))
            .await
            .expect("probe failed");

        let seen = runner.seen();
        assert_eq!(
            seen[0].args,
            vec!["ls-remote", "https://sekrit@example.com/o/r.git", "HEAD"]
        );
        assert_eq!(seen[0].deadline, Some(PROBE_DEADLINE));
        assert!(seen[0]
            .envs
            .contains(&("GIT_TERMINAL_PROMPT".to_string(), "0".to_string())));
    }

    #[tokio::test]
    async fn test_probe_timeout_propagates() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ScriptedRunner::timing_out();

        let err = RemoteProbe::new(&runner)
            .list_remote(&identity(dir.path()))
            .await
            .unwrap_err();
        assert!(err.is_timeout());
    }
}
