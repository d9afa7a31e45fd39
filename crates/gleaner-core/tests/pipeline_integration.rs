//! End-to-end pipeline tests against a local bare repository.
//!
//! `https://<host>/<owner>/<repo>.git` URLs are rewritten to
//! `file://<remotes>/<owner>/<repo>.git`, so the real git and tar
//! executables do all the work without network access.

use async_trait::async_trait;
use gleaner_core::{
    ArchiveFormat, BoundedRunner, BuildStage, CommandRunner, GleanerError, Invocation, Pipeline,
    PipelineConfig, ProcessError, ProcessOutput, RepositoryIdentity,
};
use std::path::{Path, PathBuf};
use std::process::Command as StdCommand;
use std::sync::Mutex;
use tempfile::TempDir;

struct LocalRemoteRunner {
    remotes: PathBuf,
    inner: BoundedRunner,
    seen: Mutex<Vec<String>>,
}

impl LocalRemoteRunner {
    fn new(remotes: &Path) -> Self {
        Self {
            remotes: remotes.to_path_buf(),
            inner: BoundedRunner::new(),
            seen: Mutex::new(Vec::new()),
        }
    }

    fn rewrite(&self, arg: &str) -> String {
        let Some(rest) = arg.strip_prefix("https://") else {
            return arg.to_string();
        };
        let rest = rest.split_once('@').map_or(rest, |(_, r)| r);
        let path = rest.split_once('/').map_or("", |(_, p)| p);
        format!("file://{}/{}", self.remotes.display(), path)
    }

    fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommandRunner for LocalRemoteRunner {
    async fn run(&self, invocation: &Invocation) -> Result<ProcessOutput, ProcessError> {
        self.seen.lock().unwrap().push(invocation.command_line());
        let mut local = invocation.clone();
        local.args = invocation.args.iter().map(|a| self.rewrite(a)).collect();
        self.inner.run(&local).await
    }
}

fn run_git(dir: &Path, args: &[&str]) {
    let output = StdCommand::new("git")
        .args(["-c", "user.name=test-user", "-c", "user.email=test@example.com"])
        .args(args)
        .current_dir(dir)
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
}

/// Publishes `o/r.git` with a `v1` tag under a fresh remotes root.
fn publish_remote() -> TempDir {
    let remotes = tempfile::tempdir().unwrap();
    let src = remotes.path().join("src");
    std::fs::create_dir_all(&src).unwrap();
    run_git(&src, &["init", "-q"]);
    std::fs::write(src.join("README.md"), "# r\n").unwrap();
    std::fs::write(src.join("main.go"), "package main\n").unwrap();
    run_git(&src, &["add", "."]);
    run_git(&src, &["commit", "-q", "-m", "initial"]);
    run_git(&src, &["tag", "v1"]);

    let owner = remotes.path().join("o");
    std::fs::create_dir_all(&owner).unwrap();
    run_git(
        &owner,
        &["clone", "-q", "--bare", src.to_str().unwrap(), "r.git"],
    );
    remotes
}

fn list_members(archive: &Path) -> Vec<String> {
    let output = StdCommand::new("tar").arg("tzf").arg(archive).output().unwrap();
    assert!(output.status.success());
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(str::to_owned)
        .collect()
}

fn sh(script: &str) -> BuildStage {
    BuildStage::new(vec!["sh".to_string(), "-c".to_string(), script.to_string()])
}

/// Test: build output is discovered and archived, nothing else
#[tokio::test]
async fn test_pipeline_archives_exactly_the_build_output() {
    let remotes = publish_remote();
    let work = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let runner = LocalRemoteRunner::new(remotes.path());

    let identity = RepositoryIdentity::new("example.com", "o", "r", "v1", work.path().join("w"));
    let config = PipelineConfig::new(out.path().join("dest"))
        .with_build(sh("echo artifact > out.bin && echo control > Gleanfile"));

    let report = Pipeline::run(&runner, &identity, &config)
        .await
        .expect("pipeline failed");

    assert_eq!(report.checkout, work.path().join("w").join("r"));
    assert!(report.checkout.join("README.md").is_file());
    assert_eq!(report.files, vec!["out.bin"]);

    let archive = report.archive.expect("tar.gz should be written");
    assert_eq!(archive.path, out.path().join("dest.tar.gz"));
    assert_eq!(list_members(&archive.path), vec!["out.bin"]);

    let stage_names: Vec<&str> = report.stages.iter().map(|s| s.stage.as_str()).collect();
    assert_eq!(stage_names, vec!["probe", "clone", "build", "diff", "archive"]);
}

/// Test: a build that produces nothing fails the run without an archive
#[tokio::test]
async fn test_pipeline_without_build_output_fails_with_no_artifacts() {
    let remotes = publish_remote();
    let work = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let runner = LocalRemoteRunner::new(remotes.path());

    let identity = RepositoryIdentity::new("example.com", "o", "r", "v1", work.path());
    let config = PipelineConfig::new(out.path().join("dest")).with_build(sh("true"));

    let err = Pipeline::run(&runner, &identity, &config).await.unwrap_err();

    assert!(matches!(err, GleanerError::NoArtifacts(_)), "got {err:?}");
    assert!(!out.path().join("dest.tar.gz").exists());
}

/// Test: a failed preflight stops the run before anything is cloned
#[tokio::test]
async fn test_failed_preflight_skips_clone() {
    let remotes = publish_remote();
    let work = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let runner = LocalRemoteRunner::new(remotes.path());

    let identity = RepositoryIdentity::new("example.com", "o", "missing", "v1", work.path());
    let config = PipelineConfig::new(out.path().join("dest"));

    let err = Pipeline::run(&runner, &identity, &config).await.unwrap_err();

    assert!(
        matches!(err, GleanerError::Process(ProcessError::Exit { .. })),
        "got {err:?}"
    );
    let seen = runner.seen();
    assert_eq!(seen.len(), 1);
    assert!(seen[0].starts_with("git ls-remote"));
    assert!(!work.path().join("missing").exists());
}

/// Test: an unknown ref is a clone failure, not a hang
#[tokio::test]
async fn test_clone_of_unknown_ref_fails() {
    let remotes = publish_remote();
    let work = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let runner = LocalRemoteRunner::new(remotes.path());

    let identity = RepositoryIdentity::new("example.com", "o", "r", "v9", work.path());
    let config = PipelineConfig::new(out.path().join("dest")).without_preflight();

    let err = Pipeline::run(&runner, &identity, &config).await.unwrap_err();
    assert!(matches!(err, GleanerError::Process(_)), "got {err:?}");
}

/// Test: the token reaches git but never the recorded command lines
#[tokio::test]
async fn test_token_is_redacted_in_command_lines() {
    let remotes = publish_remote();
    let work = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let runner = LocalRemoteRunner::new(remotes.path());

    let identity = RepositoryIdentity::new("example.com", "o", "r", "v1", work.path())
        .with_token(Some("s3cr3t-token".to_string()));
    let config = PipelineConfig::new(out.path().join("dest"))
        .with_build(sh("echo artifact > out.bin"));

    Pipeline::run(&runner, &identity, &config)
        .await
        .expect("pipeline failed");

    let seen = runner.seen();
    assert!(seen.iter().any(|c| c.contains("https://***@example.com/o/r.git")));
    assert!(seen.iter().all(|c| !c.contains("s3cr3t-token")));
}

/// Test: unsupported archive formats succeed without writing anything
#[tokio::test]
async fn test_unsupported_format_skips_archive() {
    let remotes = publish_remote();
    let work = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let runner = LocalRemoteRunner::new(remotes.path());

    let identity = RepositoryIdentity::new("example.com", "o", "r", "v1", work.path());
    let config = PipelineConfig::new(out.path().join("dest"))
        .with_build(sh("echo artifact > out.bin"))
        .with_format(ArchiveFormat::parse("zip"));

    let report = Pipeline::run(&runner, &identity, &config)
        .await
        .expect("pipeline failed");

    assert_eq!(report.files, vec!["out.bin"]);
    assert!(report.archive.is_none());
    assert_eq!(std::fs::read_dir(out.path()).unwrap().count(), 0);
}
