//! Clone → build → diff → archive orchestration.

use std::path::PathBuf;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::archive::{ArchiveReport, Archiver};
use crate::config::{BuildStage, PipelineConfig};
use crate::diff::DiffScanner;
use crate::error::{GleanerError, Result};
use crate::identity::RepositoryIdentity;
use crate::process::{CommandRunner, Invocation};
use crate::sync::{Cloner, RemoteProbe};

/// Timing of one executed stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageTiming {
    pub stage: String,
    pub duration_ms: u64,
}

/// Result of a complete pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineReport {
    /// Checkout directory.
    pub checkout: PathBuf,

    /// Harvested files, relative to the checkout.
    pub files: Vec<String>,

    /// `None` when the format was unsupported and archiving was skipped.
    pub archive: Option<ArchiveReport>,

    /// Stages in execution order.
    pub stages: Vec<StageTiming>,

    /// Total duration in milliseconds.
    pub duration_ms: u64,
}

/// Sequential pipeline over a single repository.
pub struct Pipeline;

impl Pipeline {
    /// Run every stage in order. The first failure aborts the run.
    #[instrument(
        skip(runner, identity, config),
        fields(repo = %identity.canonical_remote_path().display(), git_ref = %identity.git_ref())
    )]
    pub async fn run<R: CommandRunner + ?Sized>(
        runner: &R,
        identity: &RepositoryIdentity,
        config: &PipelineConfig,
    ) -> Result<PipelineReport> {
        let start = Instant::now();
        let deadlines = &config.deadlines;
        let mut stages = Vec::new();

        info!("starting pipeline");

        if config.preflight {
            let t = Instant::now();
            RemoteProbe::new(runner)
                .with_deadline(deadlines.probe_limit())
                .list_remote(identity)
                .await?;
            stages.push(timing("probe", t));
        }

        let t = Instant::now();
        let checkout = Cloner::new(runner)
            .with_deadline(deadlines.clone_limit())
            .clone(identity, &config.scheme)
            .await?;
        stages.push(timing("clone", t));

        if let Some(build) = &config.build {
            let t = Instant::now();
            let invocation = build_invocation(build, identity)?
                .deadline(deadlines.build_limit());
            info!(command = %invocation, "running build");
            runner.run(&invocation).await?;
            stages.push(timing("build", t));
        }

        let t = Instant::now();
        let diff = DiffScanner::new(runner)
            .with_deadline(deadlines.diff_limit())
            .diff(identity)
            .await;
        stages.push(timing("diff", t));

        let t = Instant::now();
        let archive = Archiver::new(runner)
            .with_deadline(deadlines.archive_limit())
            .archive(&diff, &config.destination, &config.format)
            .await?;
        stages.push(timing("archive", t));

        let duration_ms = start.elapsed().as_millis() as u64;
        info!(files = diff.len(), duration_ms, "pipeline completed");

        Ok(PipelineReport {
            checkout,
            files: diff.files().to_vec(),
            archive,
            stages,
            duration_ms,
        })
    }
}

/// Build command rooted at the checkout.
pub fn build_invocation(build: &BuildStage, identity: &RepositoryIdentity) -> Result<Invocation> {
    let (program, args) = build
        .command
        .split_first()
        .ok_or_else(|| GleanerError::InvalidParams("build command is empty".to_string()))?;

    let mut invocation = Invocation::new(program.clone())
        .args(args.iter().cloned())
        .current_dir(identity.local_path())
        .redact(identity.token());
    for (key, value) in &build.env {
        invocation = invocation.env(key.clone(), value.clone());
    }
    Ok(invocation)
}

fn timing(stage: &str, started: Instant) -> StageTiming {
    StageTiming {
        stage: stage.to_string(),
        duration_ms: started.elapsed().as_millis() as u64,
    }
}
