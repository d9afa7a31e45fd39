//! Gleaner CLI
//!
//! The `gleaner` command clones a pinned ref, runs a build inside it and
//! packages the files the build produced.
//!
//! ## Commands
//!
//! - `probe`: Check that the remote is reachable with the given credentials
//! - `clone`: Shallow-clone the ref into a work directory
//! - `harvest`: Archive the untracked files of an existing checkout
//! - `run`: probe, clone, build, harvest in one go

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use gleaner_core::{
    ArchiveFormat, Archiver, BoundedRunner, BuildStage, Cloner, Deadlines, DiffScanner, Params,
    Pipeline, PipelineConfig, PipelineReport, RemoteProbe,
};
use std::path::{Path, PathBuf};
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "gleaner")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Clone a ref, build it, package only the new files", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check remote reachability and credentials without cloning
    Probe {
        #[command(flatten)]
        repo: RepoArgs,

        /// Probe deadline in seconds
        #[arg(long, default_value = "5")]
        timeout: u64,
    },

    /// Shallow-clone the configured ref into a work directory
    Clone {
        #[command(flatten)]
        repo: RepoArgs,

        /// Directory the repository is cloned into
        #[arg(short, long)]
        work_dir: PathBuf,

        /// Clone scheme (only https is supported)
        #[arg(long, default_value = "https")]
        scheme: String,

        /// Clone deadline in seconds
        #[arg(long, default_value = "30")]
        timeout: u64,
    },

    /// Archive the untracked files of an existing checkout
    Harvest {
        /// Checkout directory to scan
        #[arg(short, long, default_value = ".")]
        checkout: PathBuf,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Probe, clone, build and harvest
    Run {
        #[command(flatten)]
        repo: RepoArgs,

        /// Work directory (default: a temporary directory removed afterwards)
        #[arg(short, long)]
        work_dir: Option<PathBuf>,

        #[command(flatten)]
        output: OutputArgs,

        /// Skip the ls-remote preflight
        #[arg(long)]
        no_preflight: bool,

        /// Clone deadline in seconds
        #[arg(long, default_value = "30")]
        clone_timeout: u64,

        /// Probe deadline in seconds
        #[arg(long, default_value = "5")]
        probe_timeout: u64,

        /// Build deadline in seconds (default: unbounded)
        #[arg(long)]
        build_timeout: Option<u64>,

        /// Build command, run inside the checkout
        #[arg(last = true)]
        build: Vec<String>,
    },
}

/// Where the repository lives and which ref to fetch.
#[derive(Args, Debug, Default)]
struct RepoArgs {
    /// JSON file with remote/org/user/repo/version/token/goos/goarch keys
    #[arg(long, env = "GLEANER_PARAMS")]
    params: Option<PathBuf>,

    /// Remote host, e.g. github.com
    #[arg(long, env = "GLEANER_REMOTE")]
    remote: Option<String>,

    /// Organization (optional)
    #[arg(long, env = "GLEANER_ORG")]
    org: Option<String>,

    /// User or owner
    #[arg(long, env = "GLEANER_USER")]
    user: Option<String>,

    /// Repository name
    #[arg(long, env = "GLEANER_REPO")]
    repo: Option<String>,

    /// Branch, tag or version to check out
    #[arg(long = "ref", env = "GLEANER_REF")]
    git_ref: Option<String>,

    /// Auth token embedded in the https URL
    #[arg(long, env = "GLEANER_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Target OS exported to the build as GOOS
    #[arg(long, env = "GLEANER_GOOS")]
    goos: Option<String>,

    /// Target architecture exported to the build as GOARCH
    #[arg(long, env = "GLEANER_GOARCH")]
    goarch: Option<String>,
}

impl RepoArgs {
    /// Parameters file first, flags and environment on top.
    fn params(&self) -> Result<Params> {
        let base = match &self.params {
            Some(path) => Params::load(path)
                .with_context(|| format!("Failed to load parameters from {}", path.display()))?,
            None => Params::default(),
        };
        let flag = |v: &Option<String>| v.clone().unwrap_or_default();
        Ok(base.merge(Params {
            remote: flag(&self.remote),
            org: flag(&self.org),
            user: flag(&self.user),
            repo: flag(&self.repo),
            version: flag(&self.git_ref),
            token: flag(&self.token),
            goos: flag(&self.goos),
            goarch: flag(&self.goarch),
        }))
    }
}

#[derive(Args, Debug)]
struct OutputArgs {
    /// Archive base path; the format extension is appended
    #[arg(short, long, default_value = "artifacts")]
    dest: PathBuf,

    /// Archive format
    #[arg(short, long, default_value = "tar.gz")]
    format: String,

    /// Report format printed on success
    #[arg(long, value_enum, default_value_t = ReportFormat::Text)]
    report: ReportFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum ReportFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    gleaner_core::init_tracing(cli.json, level);

    match cli.command {
        Commands::Probe { repo, timeout } => cmd_probe(&repo, timeout).await,
        Commands::Clone {
            repo,
            work_dir,
            scheme,
            timeout,
        } => cmd_clone(&repo, &work_dir, &scheme, timeout).await,
        Commands::Harvest { checkout, output } => cmd_harvest(&checkout, &output).await,
        Commands::Run {
            repo,
            work_dir,
            output,
            no_preflight,
            clone_timeout,
            probe_timeout,
            build_timeout,
            build,
        } => {
            let deadlines = Deadlines {
                clone_secs: clone_timeout,
                probe_secs: probe_timeout,
                build_secs: build_timeout,
                ..Deadlines::default()
            };
            cmd_run(&repo, work_dir, &output, !no_preflight, deadlines, build).await
        }
    }
}

/// Check the remote answers for HEAD
async fn cmd_probe(repo: &RepoArgs, timeout: u64) -> Result<()> {
    let identity = repo.params()?.identity(".")?;
    let runner = BoundedRunner::new();

    RemoteProbe::new(&runner)
        .with_deadline(std::time::Duration::from_secs(timeout))
        .list_remote(&identity)
        .await
        .with_context(|| {
            format!(
                "Remote {} is not reachable",
                identity.canonical_remote_path().display()
            )
        })?;

    println!("✓ {} reachable", identity.canonical_remote_path().display());
    Ok(())
}

/// Clone into an explicit work dir
async fn cmd_clone(repo: &RepoArgs, work_dir: &Path, scheme: &str, timeout: u64) -> Result<()> {
    let identity = repo.params()?.identity(work_dir)?;
    let runner = BoundedRunner::new();

    let path = Cloner::new(&runner)
        .with_deadline(std::time::Duration::from_secs(timeout))
        .clone(&identity, scheme)
        .await
        .context("Clone failed")?;

    println!(
        "✓ cloned {}@{} into {}",
        identity.canonical_remote_path().display(),
        identity.git_ref(),
        path.display()
    );
    Ok(())
}

/// Diff and archive an existing checkout
async fn cmd_harvest(checkout: &Path, output: &OutputArgs) -> Result<()> {
    let runner = BoundedRunner::new();
    let diff = DiffScanner::new(&runner).scan(checkout.to_path_buf()).await;
    let format = ArchiveFormat::parse(&output.format);

    let archive = Archiver::new(&runner)
        .archive(&diff, &output.dest, &format)
        .await
        .context("Harvest failed")?;

    let report = PipelineReport {
        checkout: checkout.to_path_buf(),
        files: diff.files().to_vec(),
        archive,
        stages: Vec::new(),
        duration_ms: 0,
    };
    print!("{}", render_report(&report, output.report)?);
    Ok(())
}

/// Whole pipeline
async fn cmd_run(
    repo: &RepoArgs,
    work_dir: Option<PathBuf>,
    output: &OutputArgs,
    preflight: bool,
    deadlines: Deadlines,
    build: Vec<String>,
) -> Result<()> {
    let params = repo.params()?;

    // Keep the temp dir alive until the archive is written.
    let scratch;
    let work_dir = match work_dir {
        Some(dir) => dir,
        None => {
            scratch = tempfile::tempdir().context("Failed to create scratch directory")?;
            scratch.path().to_path_buf()
        }
    };

    let identity = params.identity(&work_dir)?;
    let mut config = PipelineConfig::new(&output.dest)
        .with_format(ArchiveFormat::parse(&output.format))
        .with_deadlines(deadlines);
    if !preflight {
        config = config.without_preflight();
    }
    if !build.is_empty() {
        config = config.with_build(BuildStage::new(build).with_env(params.build_env()));
    }

    info!(work_dir = %work_dir.display(), "running pipeline");
    let runner = BoundedRunner::new();
    let report = Pipeline::run(&runner, &identity, &config)
        .await
        .context("Pipeline failed")?;

    print!("{}", render_report(&report, output.report)?);
    Ok(())
}

fn render_report(report: &PipelineReport, format: ReportFormat) -> Result<String> {
    if format == ReportFormat::Json {
        return Ok(format!("{}\n", serde_json::to_string_pretty(report)?));
    }

    let mut out = String::new();
    out.push_str(&format!("Checkout: {}\n", report.checkout.display()));
    for stage in &report.stages {
        out.push_str(&format!("  ✓ {} ({}ms)\n", stage.stage, stage.duration_ms));
    }
    out.push_str(&format!("Files: {}\n", report.files.len()));
    for file in &report.files {
        out.push_str(&format!("  - {file}\n"));
    }
    match &report.archive {
        Some(archive) => {
            out.push_str(&format!(
                "Archive: {} ({} bytes)\n",
                archive.path.display(),
                archive.size_bytes
            ));
            out.push_str(&format!("SHA-256: {}\n", archive.sha256));
        }
        None => out.push_str("Archive: skipped (unsupported format)\n"),
    }
    Ok(out)
}
