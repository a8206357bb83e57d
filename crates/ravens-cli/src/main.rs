use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use burn::backend::Autodiff;
use burn_ndarray::NdArray;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use ravens_io::{read_nifti, TransformExporter};
use ravens_registration::{
    CancellationToken, LevelContext, ProgressCallback, ProgressInfo, ProgressTracker, Profile,
    RegistrationOrchestrator, Stage,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

type Backend = Autodiff<NdArray<f32>>;

#[derive(Parser)]
#[command(name = "ravens-register")]
#[command(about = "Register a moving volume to a fixed volume (moments, affine, deformable)")]
struct Cli {
    /// Fixed (reference) NIfTI volume
    #[arg(long)]
    fixed: PathBuf,

    /// Moving NIfTI volume
    #[arg(long)]
    moving: PathBuf,

    /// Output prefix; file names are appended verbatim (e.g. out/subj_)
    #[arg(long)]
    out_prefix: PathBuf,

    /// Registration profile (default, quick, balanced, test)
    #[arg(long, default_value = "default")]
    profile: Profile,

    /// Skip the moments initialization
    #[arg(long)]
    no_moments: bool,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

/// Progress bar per pyramid level.
struct BarProgress {
    bar: ProgressBar,
}

impl BarProgress {
    fn new() -> Result<Self> {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] {prefix:>18} [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
                .progress_chars("#>-"),
        );
        Ok(Self { bar })
    }
}

impl ProgressCallback for BarProgress {
    fn on_progress(&self, info: &ProgressInfo) {
        self.bar.set_position(info.iteration as u64);
        self.bar.set_message(format!("loss {:.5}", info.loss));
    }

    fn on_level_start(&self, context: &LevelContext, iterations: usize) {
        self.bar.reset();
        self.bar.set_length(iterations as u64);
        self.bar.set_prefix(format!(
            "{} {}/{} (x{})",
            context.stage,
            context.level + 1,
            context.levels,
            context.factor
        ));
    }

    fn on_stage_complete(&self, stage: Stage) {
        if stage == Stage::Deformable {
            self.bar.finish_and_clear();
        }
    }

    fn on_error(&self, error: &str) {
        self.bar.abandon_with_message(error.to_string());
    }
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    Ok(std::env::current_dir()
        .context("Failed to resolve the working directory")?
        .join(path))
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let fixed_path = std::fs::canonicalize(&cli.fixed)
        .with_context(|| format!("Fixed volume not found: {}", cli.fixed.display()))?;
    let moving_path = std::fs::canonicalize(&cli.moving)
        .with_context(|| format!("Moving volume not found: {}", cli.moving.display()))?;
    let out_prefix = absolute(&cli.out_prefix)?;

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        ctrlc::set_handler(move || {
            tracing::warn!("Interrupted, stopping at the next checkpoint");
            cancel.cancel();
        })
        .context("Failed to install the Ctrl-C handler")?;
    }

    let device = Default::default();
    info!("Fixed: {}", fixed_path.display());
    info!("Moving: {}", moving_path.display());
    let fixed = read_nifti::<Backend, _>(&fixed_path, &device)?;
    let moving = read_nifti::<Backend, _>(&moving_path, &device)?;

    let mut progress = ProgressTracker::new();
    progress.add_callback(Arc::new(BarProgress::new()?));

    let mut orchestrator = RegistrationOrchestrator::from_profile(cli.profile)
        .with_moments(!cli.no_moments)
        .with_cancellation(cancel)
        .with_progress(progress);
    let mut exporter = TransformExporter::new(&out_prefix);

    orchestrator
        .run_and_export(&fixed, &moving, &mut exporter)
        .with_context(|| format!("Registration of {} failed", moving_path.display()))?;

    for path in exporter.paths().expected(!cli.no_moments) {
        println!("{}", path.display());
    }
    Ok(())
}
