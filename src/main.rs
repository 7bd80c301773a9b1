//! hudsync command line tools.
//!
//! Inspect stored regions, render them over a screenshot, or run the
//! sampling pipeline against a still frame with the configured worker.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use hudsync::calibration::render_regions;
use hudsync::capture::{ScreenRect, StillFrameSource};
use hudsync::config::{self, AppConfig};
use hudsync::host::{HostResolver, MemoryDesktop, MemoryTargets};
use hudsync::ocr::{OcrGateway, ProcessSpawner};
use hudsync::pipeline::{PipelineDeps, SamplingPipeline, TickOutcome};
use hudsync::regions::{RegionStore, RegionVisibilityStore};
use hudsync::role::OverlayRole;
use hudsync::{logging, paths};

/// Window id of the simulated host in `sample`.
const SAMPLE_WINDOW: u64 = 1;

#[derive(Parser, Debug)]
#[command(name = "hudsync", version, about = "HUD region tracking and calibration tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print a profile's stored regions as JSON
    Regions { profile: String },
    /// Draw a profile's regions over a screenshot
    Preview {
        screenshot: PathBuf,
        profile: String,
        out: PathBuf,
    },
    /// Run the sampling pipeline against a still screenshot
    Sample {
        screenshot: PathBuf,
        profile: String,
        /// Number of sampling ticks
        #[arg(default_value_t = 3)]
        ticks: u32,
        /// Overlay role to sample as (fighter or support)
        #[arg(long, default_value = "fighter")]
        role: OverlayRole,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    paths::ensure_directories().context("failed to create data directories")?;
    logging::install_panic_hook();
    logging::init();
    config::init_config();

    match cli.command {
        Commands::Regions { profile } => print_regions(&profile),
        Commands::Preview {
            screenshot,
            profile,
            out,
        } => write_preview(&screenshot, &profile, &out),
        Commands::Sample {
            screenshot,
            profile,
            ticks,
            role,
        } => {
            let runtime = tokio::runtime::Runtime::new().context("failed to start runtime")?;
            runtime.block_on(sample(config::get_config(), screenshot, profile, ticks, role))
        }
    }
}

fn print_regions(profile: &str) -> Result<()> {
    let store = RegionStore::open_default();
    let regions = store
        .get(profile)
        .with_context(|| format!("failed to read {}", store.path().display()))?
        .unwrap_or_default();
    println!("{}", serde_json::to_string_pretty(&regions)?);
    Ok(())
}

fn write_preview(screenshot: &Path, profile: &str, out: &Path) -> Result<()> {
    let shot = image::open(screenshot)
        .with_context(|| format!("failed to open {}", screenshot.display()))?
        .to_rgba8();
    let regions = RegionStore::open_default().get(profile)?.unwrap_or_default();
    if regions.is_empty() {
        log::warn!("[regions] profile {} has no calibrated regions", profile);
    }
    render_regions(&shot, &regions, None)
        .save(out)
        .with_context(|| format!("failed to write {}", out.display()))?;
    log::info!("[regions] preview written to {}", out.display());
    Ok(())
}

async fn sample(
    config: &AppConfig,
    screenshot: PathBuf,
    profile: String,
    ticks: u32,
    role: OverlayRole,
) -> Result<()> {
    let frames = StillFrameSource::open(&screenshot)
        .with_context(|| format!("failed to open {}", screenshot.display()))?;
    let (width, height) = frames.dimensions();

    let desktop = Arc::new(MemoryDesktop::new());
    desktop.add_window(SAMPLE_WINDOW, ScreenRect::new(0, 0, width as i32, height as i32));
    desktop.register_instance(&profile, SAMPLE_WINDOW);
    let targets = Arc::new(MemoryTargets::new());
    targets.set(role, Some(&profile));

    let gateway = Arc::new(OcrGateway::new(
        Arc::new(ProcessSpawner::new(config.worker.clone())),
        config.worker.timeout(),
    ));
    let deps = PipelineDeps {
        resolver: Arc::new(HostResolver::standard(
            desktop.clone(),
            desktop.clone(),
            desktop.clone(),
            desktop.clone(),
        )),
        frames: Arc::new(frames),
        gateway: gateway.clone(),
        regions: Arc::new(RegionStore::open_default()),
        visibility: Arc::new(RegionVisibilityStore::open_default()),
        targets,
    };
    let pipeline = SamplingPipeline::new(role, config.sampling.clone(), config.glitch.clone(), deps)
        .with_debug_dir(paths::get_ocr_debug_dir());

    gateway.acquire().await;
    pipeline.refresh_from_store();
    for tick in 1..=ticks {
        let outcome = pipeline.tick().await;
        log::info!("[sampler] tick {}: {:?}", tick, outcome);
        if outcome == TickOutcome::Published {
            println!("{}", serde_json::to_string(&pipeline.latest())?);
        }
        if tick < ticks {
            tokio::time::sleep(config.sampling.interval()).await;
        }
    }
    gateway.release().await;
    Ok(())
}
