//! vertex-gi CLI - bakes the demonstration scene and reports per-bounce statistics.

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use glam::Vec3;
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use vertex_gi::prelude::*;
use vertex_gi::scene::primitives::{demo_scene, DEMO_TARGET};

#[cfg(feature = "trace-chrome")]
type TraceGuard = tracing_chrome::FlushGuard;
#[cfg(not(feature = "trace-chrome"))]
type TraceGuard = ();

#[derive(Parser)]
#[command(name = "vertex-gi")]
#[command(about = "Progressive per-vertex GI baker", long_about = None)]
#[command(version)]
struct Cli {
    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Bake the demonstration scene (a torus in a colored room)
    Bake {
        /// Sample renderer
        #[arg(short, long, value_enum, default_value_t = Backend::Software)]
        backend: Backend,

        /// Number of bounces (overrides the config file)
        #[arg(long)]
        bounces: Option<u32>,

        /// Vertices sampled per tick (overrides the config file)
        #[arg(long)]
        batch: Option<usize>,

        /// Sample target side length in pixels (overrides the config file)
        #[arg(long)]
        resolution: Option<u32>,

        /// Clamp baked colors to [0, 1]
        #[arg(long)]
        clamp: bool,

        /// JSON bake configuration
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Write the effective configuration to this file
        #[arg(long)]
        save_config: Option<PathBuf>,

        /// Torus tessellation
        #[arg(long, default_value_t = 32)]
        segments: u32,
    },
    /// Print build information
    Info,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Backend {
    Software,
    Gpu,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let level = match (cli.quiet, cli.verbose) {
        (true, _) => "error",
        (false, 0) => "info",
        (false, 1) => "debug",
        (false, _) => "trace",
    };
    let _trace_guard = init_tracing(level);

    match cli.command {
        Commands::Bake {
            backend,
            bounces,
            batch,
            resolution,
            clamp,
            config,
            save_config,
            segments,
        } => {
            let mut config = match config {
                Some(path) => BakeConfig::load(&path)
                    .with_context(|| format!("loading config {}", path.display()))?,
                None => BakeConfig::default(),
            };
            if let Some(bounces) = bounces {
                config.max_bounces = bounces;
            }
            if let Some(batch) = batch {
                config.batch_size = batch;
            }
            if let Some(resolution) = resolution {
                config.sample_resolution = resolution;
            }
            config.clamp_channels |= clamp;
            config.validate()?;

            if let Some(path) = save_config {
                config.save(&path)
                    .with_context(|| format!("saving config {}", path.display()))?;
            }

            let renderer = create_backend(backend)?;
            bake(renderer, config, segments, cli.quiet)
        }
        Commands::Info => {
            cmd_info();
            Ok(())
        }
    }
}

fn init_tracing(level: &str) -> Option<TraceGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);
    let registry = tracing_subscriber::registry().with(filter).with(fmt_layer);

    #[cfg(feature = "trace-chrome")]
    if std::env::var("VERTEX_GI_TRACE").ok().as_deref() == Some("1") {
        let (chrome_layer, guard) = tracing_chrome::ChromeLayerBuilder::new()
            .file("trace.json")
            .build();
        if registry.with(chrome_layer).try_init().is_err() {
            eprintln!("tracing subscriber already installed, chrome trace disabled");
            return None;
        }
        return Some(guard);
    }

    if registry.try_init().is_err() {
        eprintln!("tracing subscriber already installed, keeping it");
    }
    None
}

fn create_backend(backend: Backend) -> Result<Box<dyn RenderBackend>> {
    match backend {
        Backend::Software => Ok(Box::new(SoftwareRenderer::new())),
        #[cfg(feature = "gpu")]
        Backend::Gpu => Ok(Box::new(GpuRenderer::new_headless()?)),
        #[cfg(not(feature = "gpu"))]
        Backend::Gpu => bail!("GPU backend not available. Rebuild with: cargo build --features gpu"),
    }
}

/// Mean color and luminance range of the baked vertices.
struct ColorSummary {
    mean: Vec3,
    min_luma: f32,
    max_luma: f32,
}

fn summarize(colors: &VertexColors) -> Option<ColorSummary> {
    if colors.is_empty() {
        return None;
    }
    let luma = |c: Vec3| c.dot(Vec3::new(0.2126, 0.7152, 0.0722));
    let mut sum = Vec3::ZERO;
    let mut min_luma = f32::INFINITY;
    let mut max_luma = f32::NEG_INFINITY;
    for c in colors.as_slice() {
        let c = Vec3::from_array(*c);
        sum += c;
        min_luma = min_luma.min(luma(c));
        max_luma = max_luma.max(luma(c));
    }
    Some(ColorSummary {
        mean: sum / colors.len() as f32,
        min_luma,
        max_luma,
    })
}

fn target_colors<S: Sampler>(engine: &Engine<S>) -> Option<&VertexColors> {
    engine
        .scene()
        .find(engine.target())?
        .mesh
        .as_ref()?
        .colors
        .as_ref()
}

fn bake(renderer: Box<dyn RenderBackend>, config: BakeConfig, segments: u32, quiet: bool) -> Result<()> {
    let scene = demo_scene(segments);
    let mut engine = Engine::new(renderer, scene, DEMO_TARGET, config);
    if let Some(err) = engine.take_error() {
        bail!("engine inert: {err}");
    }

    let state = engine.state();
    let total = state.vertex_count as u64 * engine.config().max_bounces as u64;
    let progress = if quiet { ProgressBar::hidden() } else { ProgressBar::new(total) };
    progress.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} bounce {msg} [{bar:40.cyan/blue}] {pos}/{len} samples ({eta})")?
            .progress_chars("=> "),
    );
    progress.set_message(format!("1/{}", engine.config().max_bounces));

    let start = Instant::now();
    let mut bounce_start = Instant::now();
    let mut uploads = 0usize;
    let mut uploaded_floats = 0usize;

    loop {
        let before = engine.stats();
        let tick = engine.tick()?;
        let after = engine.stats();
        progress.inc(after.samples_taken + after.samples_skipped - before.samples_taken - before.samples_skipped);

        if let Some(range) = engine.flush() {
            uploads += 1;
            uploaded_floats += range.len();
        }

        if tick != Tick::Continuing && after.bounces_completed > before.bounces_completed {
            let bounce = after.bounces_completed;
            let elapsed = bounce_start.elapsed();
            if let Some(summary) = target_colors(&engine).and_then(summarize) {
                progress.suspend(|| {
                    println!(
                        "bounce {bounce}: mean rgb ({:.3}, {:.3}, {:.3}), luma [{:.3}, {:.3}], {:.2?}",
                        summary.mean.x,
                        summary.mean.y,
                        summary.mean.z,
                        summary.min_luma,
                        summary.max_luma,
                        elapsed,
                    );
                });
            }
            progress.set_message(format!(
                "{}/{}",
                (bounce + 1).min(engine.config().max_bounces),
                engine.config().max_bounces
            ));
            bounce_start = Instant::now();
        }

        if tick == Tick::Done {
            break;
        }
    }
    progress.finish_and_clear();

    if let Some(err) = engine.take_error() {
        bail!("bake stopped: {err}");
    }

    let stats = engine.stats();
    println!(
        "baked {} vertices x {} bounces: {} samples ({} skipped), {} batches, {} uploads ({} floats) in {:.2?}",
        engine.state().vertex_count,
        stats.bounces_completed,
        stats.samples_taken,
        stats.samples_skipped,
        stats.batches,
        uploads,
        uploaded_floats,
        start.elapsed(),
    );
    Ok(())
}

fn cmd_info() {
    let date = option_env!("VERTEX_GI_BUILD_DATE").unwrap_or("unknown");
    let time = option_env!("VERTEX_GI_BUILD_TIME").unwrap_or("unknown");
    println!("vertex-gi {} (built {} {})", env!("CARGO_PKG_VERSION"), date, time);
    println!("  gpu backend:  {}", if cfg!(feature = "gpu") { "yes" } else { "no" });
    println!("  chrome trace: {}", if cfg!(feature = "trace-chrome") { "yes" } else { "no" });

    let scene = demo_scene(32);
    let vertices = scene
        .find(DEMO_TARGET)
        .and_then(|obj| obj.mesh.as_ref())
        .map_or(0, |mesh| mesh.vertex_count());
    println!("  demo scene:   {} objects, target '{}' with {} vertices", scene.object_count(), DEMO_TARGET, vertices);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_tracing_twice() {
        init_tracing("info");
        // A second install is reported, not fatal.
        assert!(init_tracing("debug").is_none());
    }

    #[test]
    fn test_parse_bake() {
        let cli = Cli::try_parse_from(["vertex-gi", "-v", "bake", "--backend", "gpu", "--bounces", "2"]).unwrap();
        assert_eq!(cli.verbose, 1);
        match cli.command {
            Commands::Bake { backend, bounces, batch, segments, .. } => {
                assert_eq!(backend, Backend::Gpu);
                assert_eq!(bounces, Some(2));
                assert_eq!(batch, None);
                assert_eq!(segments, 32);
            }
            Commands::Info => panic!("expected bake"),
        }
    }
}
