//! Clipforge CLI: plan, simulate, and check exports.
//!
//! Usage:
//!   clipforge plan [OPTIONS]         Show the composition for a geometry
//!   clipforge simulate [OPTIONS]     Export a synthetic clip to a manifest
//!   clipforge check <REQUEST>        Validate an export request file

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use clipforge_common::config::AppConfig;

mod commands;

#[derive(Parser)]
#[command(
    name = "clipforge",
    about = "Dual-track media export engine",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to $XDG_CONFIG_HOME/clipforge/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the composition computed for a source and target geometry
    Plan {
        /// Source natural width
        #[arg(long, default_value = "1920")]
        source_width: f64,

        /// Source natural height
        #[arg(long, default_value = "1080")]
        source_height: f64,

        /// Source rotation in degrees (preferred transform)
        #[arg(long, default_value = "0")]
        rotation: f64,

        /// Source nominal frame rate
        #[arg(long, default_value = "30")]
        fps: f64,

        /// Target width
        #[arg(long, default_value = "540")]
        width: u32,

        /// Target height
        #[arg(long, default_value = "960")]
        height: u32,
    },

    /// Export a synthetic clip into a manifest container
    Simulate {
        /// Output manifest path
        #[arg(short, long, default_value = "clipforge-export.manifest")]
        output: PathBuf,

        /// Export request JSON; flags below are ignored when given
        #[arg(long)]
        request: Option<PathBuf>,

        /// Clip duration (seconds)
        #[arg(long, default_value = "10.0")]
        duration: f64,

        /// Source natural width
        #[arg(long, default_value = "1280")]
        source_width: f64,

        /// Source natural height
        #[arg(long, default_value = "720")]
        source_height: f64,

        /// Source frame rate
        #[arg(long, default_value = "30")]
        fps: f64,

        /// Target width
        #[arg(long, default_value = "540")]
        width: u32,

        /// Target height
        #[arg(long, default_value = "960")]
        height: u32,

        /// Audio sample rate
        #[arg(long, default_value = "44100")]
        sample_rate: u32,

        /// Audio channel count
        #[arg(long, default_value = "1")]
        channels: u16,

        /// Omit the audio track
        #[arg(long)]
        no_audio: bool,

        /// Simulate a decode failure at this time (seconds)
        #[arg(long)]
        fail_at: Option<f64>,

        /// Cancel once progress reaches this fraction
        #[arg(long)]
        cancel_at: Option<f32>,
    },

    /// Validate an export request file
    Check {
        /// Path to the request JSON
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => AppConfig::load_from(path)
            .map_err(|e| anyhow::anyhow!("Failed to load config {}: {e}", path.display()))?,
        None => AppConfig::load(),
    };
    if cli.verbose {
        config.logging.level = "debug".to_string();
    }
    clipforge_common::logging::init_logging(&config.logging);
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(clipforge_common::config::config_file_path);
    tracing::debug!(path = %config_path.display(), "Configuration loaded");

    match cli.command {
        Commands::Plan {
            source_width,
            source_height,
            rotation,
            fps,
            width,
            height,
        } => commands::plan::run(
            &config,
            commands::plan::Geometry {
                source_width,
                source_height,
                rotation,
                fps,
                width,
                height,
            },
        ),
        Commands::Simulate {
            output,
            request,
            duration,
            source_width,
            source_height,
            fps,
            width,
            height,
            sample_rate,
            channels,
            no_audio,
            fail_at,
            cancel_at,
        } => {
            commands::simulate::run(
                &config,
                commands::simulate::SimulateArgs {
                    output,
                    request,
                    duration,
                    source_width,
                    source_height,
                    fps,
                    width,
                    height,
                    audio: (!no_audio).then_some((sample_rate, channels)),
                    fail_at,
                    cancel_at,
                },
            )
            .await
        }
        Commands::Check { path } => commands::check::run(&config, path),
    }
}
