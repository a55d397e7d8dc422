//! Export a synthetic clip into a manifest container.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clipforge_common::config::AppConfig;
use clipforge_common::time::MediaTime;
use clipforge_export_engine::{
    read_manifest, run_export, ExportSession, ManifestMuxerFactory, SyntheticAsset,
};
use clipforge_media_model::{keys, ExportRequest, ExportStatus, OutputSettings, Size};

pub struct SimulateArgs {
    pub output: PathBuf,
    pub request: Option<PathBuf>,
    pub duration: f64,
    pub source_width: f64,
    pub source_height: f64,
    pub fps: f64,
    pub width: u32,
    pub height: u32,
    /// Sample rate and channel count; `None` for a silent clip.
    pub audio: Option<(u32, u16)>,
    pub fail_at: Option<f64>,
    pub cancel_at: Option<f32>,
}

pub async fn run(config: &AppConfig, args: SimulateArgs) -> anyhow::Result<()> {
    let request = match &args.request {
        Some(path) => {
            let mut request = load_request(path)?;
            if request.output.is_none() {
                request.output = Some(args.output.clone());
            }
            request
        }
        None => flag_request(&args),
    };

    let mut asset = SyntheticAsset::new(MediaTime::from_secs_f64(args.duration))
        .with_video(Size::new(args.source_width, args.source_height), args.fps);
    if let Some((sample_rate, channels)) = args.audio {
        asset = asset.with_audio(sample_rate, channels);
    }
    if let Some(at) = args.fail_at {
        asset = asset.failing_at(MediaTime::from_secs_f64(at));
    }

    let output = request.output.clone().unwrap_or_else(|| args.output.clone());
    println!("Simulating export to: {}", output.display());
    println!(
        "  Source: {}x{} @ {}fps, {:.1}s",
        args.source_width, args.source_height, args.fps, args.duration
    );
    if let Some((w, h)) = request.video.as_ref().and_then(OutputSettings::dimensions) {
        println!("  Resolution: {w}x{h}");
    }

    let mut session = ExportSession::new(
        Arc::new(asset),
        Arc::new(ManifestMuxerFactory::default()),
        request,
    )
    .with_defaults(config.export.clone());

    let handle = session.handle();
    let cancel_at = args.cancel_at;
    session.on_progress(move |p| {
        print!("\r  Progress: {:.1}%  ", p * 100.0);
        let _ = std::io::stdout().flush();
        if cancel_at.map_or(false, |at| p >= at) {
            handle.cancel();
        }
    });

    let outcome = run_export(session)
        .await
        .map_err(|e| anyhow::anyhow!("Export rejected: {e}"))?;
    println!();

    match outcome.status {
        ExportStatus::Completed => {
            let summary = read_manifest(&outcome.output)
                .map_err(|e| anyhow::anyhow!("Cannot read manifest: {e}"))?;
            println!("Export complete: {}", outcome.output.display());
            println!("  Container: {}", summary.container);
            for (track, samples) in summary.tracks.iter().zip(&summary.samples) {
                println!("  Track {} ({}): {samples} samples", track.index, track.kind);
            }
            println!("  Total samples: {}", summary.total_samples());
            Ok(())
        }
        ExportStatus::Cancelled => {
            println!("Export cancelled at {:.1}%", outcome.progress * 100.0);
            Ok(())
        }
        status => {
            let reason = outcome
                .error
                .map_or_else(|| "unknown error".to_string(), |e| e.to_string());
            anyhow::bail!("Export {status}: {reason}")
        }
    }
}

pub(crate) fn load_request(path: &Path) -> anyhow::Result<ExportRequest> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Failed to read {}: {e}", path.display()))?;
    serde_json::from_str(&content)
        .map_err(|e| anyhow::anyhow!("Invalid request {}: {e}", path.display()))
}

fn flag_request(args: &SimulateArgs) -> ExportRequest {
    let mut request = ExportRequest::new(args.output.clone());
    request.video = Some(
        OutputSettings::new()
            .with(keys::WIDTH, args.width)
            .with(keys::HEIGHT, args.height),
    );
    if let Some((sample_rate, channels)) = args.audio {
        request.audio = Some(
            OutputSettings::new()
                .with(keys::SAMPLE_RATE, sample_rate)
                .with(keys::CHANNELS, u32::from(channels)),
        );
    }
    request
}
