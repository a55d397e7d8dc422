//! Validate an export request file.

use std::path::PathBuf;
use std::sync::Arc;

use clipforge_common::config::AppConfig;
use clipforge_common::time::MediaTime;
use clipforge_export_engine::{ExportSession, ManifestMuxerFactory, SyntheticAsset};
use clipforge_media_model::{keys, Size};

use super::simulate::load_request;

pub fn run(config: &AppConfig, path: PathBuf) -> anyhow::Result<()> {
    println!("Clipforge Request Check");
    println!("{}", "=".repeat(50));

    let request = load_request(&path)?;

    match &request.output {
        Some(output) => println!("[OK] Output: {}", output.display()),
        None => println!("[FAIL] Output: not set"),
    }
    println!("[OK] Container: {}", request.container.as_str());
    println!(
        "[OK] Range: from {} ({})",
        request.time_range.start,
        request
            .time_range
            .duration
            .map_or_else(|| "to end".to_string(), |d| format!("for {d}"))
    );
    match &request.video {
        Some(video) => match video.dimensions() {
            Some((w, h)) => println!(
                "[OK] Video: {w}x{h} {}",
                video.codec().unwrap_or(config.export.video_codec.as_str())
            ),
            None => println!("[FAIL] Video: width and height are required"),
        },
        None => println!("[FAIL] Video: no output settings"),
    }
    match &request.audio {
        Some(audio) => println!(
            "[OK] Audio: {} {}ch @ {}Hz",
            audio.codec().unwrap_or(config.export.audio_codec.as_str()),
            audio.get_u32(keys::CHANNELS).unwrap_or(0),
            audio.get_u32(keys::SAMPLE_RATE).unwrap_or(0)
        ),
        None => println!("[OK] Audio: passthrough"),
    }
    println!("[OK] Metadata items: {}", request.metadata.len());
    println!("[OK] Finalize mode: {:?}", request.finalize_mode);

    // Validate against a generic landscape source.
    let asset = SyntheticAsset::new(MediaTime::from_millis(60_000))
        .with_video(Size::new(1920.0, 1080.0), 30.0)
        .with_audio(48_000, 2);
    let session = ExportSession::new(
        Arc::new(asset),
        Arc::new(ManifestMuxerFactory::default()),
        request,
    )
    .with_defaults(config.export.clone());

    println!();
    match session.preflight() {
        Ok(composition) => {
            println!(
                "Request is valid. Render size for a 1920x1080 source: {}x{}",
                composition.render_size.width, composition.render_size.height
            );
            Ok(())
        }
        Err(e) => anyhow::bail!("Request is invalid ({}): {e}", e.kind()),
    }
}
