//! Show the composition an export would use for a given geometry.

use std::sync::Arc;

use clipforge_common::config::AppConfig;
use clipforge_common::time::MediaTime;
use clipforge_export_engine::{ExportSession, ManifestMuxerFactory, SyntheticAsset};
use clipforge_media_model::{keys, AffineTransform, ExportRequest, OutputSettings, Rect, Size};

pub struct Geometry {
    pub source_width: f64,
    pub source_height: f64,
    pub rotation: f64,
    pub fps: f64,
    pub width: u32,
    pub height: u32,
}

pub fn run(config: &AppConfig, geometry: Geometry) -> anyhow::Result<()> {
    let natural = Size::new(geometry.source_width, geometry.source_height);
    let asset = SyntheticAsset::new(MediaTime::from_millis(1_000))
        .with_video(natural, geometry.fps)
        .with_preferred_transform(AffineTransform::rotation_degrees(geometry.rotation));

    let mut request = ExportRequest::new("plan.manifest");
    request.video = Some(
        OutputSettings::new()
            .with(keys::WIDTH, geometry.width)
            .with(keys::HEIGHT, geometry.height),
    );

    let session = ExportSession::new(
        Arc::new(asset),
        Arc::new(ManifestMuxerFactory::default()),
        request,
    )
    .with_defaults(config.export.clone());
    let composition = session
        .preflight()
        .map_err(|e| anyhow::anyhow!("Cannot plan export: {e}"))?;

    println!(
        "Source: {}x{} rotated {}° @ {}fps",
        natural.width, natural.height, geometry.rotation, geometry.fps
    );
    println!("Target: {}x{}", geometry.width, geometry.height);
    println!();
    println!(
        "Render size: {}x{}",
        composition.render_size.width, composition.render_size.height
    );
    println!("Frame rate: {:.3}fps", composition.frame_rate());

    // The encoder stretches render space onto the target.
    let to_target = AffineTransform::scale(
        f64::from(geometry.width) / composition.render_size.width,
        f64::from(geometry.height) / composition.render_size.height,
    );
    for instruction in &composition.instructions {
        println!(
            "Instruction: {} + {}",
            instruction.time_range.start,
            instruction
                .time_range
                .duration
                .map_or_else(|| "open".to_string(), |d| d.to_string())
        );
        for layer in &instruction.layers {
            let t = layer.transform;
            let placed = t.concat(to_target).apply_rect(Rect::from_size(natural));
            println!(
                "  Track {}: [{:.4} {:.4} {:.4} {:.4} {:.2} {:.2}]",
                layer.track_id, t.a, t.b, t.c, t.d, t.tx, t.ty
            );
            println!(
                "    Content in target: {:.1}x{:.1} at ({:.1}, {:.1})",
                placed.width, placed.height, placed.x, placed.y
            );
        }
    }

    Ok(())
}
