//! Video composition: orientation correction plus aspect-fit placement.
//!
//! A source track carries a preferred transform (usually a rotation from the
//! recording device) and a natural size. The composition rotates the frame
//! upright, then scales it uniformly into the target dimensions with equal
//! padding on both sides of the short axis.

use clipforge_common::error::{ExportError, ExportResult};
use clipforge_common::time::{MediaTime, TimeRange};
use clipforge_media_model::{
    keys, AffineTransform, CompositionInstruction, LayerInstruction, OutputSettings, Size,
    SourceTrackInfo, VideoComposition,
};

/// Translation written by an old recorder into some preferred transforms.
///
/// Those files render shifted off-canvas unless the component is cleared.
pub const LEGACY_TRANSLATION_SENTINEL: f64 = -560.0;

/// Inputs to [`compute_composition`].
#[derive(Debug, Clone)]
pub struct CompositionInputs<'a> {
    pub track: &'a SourceTrackInfo,
    pub video_settings: &'a OutputSettings,
    pub time_range: TimeRange,
    pub asset_duration: MediaTime,
    pub fallback_frame_rate: f64,
}

/// Frame rate for the composition: the expected source rate from the
/// settings, else the track's nominal rate, else `fallback`.
pub fn resolve_frame_rate(settings: &OutputSettings, track: &SourceTrackInfo, fallback: f64) -> f64 {
    settings
        .get_f64(keys::EXPECTED_SOURCE_FRAME_RATE)
        .filter(|fps| *fps > 0.0)
        .or_else(|| Some(track.nominal_frame_rate).filter(|fps| *fps > 0.0))
        .unwrap_or(fallback)
}

/// Clear the legacy sentinel translation from a preferred transform.
pub fn strip_legacy_translation(transform: AffineTransform) -> AffineTransform {
    let mut fixed = transform;
    if fixed.tx == LEGACY_TRANSLATION_SENTINEL {
        fixed.tx = 0.0;
    }
    if fixed.ty == LEGACY_TRANSLATION_SENTINEL {
        fixed.ty = 0.0;
    }
    fixed
}

/// Natural size as seen after `transform`: width and height swap for a
/// quarter turn in either direction.
pub fn oriented_size(natural: Size, transform: &AffineTransform) -> Size {
    let angle = transform.rotation_angle_degrees();
    if angle == 90.0 || angle == -90.0 {
        natural.swapped()
    } else {
        natural
    }
}

/// Transform placing `natural`-sized content centered inside `target` at a
/// uniform scale, expressed in render space (the encoder later stretches the
/// render size to the target).
pub fn aspect_fit(natural: Size, target: Size) -> AffineTransform {
    let x_ratio = target.width / natural.width;
    let y_ratio = target.height / natural.height;
    let ratio = x_ratio.min(y_ratio);

    let pad_x = (target.width - natural.width * ratio) / 2.0;
    let pad_y = (target.height - natural.height * ratio) / 2.0;

    AffineTransform::translation(pad_x / x_ratio, pad_y / y_ratio)
        .scaled(ratio / x_ratio, ratio / y_ratio)
}

/// Build the composition for one video track.
pub fn compute_composition(inputs: &CompositionInputs<'_>) -> ExportResult<VideoComposition> {
    let track = inputs.track;
    let natural = track
        .natural_size
        .filter(|size| !size.is_empty())
        .ok_or_else(|| {
            ExportError::configuration(format!("video track {} has no natural size", track.id))
        })?;
    let (width, height) = inputs.video_settings.dimensions().ok_or_else(|| {
        ExportError::configuration("video settings must carry a positive width and height")
    })?;
    let target = Size::new(f64::from(width), f64::from(height));

    let frame_rate = resolve_frame_rate(inputs.video_settings, track, inputs.fallback_frame_rate);

    let preferred = strip_legacy_translation(track.preferred_transform);
    let oriented = oriented_size(natural, &preferred);
    let layer_transform = preferred.concat(aspect_fit(oriented, target));

    let duration = inputs.time_range.effective_duration(inputs.asset_duration);

    tracing::debug!(
        track = %track.id,
        natural_w = natural.width,
        natural_h = natural.height,
        render_w = oriented.width,
        render_h = oriented.height,
        target_w = width,
        target_h = height,
        frame_rate,
        "Computed video composition"
    );

    Ok(VideoComposition {
        render_size: oriented,
        frame_duration: MediaTime::frame_duration(frame_rate),
        instructions: vec![CompositionInstruction {
            time_range: TimeRange::new(MediaTime::ZERO, duration),
            layers: vec![LayerInstruction {
                track_id: track.id,
                transform: layer_transform,
            }],
        }],
    })
}
