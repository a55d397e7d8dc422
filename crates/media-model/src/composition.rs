//! Video composition: render size plus timed per-track transforms.

use clipforge_common::time::{MediaTime, TimeRange};
use serde::{Deserialize, Serialize};

use crate::geometry::{AffineTransform, Size};
use crate::track::TrackId;

/// Transform applied to one track during an instruction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerInstruction {
    pub track_id: TrackId,
    pub transform: AffineTransform,
}

/// A timed directive applying layer transforms over a time range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositionInstruction {
    pub time_range: TimeRange,
    pub layers: Vec<LayerInstruction>,
}

/// How decoded video frames are composed before they reach the pump.
///
/// Computed once before an export starts and never changed afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoComposition {
    /// Size of composed frames; render buffers are allocated at this size.
    pub render_size: Size,
    /// Duration of one output frame.
    pub frame_duration: MediaTime,
    pub instructions: Vec<CompositionInstruction>,
}

impl VideoComposition {
    /// Output frame rate implied by `frame_duration`.
    pub fn frame_rate(&self) -> f64 {
        let secs = self.frame_duration.as_secs_f64();
        if secs <= 0.0 {
            0.0
        } else {
            1.0 / secs
        }
    }

    /// Transform for `track` at time `t`, if an instruction covers it.
    pub fn transform_at(&self, track: TrackId, t: MediaTime) -> Option<AffineTransform> {
        self.instructions
            .iter()
            .filter(|instruction| instruction.time_range.contains(t))
            .flat_map(|instruction| instruction.layers.iter())
            .find(|layer| layer.track_id == track)
            .map(|layer| layer.transform)
    }
}
