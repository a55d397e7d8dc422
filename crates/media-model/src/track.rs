//! Track identities and descriptors.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::geometry::{AffineTransform, Size};
use crate::settings::OutputSettings;

/// Kind of media carried by a track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Video,
    Audio,
    Metadata,
}

impl MediaKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MediaKind::Video => "video",
            MediaKind::Audio => "audio",
            MediaKind::Metadata => "metadata",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifier of a track inside a source asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackId(pub u32);

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What a source asset reports about one of its tracks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceTrackInfo {
    pub id: TrackId,
    pub kind: MediaKind,

    /// Whether the track can be decoded on this system.
    #[serde(default = "default_true")]
    pub playable: bool,

    /// Encoded frame size before the preferred transform (video only).
    #[serde(default)]
    pub natural_size: Option<Size>,

    /// Placement transform recorded in the container (video only).
    #[serde(default)]
    pub preferred_transform: AffineTransform,

    /// Nominal frame rate (video only; 0 when unknown).
    #[serde(default)]
    pub nominal_frame_rate: f64,
}

fn default_true() -> bool {
    true
}

impl SourceTrackInfo {
    pub fn video(id: u32, natural_size: Size, frame_rate: f64) -> Self {
        Self {
            id: TrackId(id),
            kind: MediaKind::Video,
            playable: true,
            natural_size: Some(natural_size),
            preferred_transform: AffineTransform::IDENTITY,
            nominal_frame_rate: frame_rate,
        }
    }

    pub fn audio(id: u32) -> Self {
        Self {
            id: TrackId(id),
            kind: MediaKind::Audio,
            playable: true,
            natural_size: None,
            preferred_transform: AffineTransform::IDENTITY,
            nominal_frame_rate: 0.0,
        }
    }

    pub fn with_transform(mut self, transform: AffineTransform) -> Self {
        self.preferred_transform = transform;
        self
    }
}

/// Description of one output track handed to the muxer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackDescriptor {
    pub kind: MediaKind,

    /// Output settings; `None` means passthrough of source samples.
    #[serde(default)]
    pub settings: Option<OutputSettings>,

    /// Whether the sink should expect data at real-time pace. Offline
    /// exports leave this off so the muxer may buffer more aggressively.
    #[serde(default)]
    pub expects_data_promptly: bool,
}

impl TrackDescriptor {
    pub fn new(kind: MediaKind, settings: Option<OutputSettings>) -> Self {
        Self {
            kind,
            settings,
            expects_data_promptly: false,
        }
    }
}
