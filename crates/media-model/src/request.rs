//! Export request: everything a caller specifies for one export.

use std::path::PathBuf;

use clipforge_common::time::TimeRange;
use serde::{Deserialize, Serialize};

use crate::composition::VideoComposition;
use crate::settings::OutputSettings;

/// Opaque output container identifier (`"mp4"`, `"mov"`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContainerKind(pub String);

impl ContainerKind {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn mp4() -> Self {
        Self::new("mp4")
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ContainerKind {
    fn default() -> Self {
        Self::mp4()
    }
}

/// A container-level metadata item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataItem {
    pub key: String,
    pub value: String,
}

impl MetadataItem {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// How the completion barrier is awaited.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FinalizeMode {
    /// `export` blocks the calling thread until the session has settled.
    #[default]
    Blocking,
    /// `export` returns once pumps are scheduled; a background thread
    /// waits for the barrier and finalizes.
    Background,
}

/// Configuration of one export.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExportRequest {
    /// Where the output container is written.
    #[serde(default)]
    pub output: Option<PathBuf>,

    #[serde(default)]
    pub container: ContainerKind,

    /// Portion of the source to export.
    #[serde(default)]
    pub time_range: TimeRange,

    /// Video output settings; must carry `width` and `height`.
    #[serde(default)]
    pub video: Option<OutputSettings>,

    /// Audio output settings; `None` passes source audio through.
    #[serde(default)]
    pub audio: Option<OutputSettings>,

    /// Settings for decoded video handed out by the demuxer.
    #[serde(default)]
    pub video_decode: Option<OutputSettings>,

    /// Settings for decoded audio handed out by the demuxer.
    #[serde(default)]
    pub audio_decode: Option<OutputSettings>,

    /// Explicit composition; computed from the first video track when absent.
    #[serde(default)]
    pub composition: Option<VideoComposition>,

    #[serde(default)]
    pub metadata: Vec<MetadataItem>,

    #[serde(default)]
    pub optimize_for_network_use: bool,

    #[serde(default)]
    pub finalize_mode: FinalizeMode,
}

impl ExportRequest {
    pub fn new(output: impl Into<PathBuf>) -> Self {
        Self {
            output: Some(output.into()),
            ..Self::default()
        }
    }
}
