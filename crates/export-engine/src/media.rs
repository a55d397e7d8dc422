//! Collaborator seams: the source asset, its demuxer, and the sink muxer.
//!
//! The engine never decodes or encodes anything itself. It pulls samples
//! from a [`SourceDemuxer`] and pushes them into a [`SinkMuxer`], and both
//! are supplied by the caller through these traits.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use clipforge_common::error::MediaError;
use clipforge_common::time::{MediaTime, TimeRange};
use clipforge_media_model::{
    ContainerKind, MediaKind, MetadataItem, OutputSettings, SampleBuffer, SinkStatus,
    SourceStatus, SourceTrackInfo, TrackDescriptor, TrackId, VideoComposition,
};
use parking_lot::Mutex;

/// Demuxer shared between the session, its pumps, and queued cancel jobs.
pub type SharedDemuxer = Arc<Mutex<Box<dyn SourceDemuxer>>>;

/// Muxer shared between the session, its pumps, and queued cancel jobs.
pub type SharedMuxer = Arc<Mutex<Box<dyn SinkMuxer>>>;

/// Callback a sink track fires whenever it can accept more samples.
///
/// Firing only schedules work; it never runs a pump inline, so a sink may
/// call it while holding its own locks.
#[derive(Clone)]
pub struct ReadyNotifier {
    notify: Arc<dyn Fn() + Send + Sync>,
}

impl ReadyNotifier {
    pub fn new(notify: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            notify: Arc::new(notify),
        }
    }

    pub fn notify(&self) {
        (self.notify)()
    }
}

impl fmt::Debug for ReadyNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ReadyNotifier")
    }
}

/// A media file that can be opened for reading.
pub trait MediaAsset: Send + Sync {
    fn duration(&self) -> MediaTime;

    fn tracks(&self) -> Vec<SourceTrackInfo>;

    /// Open a fresh demuxer over this asset.
    fn open_demuxer(&self) -> Result<Box<dyn SourceDemuxer>, MediaError>;

    /// Tracks of one kind, in container order.
    fn tracks_of(&self, kind: MediaKind) -> Vec<SourceTrackInfo> {
        self.tracks()
            .into_iter()
            .filter(|track| track.kind == kind)
            .collect()
    }
}

/// Pull-side stream of samples for one output of a demuxer.
pub trait SampleStream: Send {
    fn kind(&self) -> MediaKind;

    /// Next sample in presentation order, or `None` once the stream has
    /// run dry or the demuxer has stopped reading.
    fn next_sample(&mut self) -> Option<SampleBuffer>;
}

/// Reads samples from an asset over a time range.
pub trait SourceDemuxer: Send {
    fn set_time_range(&mut self, range: TimeRange);

    /// Add a decoded video output composed with `composition`.
    fn add_video_output(
        &mut self,
        tracks: &[TrackId],
        decode: &OutputSettings,
        composition: &VideoComposition,
    ) -> Result<Box<dyn SampleStream>, MediaError>;

    /// Add an audio output mixing `tracks`.
    fn add_audio_output(
        &mut self,
        tracks: &[TrackId],
        decode: &OutputSettings,
    ) -> Result<Box<dyn SampleStream>, MediaError>;

    fn start_reading(&mut self) -> Result<(), MediaError>;

    /// Stop reading. Streams return `None` afterwards. No-op once the
    /// demuxer has completed, failed, or been cancelled.
    fn cancel_reading(&mut self);

    fn status(&self) -> SourceStatus;

    fn error(&self) -> Option<MediaError>;
}

/// Input side of one output track.
pub trait SinkTrack: Send {
    fn descriptor(&self) -> &TrackDescriptor;

    /// Whether a push would be accepted without blocking.
    ///
    /// Once the muxer has left `Writing` this must report `true`, so that a
    /// pump can observe the terminal state instead of parking forever.
    fn is_ready_for_more(&self) -> bool;

    /// Register `notifier` to be fired each time the track becomes ready.
    /// Fires once right away if the track is already ready.
    fn request_data_when_ready(&mut self, notifier: ReadyNotifier);

    fn push(&mut self, sample: SampleBuffer) -> Result<(), MediaError>;

    /// Declare that no more samples will arrive on this track.
    fn mark_finished(&mut self);
}

/// Writes an output container.
pub trait SinkMuxer: Send {
    fn set_metadata(&mut self, items: &[MetadataItem]);

    fn set_optimize_for_network_use(&mut self, enabled: bool);

    fn can_add_track(&self, descriptor: &TrackDescriptor) -> bool;

    fn add_track(&mut self, descriptor: TrackDescriptor) -> Result<Box<dyn SinkTrack>, MediaError>;

    fn start_writing(&mut self) -> Result<(), MediaError>;

    /// Anchor the output timeline at `at` in source time.
    fn start_session(&mut self, at: MediaTime);

    /// Commit the container. Unfinished tracks are finished implicitly.
    fn finish_writing(&mut self) -> Result<(), MediaError>;

    /// Abandon the container. No-op once the muxer is terminal.
    fn cancel_writing(&mut self);

    fn status(&self) -> SinkStatus;

    fn error(&self) -> Option<MediaError>;
}

/// Creates muxers for output locations.
pub trait MuxerFactory: Send + Sync {
    fn name(&self) -> &str;

    fn create_muxer(
        &self,
        location: &Path,
        container: &ContainerKind,
    ) -> Result<Box<dyn SinkMuxer>, MediaError>;
}
