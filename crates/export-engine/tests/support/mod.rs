//! Scripted collaborators for integration tests.
//!
//! The asset emits a fixed number of samples per track; the muxer records
//! everything it is asked to do and can be told to fail at chosen points.

#![allow(dead_code)]

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clipforge_common::error::MediaError;
use clipforge_common::time::{MediaTime, TimeRange};
use clipforge_export_engine::media::{
    MediaAsset, MuxerFactory, ReadyNotifier, SampleStream, SinkMuxer, SinkTrack, SourceDemuxer,
};
use clipforge_media_model::{
    keys, ContainerKind, ExportRequest, FrameBuffer, MediaKind, MetadataItem, OutputSettings,
    PixelFormat, SampleBuffer, Size, SinkStatus, SourceStatus, SourceTrackInfo, TrackDescriptor,
    TrackId, VideoComposition,
};
use parking_lot::Mutex;

pub const WAIT: Duration = Duration::from_secs(20);

// ---------------------------------------------------------------------------
// Source
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct AssetScript {
    pub duration: MediaTime,
    pub natural_size: Size,
    pub frame_rate: f64,
    pub video_frames: usize,
    /// `None` means the asset has no audio track.
    pub audio_packets: Option<usize>,
    /// Reading fails when the video stream reaches this sample index.
    pub video_fail_at: Option<usize>,
    pub start_error: bool,
}

impl AssetScript {
    pub fn new(video_frames: usize, audio_packets: Option<usize>) -> Self {
        Self {
            duration: MediaTime::from_millis(10_000),
            natural_size: Size::new(64.0, 36.0),
            frame_rate: 30.0,
            video_frames,
            audio_packets,
            video_fail_at: None,
            start_error: false,
        }
    }
}

pub struct ScriptedAsset {
    pub script: AssetScript,
    pub demuxers_opened: Arc<AtomicUsize>,
}

impl ScriptedAsset {
    pub fn new(script: AssetScript) -> Arc<Self> {
        Arc::new(Self {
            script,
            demuxers_opened: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn opened(&self) -> usize {
        self.demuxers_opened.load(Ordering::SeqCst)
    }
}

impl MediaAsset for ScriptedAsset {
    fn duration(&self) -> MediaTime {
        self.script.duration
    }

    fn tracks(&self) -> Vec<SourceTrackInfo> {
        let mut tracks = vec![SourceTrackInfo::video(
            1,
            self.script.natural_size,
            self.script.frame_rate,
        )];
        if self.script.audio_packets.is_some() {
            tracks.push(SourceTrackInfo::audio(2));
        }
        tracks
    }

    fn open_demuxer(&self) -> Result<Box<dyn SourceDemuxer>, MediaError> {
        self.demuxers_opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedDemuxer {
            script: self.script.clone(),
            state: Arc::new(Mutex::new(DemuxState {
                status: SourceStatus::Unknown,
                error: None,
                range: TimeRange::FULL,
                open: 0,
            })),
        }))
    }
}

struct DemuxState {
    status: SourceStatus,
    error: Option<MediaError>,
    range: TimeRange,
    open: usize,
}

struct ScriptedDemuxer {
    script: AssetScript,
    state: Arc<Mutex<DemuxState>>,
}

impl SourceDemuxer for ScriptedDemuxer {
    fn set_time_range(&mut self, range: TimeRange) {
        self.state.lock().range = range;
    }

    fn add_video_output(
        &mut self,
        _tracks: &[TrackId],
        _decode: &OutputSettings,
        composition: &VideoComposition,
    ) -> Result<Box<dyn SampleStream>, MediaError> {
        let span = {
            let mut state = self.state.lock();
            state.open += 1;
            state.range.effective_duration(self.script.duration)
        };
        let (width, height) = composition.render_size.to_pixels();
        Ok(Box::new(ScriptedStream {
            kind: MediaKind::Video,
            state: Arc::clone(&self.state),
            total: self.script.video_frames,
            step: step(span, self.script.video_frames),
            fail_at: self.script.video_fail_at,
            next: 0,
            done: false,
            frame_size: Some((width, height)),
        }))
    }

    fn add_audio_output(
        &mut self,
        _tracks: &[TrackId],
        _decode: &OutputSettings,
    ) -> Result<Box<dyn SampleStream>, MediaError> {
        let packets = self
            .script
            .audio_packets
            .ok_or_else(|| MediaError::demuxer("no audio"))?;
        let span = {
            let mut state = self.state.lock();
            state.open += 1;
            state.range.effective_duration(self.script.duration)
        };
        Ok(Box::new(ScriptedStream {
            kind: MediaKind::Audio,
            state: Arc::clone(&self.state),
            total: packets,
            step: step(span, packets),
            fail_at: None,
            next: 0,
            done: false,
            frame_size: None,
        }))
    }

    fn start_reading(&mut self) -> Result<(), MediaError> {
        if self.script.start_error {
            let error = MediaError::new("demuxer", -11_800, "cannot open source");
            let mut state = self.state.lock();
            state.status = SourceStatus::Failed;
            state.error = Some(error.clone());
            return Err(error);
        }
        self.state.lock().status = SourceStatus::Reading;
        Ok(())
    }

    fn cancel_reading(&mut self) {
        let mut state = self.state.lock();
        if matches!(state.status, SourceStatus::Unknown | SourceStatus::Reading) {
            state.status = SourceStatus::Cancelled;
        }
    }

    fn status(&self) -> SourceStatus {
        self.state.lock().status
    }

    fn error(&self) -> Option<MediaError> {
        self.state.lock().error.clone()
    }
}

fn step(duration: MediaTime, count: usize) -> MediaTime {
    if count == 0 {
        MediaTime::ZERO
    } else {
        MediaTime::from_nanos(duration.as_nanos() / count as i64)
    }
}

struct ScriptedStream {
    kind: MediaKind,
    state: Arc<Mutex<DemuxState>>,
    total: usize,
    step: MediaTime,
    fail_at: Option<usize>,
    next: usize,
    done: bool,
    frame_size: Option<(u32, u32)>,
}

impl SampleStream for ScriptedStream {
    fn kind(&self) -> MediaKind {
        self.kind
    }

    fn next_sample(&mut self) -> Option<SampleBuffer> {
        let mut state = self.state.lock();
        if self.done || state.status != SourceStatus::Reading {
            return None;
        }
        if self.fail_at == Some(self.next) {
            state.status = SourceStatus::Failed;
            state.error = Some(MediaError::new("demuxer", -11_829, "corrupt sample"));
            return None;
        }
        if self.next >= self.total {
            self.done = true;
            state.open -= 1;
            if state.open == 0 {
                state.status = SourceStatus::Completed;
            }
            return None;
        }
        let pts = MediaTime::from_nanos(
            state.range.start.as_nanos() + self.step.as_nanos() * self.next as i64,
        );
        drop(state);
        self.next += 1;

        Some(match self.frame_size {
            Some((width, height)) => SampleBuffer::frame(
                pts,
                self.step,
                FrameBuffer::new(width, height, PixelFormat::bgra()),
            ),
            None => SampleBuffer::bytes(pts, self.step, vec![0u8; 32]),
        })
    }
}

/// Caller-supplied stream for extra tracks.
pub struct VecStream {
    pub kind: MediaKind,
    pub samples: std::collections::VecDeque<SampleBuffer>,
}

impl VecStream {
    pub fn metadata(count: usize) -> Box<dyn SampleStream> {
        let samples = (0..count)
            .map(|i| {
                SampleBuffer::bytes(
                    MediaTime::from_millis(i as i64 * 1_000),
                    MediaTime::from_millis(1_000),
                    format!("{{\"chapter\":{i}}}").into_bytes(),
                )
            })
            .collect();
        Box::new(Self {
            kind: MediaKind::Metadata,
            samples,
        })
    }
}

impl SampleStream for VecStream {
    fn kind(&self) -> MediaKind {
        self.kind
    }

    fn next_sample(&mut self) -> Option<SampleBuffer> {
        self.samples.pop_front()
    }
}

// ---------------------------------------------------------------------------
// Sink
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct MuxerScript {
    /// `can_add_track` refuses tracks of this kind.
    pub refuse_kind: Option<MediaKind>,
    pub start_error: bool,
    /// The muxer fails (status Failed) on this push of this kind.
    pub fail_push_at: Option<(MediaKind, usize)>,
    /// This push of this kind is rejected while the muxer keeps writing.
    pub reject_push_at: Option<(MediaKind, usize)>,
    /// After every n pushes a track goes not-ready and is re-notified from
    /// another thread shortly after.
    pub park_every: Option<usize>,
    pub finish_error: bool,
    /// Keep pushed samples alive (holds pooled frames).
    pub retain_samples: bool,
}

#[derive(Debug, Default)]
pub struct MuxerLog {
    pub created: usize,
    pub descriptors: Vec<TrackDescriptor>,
    pub metadata: Vec<MetadataItem>,
    pub optimize_for_network_use: bool,
    pub session_start: Option<MediaTime>,
    pub pushes: Vec<(MediaKind, MediaTime, bool)>,
    pub marked_finished: Vec<MediaKind>,
    pub finish_calls: usize,
    pub cancel_calls: usize,
    pub retained: Vec<SampleBuffer>,
}

impl MuxerLog {
    pub fn pushes_of(&self, kind: MediaKind) -> usize {
        self.pushes.iter().filter(|(k, _, _)| *k == kind).count()
    }
}

#[derive(Clone)]
pub struct ScriptedMuxerFactory {
    pub script: MuxerScript,
    pub log: Arc<Mutex<MuxerLog>>,
}

impl ScriptedMuxerFactory {
    pub fn new(script: MuxerScript) -> Arc<Self> {
        Arc::new(Self {
            script,
            log: Arc::new(Mutex::new(MuxerLog::default())),
        })
    }
}

impl MuxerFactory for ScriptedMuxerFactory {
    fn name(&self) -> &str {
        "scripted"
    }

    fn create_muxer(
        &self,
        location: &Path,
        _container: &ContainerKind,
    ) -> Result<Box<dyn SinkMuxer>, MediaError> {
        self.log.lock().created += 1;
        Ok(Box::new(ScriptedMuxer {
            path: location.to_path_buf(),
            script: self.script.clone(),
            log: Arc::clone(&self.log),
            state: Arc::new(Mutex::new(SinkState {
                status: SinkStatus::Unknown,
                error: None,
                tracks: Vec::new(),
            })),
        }))
    }
}

struct TrackState {
    kind: MediaKind,
    ready: bool,
    pushes: usize,
    notifier: Option<ReadyNotifier>,
}

struct SinkState {
    status: SinkStatus,
    error: Option<MediaError>,
    tracks: Vec<TrackState>,
}

impl SinkState {
    fn fail(&mut self, error: MediaError) {
        self.status = SinkStatus::Failed;
        self.error = Some(error);
        self.wake_all();
    }

    fn wake_all(&mut self) {
        for track in &mut self.tracks {
            track.ready = true;
            if let Some(notifier) = &track.notifier {
                notifier.notify();
            }
        }
    }
}

struct ScriptedMuxer {
    path: PathBuf,
    script: MuxerScript,
    log: Arc<Mutex<MuxerLog>>,
    state: Arc<Mutex<SinkState>>,
}

impl SinkMuxer for ScriptedMuxer {
    fn set_metadata(&mut self, items: &[MetadataItem]) {
        self.log.lock().metadata = items.to_vec();
    }

    fn set_optimize_for_network_use(&mut self, enabled: bool) {
        self.log.lock().optimize_for_network_use = enabled;
    }

    fn can_add_track(&self, descriptor: &TrackDescriptor) -> bool {
        self.script.refuse_kind != Some(descriptor.kind)
    }

    fn add_track(&mut self, descriptor: TrackDescriptor) -> Result<Box<dyn SinkTrack>, MediaError> {
        let mut state = self.state.lock();
        let index = state.tracks.len();
        state.tracks.push(TrackState {
            kind: descriptor.kind,
            ready: true,
            pushes: 0,
            notifier: None,
        });
        self.log.lock().descriptors.push(descriptor.clone());
        Ok(Box::new(ScriptedSinkTrack {
            index,
            descriptor,
            script: self.script.clone(),
            log: Arc::clone(&self.log),
            state: Arc::clone(&self.state),
        }))
    }

    fn start_writing(&mut self) -> Result<(), MediaError> {
        let mut file = File::create(&self.path).map_err(|e| MediaError::muxer(e.to_string()))?;
        file.write_all(b"scripted container\n")
            .map_err(|e| MediaError::muxer(e.to_string()))?;
        if self.script.start_error {
            let error = MediaError::new("muxer", -11_823, "cannot begin writing");
            self.state.lock().fail(error.clone());
            return Err(error);
        }
        self.state.lock().status = SinkStatus::Writing;
        Ok(())
    }

    fn start_session(&mut self, at: MediaTime) {
        self.log.lock().session_start = Some(at);
    }

    fn finish_writing(&mut self) -> Result<(), MediaError> {
        self.log.lock().finish_calls += 1;
        let mut state = self.state.lock();
        if state.status != SinkStatus::Writing {
            return Err(MediaError::muxer("not writing"));
        }
        if self.script.finish_error {
            let error = MediaError::new("muxer", -11_847, "commit failed");
            state.fail(error.clone());
            return Err(error);
        }
        state.status = SinkStatus::Completed;
        Ok(())
    }

    fn cancel_writing(&mut self) {
        self.log.lock().cancel_calls += 1;
        let mut state = self.state.lock();
        if matches!(state.status, SinkStatus::Unknown | SinkStatus::Writing) {
            state.status = SinkStatus::Cancelled;
            state.wake_all();
        }
    }

    fn status(&self) -> SinkStatus {
        self.state.lock().status
    }

    fn error(&self) -> Option<MediaError> {
        self.state.lock().error.clone()
    }
}

struct ScriptedSinkTrack {
    index: usize,
    descriptor: TrackDescriptor,
    script: MuxerScript,
    log: Arc<Mutex<MuxerLog>>,
    state: Arc<Mutex<SinkState>>,
}

impl SinkTrack for ScriptedSinkTrack {
    fn descriptor(&self) -> &TrackDescriptor {
        &self.descriptor
    }

    fn is_ready_for_more(&self) -> bool {
        let state = self.state.lock();
        state.status != SinkStatus::Writing || state.tracks[self.index].ready
    }

    fn request_data_when_ready(&mut self, notifier: ReadyNotifier) {
        let mut state = self.state.lock();
        let track = &mut state.tracks[self.index];
        if track.ready {
            notifier.notify();
        }
        track.notifier = Some(notifier);
    }

    fn push(&mut self, sample: SampleBuffer) -> Result<(), MediaError> {
        let mut state = self.state.lock();
        if state.status != SinkStatus::Writing {
            return Err(MediaError::muxer("not writing"));
        }
        let kind = state.tracks[self.index].kind;
        let count = state.tracks[self.index].pushes;
        if self.script.fail_push_at == Some((kind, count)) {
            let error = MediaError::new("muxer", -11_800, "encoder failure");
            state.fail(error.clone());
            return Err(error);
        }
        if self.script.reject_push_at == Some((kind, count)) {
            return Err(MediaError::new("muxer", -12_000, "sample rejected"));
        }

        let track = &mut state.tracks[self.index];
        track.pushes += 1;
        let pooled = sample.as_frame().map_or(false, FrameBuffer::is_pooled);
        {
            let mut log = self.log.lock();
            log.pushes.push((kind, sample.pts, pooled));
            if self.script.retain_samples {
                log.retained.push(sample);
            }
        }

        if let Some(every) = self.script.park_every {
            if track.pushes % every == 0 {
                track.ready = false;
                if let Some(notifier) = track.notifier.clone() {
                    let state = Arc::clone(&self.state);
                    let index = self.index;
                    std::thread::spawn(move || {
                        std::thread::sleep(Duration::from_millis(1));
                        state.lock().tracks[index].ready = true;
                        notifier.notify();
                    });
                }
            }
        }
        Ok(())
    }

    fn mark_finished(&mut self) {
        self.log.lock().marked_finished.push(self.descriptor.kind);
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

pub fn video_settings(width: u32, height: u32) -> OutputSettings {
    OutputSettings::new()
        .with(keys::WIDTH, width)
        .with(keys::HEIGHT, height)
}

pub fn request(dir: &Path, width: u32, height: u32) -> ExportRequest {
    let mut request = ExportRequest::new(dir.join("out.mp4"));
    request.video = Some(video_settings(width, height));
    request
}

/// Completion hook that forwards the outcome into a channel.
pub fn outcome_channel() -> (
    impl FnOnce(clipforge_export_engine::ExportOutcome) + Send + 'static,
    std::sync::mpsc::Receiver<clipforge_export_engine::ExportOutcome>,
) {
    let (tx, rx) = std::sync::mpsc::channel();
    (
        move |outcome| {
            let _ = tx.send(outcome);
        },
        rx,
    )
}
