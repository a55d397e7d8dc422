//! JSON-lines container manifest: a reference file sink.
//!
//! Instead of encoding media, [`ManifestMuxer`] records what a real muxer
//! would have written: a header describing the tracks, one record per
//! sample, and a trailer. It enforces the same cross-track interleaving a
//! real container writer does, so a track that runs too far ahead of the
//! others is held back until they catch up.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use clipforge_common::error::MediaError;
use clipforge_common::time::MediaTime;
use clipforge_media_model::{
    ContainerKind, MediaKind, MetadataItem, OutputSettings, Payload, SampleBuffer, SinkStatus,
    TrackDescriptor,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::media::{MuxerFactory, ReadyNotifier, SinkMuxer, SinkTrack};

pub const MANIFEST_FORMAT: &str = "clipforge-manifest";
pub const MANIFEST_VERSION: u32 = 1;

/// How far one track may run ahead of the slowest unfinished track.
pub const DEFAULT_INTERLEAVE_WINDOW: MediaTime = MediaTime::from_nanos(500_000_000);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestTrack {
    pub index: usize,
    pub kind: MediaKind,
    #[serde(default)]
    pub settings: Option<OutputSettings>,
}

/// One line of a manifest file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "record", rename_all = "snake_case")]
pub enum ManifestRecord {
    Header {
        format: String,
        version: u32,
        container: String,
        created_at: DateTime<Utc>,
        optimize_for_network_use: bool,
        metadata: Vec<MetadataItem>,
        tracks: Vec<ManifestTrack>,
    },
    Session {
        start: MediaTime,
    },
    Sample {
        track: usize,
        pts: MediaTime,
        duration: MediaTime,
        size: usize,
        checksum: u32,
    },
    Trailer {
        samples: Vec<u64>,
    },
}

/// Creates [`ManifestMuxer`]s.
#[derive(Debug, Clone)]
pub struct ManifestMuxerFactory {
    pub interleave_window: MediaTime,
}

impl Default for ManifestMuxerFactory {
    fn default() -> Self {
        Self {
            interleave_window: DEFAULT_INTERLEAVE_WINDOW,
        }
    }
}

impl MuxerFactory for ManifestMuxerFactory {
    fn name(&self) -> &str {
        "manifest"
    }

    fn create_muxer(
        &self,
        location: &Path,
        container: &ContainerKind,
    ) -> Result<Box<dyn SinkMuxer>, MediaError> {
        if let Some(parent) = location.parent().filter(|p| !p.as_os_str().is_empty()) {
            if !parent.is_dir() {
                return Err(MediaError::muxer(format!(
                    "output directory {} does not exist",
                    parent.display()
                )));
            }
        }
        Ok(Box::new(ManifestMuxer::new(
            location,
            container.clone(),
            self.interleave_window,
        )))
    }
}

struct TrackSlot {
    descriptor: TrackDescriptor,
    position: Option<MediaTime>,
    finished: bool,
    samples: u64,
    notifier: Option<ReadyNotifier>,
    parked: bool,
}

struct MuxState {
    status: SinkStatus,
    error: Option<MediaError>,
    writer: Option<BufWriter<File>>,
    tracks: Vec<TrackSlot>,
    metadata: Vec<MetadataItem>,
    optimize_for_network_use: bool,
    session_start: MediaTime,
    window: MediaTime,
}

impl MuxState {
    fn is_ready(&self, index: usize) -> bool {
        if self.status != SinkStatus::Writing {
            return true;
        }
        let track = &self.tracks[index];
        if track.finished {
            return false;
        }
        if track.descriptor.expects_data_promptly {
            return true;
        }
        let own = track.position.unwrap_or(self.session_start);
        let slowest = self
            .tracks
            .iter()
            .enumerate()
            .filter(|(i, other)| {
                *i != index && !other.finished && !other.descriptor.expects_data_promptly
            })
            .map(|(_, other)| other.position.unwrap_or(self.session_start))
            .min();
        slowest.map_or(true, |slowest| own <= slowest + self.window)
    }

    /// Fire the notifier of every parked track that can now make progress.
    fn wake_ready(&mut self) {
        let ready: Vec<usize> = (0..self.tracks.len())
            .filter(|&i| self.tracks[i].parked && self.is_ready(i))
            .collect();
        for index in ready {
            let track = &mut self.tracks[index];
            track.parked = false;
            if let Some(notifier) = &track.notifier {
                notifier.notify();
            }
        }
    }

    fn write_record(&mut self, record: &ManifestRecord) -> Result<(), MediaError> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| MediaError::muxer("manifest file is not open"))?;
        let result = serde_json::to_writer(&mut *writer, record)
            .map_err(std::io::Error::from)
            .and_then(|()| writer.write_all(b"\n"));
        result.map_err(|e| self.fail(io_error(&e)))
    }

    fn fail(&mut self, error: MediaError) -> MediaError {
        tracing::error!(error = %error, "Manifest muxer failed");
        self.status = SinkStatus::Failed;
        self.error = Some(error.clone());
        self.writer = None;
        self.wake_ready();
        error
    }
}

fn io_error(err: &std::io::Error) -> MediaError {
    MediaError::new("muxer", err.raw_os_error().unwrap_or(-1), err.to_string())
}

fn checksum(data: &[u8]) -> u32 {
    // FNV-1a
    data.iter().fold(0x811c_9dc5_u32, |hash, byte| {
        (hash ^ u32::from(*byte)).wrapping_mul(0x0100_0193)
    })
}

/// File sink writing a JSON-lines manifest.
pub struct ManifestMuxer {
    location: PathBuf,
    container: ContainerKind,
    state: Arc<Mutex<MuxState>>,
}

impl ManifestMuxer {
    pub fn new(location: impl Into<PathBuf>, container: ContainerKind, window: MediaTime) -> Self {
        Self {
            location: location.into(),
            container,
            state: Arc::new(Mutex::new(MuxState {
                status: SinkStatus::Unknown,
                error: None,
                writer: None,
                tracks: Vec::new(),
                metadata: Vec::new(),
                optimize_for_network_use: false,
                session_start: MediaTime::ZERO,
                window,
            })),
        }
    }

    pub fn location(&self) -> &Path {
        &self.location
    }
}

impl SinkMuxer for ManifestMuxer {
    fn set_metadata(&mut self, items: &[MetadataItem]) {
        self.state.lock().metadata = items.to_vec();
    }

    fn set_optimize_for_network_use(&mut self, enabled: bool) {
        self.state.lock().optimize_for_network_use = enabled;
    }

    fn can_add_track(&self, descriptor: &TrackDescriptor) -> bool {
        if self.state.lock().status != SinkStatus::Unknown {
            return false;
        }
        match (descriptor.kind, &descriptor.settings) {
            (MediaKind::Video, Some(settings)) => settings.dimensions().is_some(),
            _ => true,
        }
    }

    fn add_track(&mut self, descriptor: TrackDescriptor) -> Result<Box<dyn SinkTrack>, MediaError> {
        if !self.can_add_track(&descriptor) {
            return Err(MediaError::muxer(format!(
                "cannot add {} track with the given settings",
                descriptor.kind
            )));
        }
        let mut state = self.state.lock();
        let index = state.tracks.len();
        state.tracks.push(TrackSlot {
            descriptor: descriptor.clone(),
            position: None,
            finished: false,
            samples: 0,
            notifier: None,
            parked: false,
        });
        Ok(Box::new(ManifestSinkTrack {
            index,
            descriptor,
            state: Arc::clone(&self.state),
        }))
    }

    fn start_writing(&mut self) -> Result<(), MediaError> {
        let mut state = self.state.lock();
        if state.status != SinkStatus::Unknown {
            return Err(MediaError::muxer("writing already started"));
        }
        if state.tracks.is_empty() {
            return Err(MediaError::muxer("no tracks were added"));
        }
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.location)
            .map_err(|e| state.fail(io_error(&e)))?;
        state.writer = Some(BufWriter::new(file));
        state.status = SinkStatus::Writing;

        let header = ManifestRecord::Header {
            format: MANIFEST_FORMAT.to_string(),
            version: MANIFEST_VERSION,
            container: self.container.as_str().to_string(),
            created_at: Utc::now(),
            optimize_for_network_use: state.optimize_for_network_use,
            metadata: state.metadata.clone(),
            tracks: state
                .tracks
                .iter()
                .enumerate()
                .map(|(index, track)| ManifestTrack {
                    index,
                    kind: track.descriptor.kind,
                    settings: track.descriptor.settings.clone(),
                })
                .collect(),
        };
        state.write_record(&header)?;
        tracing::debug!(path = %self.location.display(), tracks = state.tracks.len(), "Manifest writing started");
        Ok(())
    }

    fn start_session(&mut self, at: MediaTime) {
        let mut state = self.state.lock();
        state.session_start = at;
        if state.status == SinkStatus::Writing {
            let _ = state.write_record(&ManifestRecord::Session { start: at });
        }
    }

    fn finish_writing(&mut self) -> Result<(), MediaError> {
        let mut state = self.state.lock();
        if state.status != SinkStatus::Writing {
            return Err(MediaError::muxer(format!(
                "cannot finish a manifest in state {:?}",
                state.status
            )));
        }
        for track in &mut state.tracks {
            track.finished = true;
        }
        let samples = state.tracks.iter().map(|track| track.samples).collect();
        state.write_record(&ManifestRecord::Trailer { samples })?;

        let flushed = match state.writer.take() {
            Some(writer) => writer
                .into_inner()
                .map_err(|e| e.into_error())
                .and_then(|file| file.sync_all()),
            None => Ok(()),
        };
        if let Err(e) = flushed {
            return Err(state.fail(io_error(&e)));
        }

        state.status = SinkStatus::Completed;
        state.wake_ready();
        tracing::debug!(path = %self.location.display(), "Manifest committed");
        Ok(())
    }

    fn cancel_writing(&mut self) {
        let mut state = self.state.lock();
        if matches!(state.status, SinkStatus::Unknown | SinkStatus::Writing) {
            state.status = SinkStatus::Cancelled;
            state.writer = None;
            for track in &mut state.tracks {
                track.parked = track.notifier.is_some();
            }
            state.wake_ready();
        }
    }

    fn status(&self) -> SinkStatus {
        self.state.lock().status
    }

    fn error(&self) -> Option<MediaError> {
        self.state.lock().error.clone()
    }
}

struct ManifestSinkTrack {
    index: usize,
    descriptor: TrackDescriptor,
    state: Arc<Mutex<MuxState>>,
}

impl SinkTrack for ManifestSinkTrack {
    fn descriptor(&self) -> &TrackDescriptor {
        &self.descriptor
    }

    fn is_ready_for_more(&self) -> bool {
        let mut state = self.state.lock();
        let ready = state.is_ready(self.index);
        if !ready {
            state.tracks[self.index].parked = true;
        }
        ready
    }

    fn request_data_when_ready(&mut self, notifier: ReadyNotifier) {
        let mut state = self.state.lock();
        let ready = state.is_ready(self.index);
        let track = &mut state.tracks[self.index];
        track.parked = !ready;
        if ready {
            notifier.notify();
        }
        track.notifier = Some(notifier);
    }

    fn push(&mut self, sample: SampleBuffer) -> Result<(), MediaError> {
        let mut state = self.state.lock();
        if state.status != SinkStatus::Writing {
            return Err(MediaError::muxer("manifest is not accepting samples"));
        }
        if state.tracks[self.index].finished {
            return Err(MediaError::muxer(format!(
                "{} track already finished",
                self.descriptor.kind
            )));
        }

        let data: &[u8] = match &sample.payload {
            Payload::Bytes(bytes) => bytes.as_ref(),
            Payload::Frame(frame) => frame.data(),
        };
        let record = ManifestRecord::Sample {
            track: self.index,
            pts: sample.pts,
            duration: sample.duration,
            size: data.len(),
            checksum: checksum(data),
        };
        state.write_record(&record)?;

        let track = &mut state.tracks[self.index];
        track.samples += 1;
        track.position = Some(sample.pts + sample.duration);
        state.wake_ready();
        Ok(())
    }

    fn mark_finished(&mut self) {
        let mut state = self.state.lock();
        state.tracks[self.index].finished = true;
        state.wake_ready();
    }
}

/// What a manifest file says about the export that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct ManifestSummary {
    pub container: String,
    pub tracks: Vec<ManifestTrack>,
    pub metadata: Vec<MetadataItem>,
    pub samples: Vec<u64>,
    pub last_pts: Vec<Option<MediaTime>>,
    /// Whether the trailer was written.
    pub committed: bool,
}

impl ManifestSummary {
    pub fn total_samples(&self) -> u64 {
        self.samples.iter().sum()
    }
}

/// Parse a manifest written by [`ManifestMuxer`].
pub fn read_manifest(path: &Path) -> Result<ManifestSummary, MediaError> {
    let file = File::open(path).map_err(|e| io_error(&e))?;
    let mut summary: Option<ManifestSummary> = None;

    for (line_no, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|e| io_error(&e))?;
        if line.trim().is_empty() {
            continue;
        }
        let record: ManifestRecord = serde_json::from_str(&line).map_err(|e| {
            MediaError::new("manifest", -1, format!("line {}: {e}", line_no + 1))
        })?;
        match record {
            ManifestRecord::Header {
                format,
                container,
                metadata,
                tracks,
                ..
            } if summary.is_none() => {
                if format != MANIFEST_FORMAT {
                    return Err(MediaError::new(
                        "manifest",
                        -1,
                        format!("unexpected format {format:?}"),
                    ));
                }
                summary = Some(ManifestSummary {
                    container,
                    samples: vec![0; tracks.len()],
                    last_pts: vec![None; tracks.len()],
                    tracks,
                    metadata,
                    committed: false,
                });
            }
            record => match summary.as_mut() {
                Some(summary) => apply_record(summary, record, line_no + 1)?,
                None => return Err(out_of_order(line_no + 1)),
            },
        }
    }

    summary.ok_or_else(|| MediaError::new("manifest", -1, "manifest has no header"))
}

fn apply_record(
    summary: &mut ManifestSummary,
    record: ManifestRecord,
    line: usize,
) -> Result<(), MediaError> {
    match record {
        ManifestRecord::Session { .. } => {}
        ManifestRecord::Sample { track, pts, .. } => {
            let count = summary.samples.get_mut(track).ok_or_else(|| {
                MediaError::new("manifest", -1, format!("sample for unknown track {track}"))
            })?;
            *count += 1;
            summary.last_pts[track] = Some(pts);
        }
        ManifestRecord::Trailer { .. } => summary.committed = true,
        ManifestRecord::Header { .. } => return Err(out_of_order(line)),
    }
    Ok(())
}

fn out_of_order(line: usize) -> MediaError {
    MediaError::new("manifest", -1, format!("line {line}: record out of order"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clipforge_media_model::keys;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn audio_sample(ms: i64) -> SampleBuffer {
        SampleBuffer::bytes(
            MediaTime::from_millis(ms),
            MediaTime::from_millis(100),
            vec![0u8; 16],
        )
    }

    fn counting_notifier() -> (ReadyNotifier, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        let notifier = ReadyNotifier::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        (notifier, count)
    }

    fn video_descriptor() -> TrackDescriptor {
        TrackDescriptor::new(
            MediaKind::Video,
            Some(
                OutputSettings::new()
                    .with(keys::CODEC, "h264")
                    .with(keys::WIDTH, 540u32)
                    .with(keys::HEIGHT, 960u32),
            ),
        )
    }

    #[test]
    fn test_commit_writes_readable_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.mp4");
        let mut muxer = ManifestMuxer::new(&path, ContainerKind::mp4(), DEFAULT_INTERLEAVE_WINDOW);
        muxer.set_metadata(&[MetadataItem::new("title", "demo")]);
        let mut video = muxer.add_track(video_descriptor()).unwrap();
        let mut audio = muxer
            .add_track(TrackDescriptor::new(MediaKind::Audio, None))
            .unwrap();
        muxer.start_writing().unwrap();
        muxer.start_session(MediaTime::ZERO);

        for ms in [0, 100, 200] {
            video.push(audio_sample(ms)).unwrap();
            audio.push(audio_sample(ms)).unwrap();
        }
        video.mark_finished();
        muxer.finish_writing().unwrap();
        assert_eq!(muxer.status(), SinkStatus::Completed);

        let summary = read_manifest(&path).unwrap();
        assert!(summary.committed);
        assert_eq!(summary.samples, vec![3, 3]);
        assert_eq!(summary.last_pts[0], Some(MediaTime::from_millis(200)));
        assert_eq!(summary.metadata[0].key, "title");
        assert_eq!(summary.tracks[0].kind, MediaKind::Video);
    }

    #[test]
    fn test_leading_track_parks_until_others_catch_up() {
        let dir = tempfile::tempdir().unwrap();
        let mut muxer = ManifestMuxer::new(
            dir.path().join("out.mp4"),
            ContainerKind::mp4(),
            MediaTime::from_millis(250),
        );
        let mut video = muxer.add_track(video_descriptor()).unwrap();
        let mut audio = muxer
            .add_track(TrackDescriptor::new(MediaKind::Audio, None))
            .unwrap();
        muxer.start_writing().unwrap();

        let (video_notifier, video_wakes) = counting_notifier();
        video.request_data_when_ready(video_notifier);
        assert_eq!(video_wakes.load(Ordering::SeqCst), 1);

        for ms in [0, 100, 200] {
            video.push(audio_sample(ms)).unwrap();
        }
        assert!(!video.is_ready_for_more());

        audio.push(audio_sample(0)).unwrap();
        assert_eq!(video_wakes.load(Ordering::SeqCst), 2);
        assert!(video.is_ready_for_more());
    }

    #[test]
    fn test_finishing_other_track_releases_parked_track() {
        let dir = tempfile::tempdir().unwrap();
        let mut muxer = ManifestMuxer::new(
            dir.path().join("out.mp4"),
            ContainerKind::mp4(),
            MediaTime::ZERO,
        );
        let mut video = muxer.add_track(video_descriptor()).unwrap();
        let mut audio = muxer
            .add_track(TrackDescriptor::new(MediaKind::Audio, None))
            .unwrap();
        muxer.start_writing().unwrap();

        let (notifier, wakes) = counting_notifier();
        video.push(audio_sample(0)).unwrap();
        video.request_data_when_ready(notifier);
        assert_eq!(wakes.load(Ordering::SeqCst), 0);

        audio.mark_finished();
        assert_eq!(wakes.load(Ordering::SeqCst), 1);
        assert!(video.is_ready_for_more());
    }

    #[test]
    fn test_cancel_wakes_tracks_and_rejects_pushes() {
        let dir = tempfile::tempdir().unwrap();
        let mut muxer = ManifestMuxer::new(
            dir.path().join("out.mp4"),
            ContainerKind::mp4(),
            DEFAULT_INTERLEAVE_WINDOW,
        );
        let mut audio = muxer
            .add_track(TrackDescriptor::new(MediaKind::Audio, None))
            .unwrap();
        muxer.start_writing().unwrap();
        let (notifier, wakes) = counting_notifier();
        audio.request_data_when_ready(notifier);

        muxer.cancel_writing();
        assert_eq!(muxer.status(), SinkStatus::Cancelled);
        assert_eq!(wakes.load(Ordering::SeqCst), 2);
        assert!(audio.is_ready_for_more());
        assert!(audio.push(audio_sample(0)).is_err());
        assert!(muxer.finish_writing().is_err());
    }

    #[test]
    fn test_existing_file_fails_start() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("taken.mp4");
        std::fs::write(&path, b"keep me").unwrap();
        let mut muxer = ManifestMuxer::new(&path, ContainerKind::mp4(), DEFAULT_INTERLEAVE_WINDOW);
        muxer
            .add_track(TrackDescriptor::new(MediaKind::Audio, None))
            .unwrap();
        assert!(muxer.start_writing().is_err());
        assert_eq!(muxer.status(), SinkStatus::Failed);
        assert_eq!(std::fs::read(&path).unwrap(), b"keep me");
    }

    #[test]
    fn test_video_track_without_dimensions_is_refused() {
        let muxer = ManifestMuxer::new("unused.mp4", ContainerKind::mp4(), DEFAULT_INTERLEAVE_WINDOW);
        let descriptor = TrackDescriptor::new(
            MediaKind::Video,
            Some(OutputSettings::new().with(keys::CODEC, "h264")),
        );
        assert!(!muxer.can_add_track(&descriptor));
    }

    #[test]
    fn test_factory_rejects_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let location = dir.path().join("missing").join("out.mp4");
        let factory = ManifestMuxerFactory::default();
        assert!(factory.create_muxer(&location, &ContainerKind::mp4()).is_err());
    }
}
