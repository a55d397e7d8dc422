//! Deterministic generated source: a moving gradient plus a sine tone.
//!
//! Makes the engine runnable end to end without any codec stack, and gives
//! tests a source whose sample count is known in advance.

use std::f64::consts::TAU;
use std::sync::Arc;

use bytes::{BufMut, BytesMut};
use clipforge_common::error::MediaError;
use clipforge_common::time::{MediaTime, TimeRange};
use clipforge_media_model::{
    keys, AffineTransform, FrameBuffer, MediaKind, OutputSettings, PixelFormat, SampleBuffer,
    Size, SourceStatus, SourceTrackInfo, TrackId, VideoComposition,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::media::{MediaAsset, SampleStream, SourceDemuxer};

pub const VIDEO_TRACK: TrackId = TrackId(1);
pub const AUDIO_TRACK: TrackId = TrackId(2);

const TONE_HZ: f64 = 440.0;
const TONE_AMPLITUDE: f64 = 8_000.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyntheticVideo {
    pub natural_size: Size,
    pub frame_rate: f64,
    #[serde(default)]
    pub preferred_transform: AffineTransform,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyntheticAudio {
    pub sample_rate: u32,
    pub channels: u16,
    /// PCM frames per emitted packet.
    pub packet_frames: u32,
}

/// A generated asset with at most one video and one audio track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyntheticAsset {
    pub duration: MediaTime,
    #[serde(default)]
    pub video: Option<SyntheticVideo>,
    #[serde(default)]
    pub audio: Option<SyntheticAudio>,
    /// Simulated decode failure: reading fails once any stream reaches
    /// this source time.
    #[serde(default)]
    pub fail_at: Option<MediaTime>,
}

impl SyntheticAsset {
    pub fn new(duration: MediaTime) -> Self {
        Self {
            duration,
            video: None,
            audio: None,
            fail_at: None,
        }
    }

    pub fn with_video(mut self, natural_size: Size, frame_rate: f64) -> Self {
        self.video = Some(SyntheticVideo {
            natural_size,
            frame_rate,
            preferred_transform: AffineTransform::IDENTITY,
        });
        self
    }

    pub fn with_preferred_transform(mut self, transform: AffineTransform) -> Self {
        if let Some(video) = self.video.as_mut() {
            video.preferred_transform = transform;
        }
        self
    }

    pub fn with_audio(mut self, sample_rate: u32, channels: u16) -> Self {
        self.audio = Some(SyntheticAudio {
            sample_rate,
            channels,
            packet_frames: 1024,
        });
        self
    }

    pub fn failing_at(mut self, at: MediaTime) -> Self {
        self.fail_at = Some(at);
        self
    }
}

impl MediaAsset for SyntheticAsset {
    fn duration(&self) -> MediaTime {
        self.duration
    }

    fn tracks(&self) -> Vec<SourceTrackInfo> {
        let mut tracks = Vec::new();
        if let Some(video) = &self.video {
            tracks.push(
                SourceTrackInfo::video(VIDEO_TRACK.0, video.natural_size, video.frame_rate)
                    .with_transform(video.preferred_transform),
            );
        }
        if self.audio.is_some() {
            tracks.push(SourceTrackInfo::audio(AUDIO_TRACK.0));
        }
        tracks
    }

    fn open_demuxer(&self) -> Result<Box<dyn SourceDemuxer>, MediaError> {
        Ok(Box::new(SyntheticDemuxer {
            asset: self.clone(),
            shared: Arc::new(Mutex::new(ReaderState {
                status: SourceStatus::Unknown,
                error: None,
                range: TimeRange::FULL,
                open_streams: 0,
            })),
        }))
    }
}

struct ReaderState {
    status: SourceStatus,
    error: Option<MediaError>,
    range: TimeRange,
    open_streams: usize,
}

impl ReaderState {
    fn end(&self, duration: MediaTime) -> MediaTime {
        self.range.end().map_or(duration, |end| end.min(duration))
    }
}

struct SyntheticDemuxer {
    asset: SyntheticAsset,
    shared: Arc<Mutex<ReaderState>>,
}

impl SyntheticDemuxer {
    fn check_configurable(&self, tracks: &[TrackId], wanted: TrackId) -> Result<(), MediaError> {
        if self.shared.lock().status != SourceStatus::Unknown {
            return Err(MediaError::demuxer("outputs must be added before reading starts"));
        }
        if !tracks.contains(&wanted) {
            return Err(MediaError::demuxer(format!("unknown track selection {tracks:?}")));
        }
        Ok(())
    }
}

impl SourceDemuxer for SyntheticDemuxer {
    fn set_time_range(&mut self, range: TimeRange) {
        self.shared.lock().range = range;
    }

    fn add_video_output(
        &mut self,
        tracks: &[TrackId],
        decode: &OutputSettings,
        composition: &VideoComposition,
    ) -> Result<Box<dyn SampleStream>, MediaError> {
        self.check_configurable(tracks, VIDEO_TRACK)?;
        let video = self
            .asset
            .video
            .as_ref()
            .ok_or_else(|| MediaError::demuxer("asset has no video"))?;

        let frame_duration = if composition.frame_duration.as_nanos() > 0 {
            composition.frame_duration
        } else {
            MediaTime::frame_duration(video.frame_rate)
        };
        if frame_duration.as_nanos() <= 0 {
            return Err(MediaError::demuxer("video output has no frame rate"));
        }
        let (width, height) = composition.render_size.to_pixels();
        let format = decode
            .get_str(keys::PIXEL_FORMAT)
            .map(PixelFormat::new)
            .unwrap_or_else(PixelFormat::bgra);

        self.shared.lock().open_streams += 1;
        Ok(Box::new(SyntheticStream {
            kind: MediaKind::Video,
            shared: Arc::clone(&self.shared),
            duration: self.asset.duration,
            fail_at: self.asset.fail_at,
            step: frame_duration,
            index: 0,
            exhausted: false,
            generator: Generator::Video {
                width,
                height,
                format,
            },
        }))
    }

    fn add_audio_output(
        &mut self,
        tracks: &[TrackId],
        _decode: &OutputSettings,
    ) -> Result<Box<dyn SampleStream>, MediaError> {
        self.check_configurable(tracks, AUDIO_TRACK)?;
        let audio = self
            .asset
            .audio
            .clone()
            .ok_or_else(|| MediaError::demuxer("asset has no audio"))?;
        if audio.sample_rate == 0 || audio.channels == 0 || audio.packet_frames == 0 {
            return Err(MediaError::demuxer("audio layout must be non-zero"));
        }
        let step = MediaTime::from_nanos(
            i64::from(audio.packet_frames) * 1_000_000_000 / i64::from(audio.sample_rate),
        );

        self.shared.lock().open_streams += 1;
        Ok(Box::new(SyntheticStream {
            kind: MediaKind::Audio,
            shared: Arc::clone(&self.shared),
            duration: self.asset.duration,
            fail_at: self.asset.fail_at,
            step,
            index: 0,
            exhausted: false,
            generator: Generator::Tone(audio),
        }))
    }

    fn start_reading(&mut self) -> Result<(), MediaError> {
        let mut state = self.shared.lock();
        if state.status != SourceStatus::Unknown {
            return Err(MediaError::demuxer("reading already started"));
        }
        if state.open_streams == 0 {
            return Err(MediaError::demuxer("no outputs were added"));
        }
        state.status = SourceStatus::Reading;
        Ok(())
    }

    fn cancel_reading(&mut self) {
        let mut state = self.shared.lock();
        if matches!(state.status, SourceStatus::Unknown | SourceStatus::Reading) {
            state.status = SourceStatus::Cancelled;
        }
    }

    fn status(&self) -> SourceStatus {
        self.shared.lock().status
    }

    fn error(&self) -> Option<MediaError> {
        self.shared.lock().error.clone()
    }
}

enum Generator {
    Video {
        width: u32,
        height: u32,
        format: PixelFormat,
    },
    Tone(SyntheticAudio),
}

impl Generator {
    fn sample(&self, index: i64, pts: MediaTime, duration: MediaTime) -> SampleBuffer {
        match self {
            Generator::Video {
                width,
                height,
                format,
            } => {
                let mut frame = FrameBuffer::new(*width, *height, format.clone());
                let shade = (index % 251) as u8;
                for (row, line) in frame.data_mut().chunks_mut(format.stride(*width).max(1)).enumerate() {
                    line.fill(shade.wrapping_add(row as u8));
                }
                SampleBuffer::frame(pts, duration, frame)
            }
            Generator::Tone(audio) => {
                let frames = audio.packet_frames as usize;
                let channels = usize::from(audio.channels);
                let mut pcm = BytesMut::with_capacity(frames * channels * 2);
                let first = index * i64::from(audio.packet_frames);
                for n in 0..frames as i64 {
                    let t = (first + n) as f64 / f64::from(audio.sample_rate);
                    let value = ((TAU * TONE_HZ * t).sin() * TONE_AMPLITUDE) as i16;
                    for _ in 0..channels {
                        pcm.put_i16_le(value);
                    }
                }
                SampleBuffer::bytes(pts, duration, pcm.freeze())
            }
        }
    }
}

struct SyntheticStream {
    kind: MediaKind,
    shared: Arc<Mutex<ReaderState>>,
    duration: MediaTime,
    fail_at: Option<MediaTime>,
    step: MediaTime,
    index: i64,
    exhausted: bool,
    generator: Generator,
}

impl SampleStream for SyntheticStream {
    fn kind(&self) -> MediaKind {
        self.kind
    }

    fn next_sample(&mut self) -> Option<SampleBuffer> {
        let mut state = self.shared.lock();
        if self.exhausted || state.status != SourceStatus::Reading {
            return None;
        }

        let pts = MediaTime::from_nanos(
            state.range.start.as_nanos() + self.index * self.step.as_nanos(),
        );
        if self.fail_at.map_or(false, |at| pts >= at) {
            state.status = SourceStatus::Failed;
            state.error = Some(MediaError::new(
                "demuxer",
                -11_829,
                format!("synthetic decode failure at {pts}"),
            ));
            return None;
        }
        if pts >= state.end(self.duration) {
            self.exhausted = true;
            state.open_streams = state.open_streams.saturating_sub(1);
            if state.open_streams == 0 {
                state.status = SourceStatus::Completed;
            }
            return None;
        }
        drop(state);

        let sample = self.generator.sample(self.index, pts, self.step);
        self.index += 1;
        Some(sample)
    }
}
