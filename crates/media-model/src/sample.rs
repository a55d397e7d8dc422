//! Sample buffers moved from source to sink.

use bytes::Bytes;
use clipforge_common::time::MediaTime;

use crate::frame::FrameBuffer;

/// Contents of a sample.
#[derive(Debug)]
pub enum Payload {
    /// Encoded or raw interleaved bytes (compressed video, PCM audio,
    /// metadata items).
    Bytes(Bytes),
    /// A decoded video frame.
    Frame(FrameBuffer),
}

/// One timed unit of media.
///
/// Ownership moves from the stream to the pump to the sink; a sample is
/// never modified after it has been handed on.
#[derive(Debug)]
pub struct SampleBuffer {
    pub pts: MediaTime,
    pub duration: MediaTime,
    pub payload: Payload,
}

impl SampleBuffer {
    pub fn bytes(pts: MediaTime, duration: MediaTime, data: impl Into<Bytes>) -> Self {
        Self {
            pts,
            duration,
            payload: Payload::Bytes(data.into()),
        }
    }

    pub fn frame(pts: MediaTime, duration: MediaTime, frame: FrameBuffer) -> Self {
        Self {
            pts,
            duration,
            payload: Payload::Frame(frame),
        }
    }

    /// The decoded frame, if this sample carries one.
    pub fn as_frame(&self) -> Option<&FrameBuffer> {
        match &self.payload {
            Payload::Frame(frame) => Some(frame),
            Payload::Bytes(_) => None,
        }
    }

    /// Payload size in bytes.
    pub fn payload_len(&self) -> usize {
        match &self.payload {
            Payload::Bytes(bytes) => bytes.len(),
            Payload::Frame(frame) => frame.len(),
        }
    }
}
