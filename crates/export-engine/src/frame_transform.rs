//! Per-frame rendering through a caller hook.

use std::sync::{Arc, Weak};

use clipforge_common::error::MediaError;
use clipforge_common::time::MediaTime;
use clipforge_media_model::{FrameBuffer, FramePool, SampleBuffer};

/// Caller hook drawing one output frame.
///
/// Receives the decoded source frame, the frame time relative to the start
/// of the export range, and a pooled render target of the composition's
/// render size.
pub type RenderHook = dyn Fn(&FrameBuffer, MediaTime, &mut FrameBuffer) + Send + Sync;

/// Runs the render hook for a video pump.
///
/// Holds the hook weakly: the session owns it and releases it at
/// completion, after which frames pass through untouched.
pub struct FrameTransformer {
    pool: FramePool,
    range_start: MediaTime,
    hook: Weak<RenderHook>,
    max_consecutive_failures: u32,
    consecutive_failures: u32,
    rendered: u64,
}

impl FrameTransformer {
    pub fn new(
        pool: FramePool,
        range_start: MediaTime,
        hook: &Arc<RenderHook>,
        max_consecutive_failures: u32,
    ) -> Self {
        Self {
            pool,
            range_start,
            hook: Arc::downgrade(hook),
            max_consecutive_failures,
            consecutive_failures: 0,
            rendered: 0,
        }
    }

    /// Turn a decoded sample into the sample to push.
    ///
    /// The rendered frame keeps the source presentation time. When no render
    /// buffer is free the source sample is passed through; once that happens
    /// more than `max_consecutive_failures` times in a row an error is
    /// returned and the sample is dropped.
    pub fn transform(&mut self, sample: SampleBuffer) -> Result<SampleBuffer, MediaError> {
        let Some(hook) = self.hook.upgrade() else {
            return Ok(sample);
        };
        let Some(source) = sample.as_frame() else {
            return Ok(sample);
        };

        let Some(mut target) = self.pool.acquire() else {
            self.consecutive_failures += 1;
            if self.consecutive_failures > self.max_consecutive_failures {
                return Err(MediaError::new(
                    "frame-pool",
                    -1,
                    format!(
                        "no render buffer available after {} attempts",
                        self.consecutive_failures
                    ),
                ));
            }
            tracing::warn!(
                pts = %sample.pts,
                outstanding = self.pool.outstanding(),
                "Render buffer pool exhausted; passing source frame through"
            );
            return Ok(sample);
        };
        self.consecutive_failures = 0;

        hook(source, sample.pts - self.range_start, &mut target);
        self.rendered += 1;

        Ok(SampleBuffer::frame(sample.pts, sample.duration, target))
    }

    pub fn frames_rendered(&self) -> u64 {
        self.rendered
    }

    pub fn pool(&self) -> &FramePool {
        &self.pool
    }
}
