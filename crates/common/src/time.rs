//! Media time utilities.
//!
//! All Clipforge timestamps are signed nanosecond counts on the source
//! asset's timeline. This module provides:
//! - `MediaTime` conversion to and from seconds
//! - `TimeRange` with an optionally unbounded end

use std::fmt;
use std::ops::{Add, Sub};

use serde::{Deserialize, Serialize};

const NANOS_PER_SEC: f64 = 1_000_000_000.0;

/// A point (or span) on the media timeline, in nanoseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MediaTime(i64);

impl MediaTime {
    pub const ZERO: MediaTime = MediaTime(0);

    pub const fn from_nanos(ns: i64) -> Self {
        Self(ns)
    }

    pub fn from_millis(ms: i64) -> Self {
        Self(ms.saturating_mul(1_000_000))
    }

    /// Convert seconds to media time, rounding to the nearest nanosecond.
    pub fn from_secs_f64(secs: f64) -> Self {
        Self((secs * NANOS_PER_SEC).round() as i64)
    }

    /// Duration of one frame at `fps` frames per second.
    pub fn frame_duration(fps: f64) -> Self {
        if fps <= 0.0 {
            return Self::ZERO;
        }
        Self::from_secs_f64(1.0 / fps)
    }

    pub const fn as_nanos(self) -> i64 {
        self.0
    }

    pub fn as_secs_f64(self) -> f64 {
        self.0 as f64 / NANOS_PER_SEC
    }

    pub fn is_negative(self) -> bool {
        self.0 < 0
    }
}

impl Add for MediaTime {
    type Output = MediaTime;

    fn add(self, rhs: MediaTime) -> MediaTime {
        MediaTime(self.0.saturating_add(rhs.0))
    }
}

impl Sub for MediaTime {
    type Output = MediaTime;

    fn sub(self, rhs: MediaTime) -> MediaTime {
        MediaTime(self.0.saturating_sub(rhs.0))
    }
}

impl fmt::Display for MediaTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}s", self.as_secs_f64())
    }
}

/// A half-open range `[start, start + duration)` on the media timeline.
///
/// `duration: None` means the range runs to the end of the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: MediaTime,
    #[serde(default)]
    pub duration: Option<MediaTime>,
}

impl TimeRange {
    /// The whole source: starts at zero, unbounded end.
    pub const FULL: TimeRange = TimeRange {
        start: MediaTime::ZERO,
        duration: None,
    };

    pub fn new(start: MediaTime, duration: MediaTime) -> Self {
        Self {
            start,
            duration: Some(duration),
        }
    }

    pub fn from_start(start: MediaTime) -> Self {
        Self {
            start,
            duration: None,
        }
    }

    /// End of the range, or `None` when unbounded.
    pub fn end(&self) -> Option<MediaTime> {
        self.duration.map(|d| self.start + d)
    }

    pub fn is_unbounded(&self) -> bool {
        self.duration.is_none()
    }

    /// Whether `t` falls inside the range.
    pub fn contains(&self, t: MediaTime) -> bool {
        t >= self.start && self.end().map_or(true, |end| t < end)
    }

    /// Duration to use for progress and composition: the requested
    /// duration if finite, else the full source duration.
    pub fn effective_duration(&self, source_duration: MediaTime) -> MediaTime {
        self.duration.unwrap_or(source_duration)
    }
}

impl Default for TimeRange {
    fn default() -> Self {
        Self::FULL
    }
}
