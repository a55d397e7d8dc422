//! Raw video frames and the render buffer pool.
//!
//! A [`FramePool`] owns the backing storage of the buffers it hands out.
//! A pooled [`FrameBuffer`] carries a lease back to its pool; when the
//! buffer is dropped (typically by the sink after it consumed the frame)
//! its storage returns to the pool for reuse.

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Opaque pixel format identifier (`"bgra"`, `"nv12"`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PixelFormat(pub String);

impl PixelFormat {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn bgra() -> Self {
        Self::new("bgra")
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Bytes in one row of the first plane.
    pub fn stride(&self, width: u32) -> usize {
        match self.0.as_str() {
            "nv12" | "yuv420p" | "i420" | "gray" => width as usize,
            _ => width as usize * 4,
        }
    }

    /// Bytes needed to hold a whole frame. Unknown formats are assumed to
    /// be 32 bits per pixel.
    pub fn frame_len(&self, width: u32, height: u32) -> usize {
        let (w, h) = (width as usize, height as usize);
        match self.0.as_str() {
            "nv12" | "yuv420p" | "i420" => w * h + 2 * (w.div_ceil(2) * h.div_ceil(2)),
            "gray" => w * h,
            _ => w * h * 4,
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A raw video frame.
pub struct FrameBuffer {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    /// Bytes per row of the first plane.
    pub stride: usize,
    data: Vec<u8>,
    lease: Option<PoolLease>,
}

impl FrameBuffer {
    /// Allocate a zeroed frame outside of any pool.
    pub fn new(width: u32, height: u32, format: PixelFormat) -> Self {
        let data = vec![0u8; format.frame_len(width, height)];
        Self::from_data(width, height, format, data)
    }

    /// Wrap existing pixel data. `data` is padded or truncated to the
    /// frame length of `format`.
    pub fn from_data(width: u32, height: u32, format: PixelFormat, mut data: Vec<u8>) -> Self {
        data.resize(format.frame_len(width, height), 0);
        Self {
            width,
            height,
            stride: format.stride(width),
            format,
            data,
            lease: None,
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Whether this buffer was handed out by a [`FramePool`].
    pub fn is_pooled(&self) -> bool {
        self.lease.is_some()
    }

    /// Fill every byte of the frame with `value`.
    pub fn fill(&mut self, value: u8) {
        self.data.fill(value);
    }

    /// Copy as much of `other` as fits into this frame.
    pub fn copy_from(&mut self, other: &FrameBuffer) {
        let n = self.data.len().min(other.data.len());
        self.data[..n].copy_from_slice(&other.data[..n]);
    }
}

impl fmt::Debug for FrameBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameBuffer")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("format", &self.format)
            .field("len", &self.data.len())
            .field("pooled", &self.is_pooled())
            .finish()
    }
}

impl Drop for FrameBuffer {
    fn drop(&mut self) {
        if let Some(lease) = self.lease.take() {
            lease.give_back(std::mem::take(&mut self.data));
        }
    }
}

struct PoolLease {
    pool: Weak<Mutex<PoolInner>>,
}

impl PoolLease {
    fn give_back(self, data: Vec<u8>) {
        if let Some(pool) = self.pool.upgrade() {
            let mut inner = pool.lock();
            inner.outstanding = inner.outstanding.saturating_sub(1);
            if data.len() == inner.frame_len && inner.free.len() < inner.capacity {
                inner.free.push(data);
            }
        }
    }
}

struct PoolInner {
    width: u32,
    height: u32,
    format: PixelFormat,
    frame_len: usize,
    capacity: usize,
    outstanding: usize,
    free: Vec<Vec<u8>>,
    total_allocated: usize,
}

/// A bounded pool of render buffers with fixed dimensions.
///
/// At most `capacity` buffers are outstanding at once; [`FramePool::acquire`]
/// returns `None` when the pool is exhausted.
#[derive(Clone)]
pub struct FramePool {
    inner: Arc<Mutex<PoolInner>>,
}

impl FramePool {
    pub fn new(width: u32, height: u32, format: PixelFormat, capacity: usize) -> Self {
        let frame_len = format.frame_len(width, height);
        Self {
            inner: Arc::new(Mutex::new(PoolInner {
                width,
                height,
                format,
                frame_len,
                capacity,
                outstanding: 0,
                free: Vec::with_capacity(capacity),
                total_allocated: 0,
            })),
        }
    }

    /// Borrow a buffer. Recycled storage is reused when available; the
    /// contents of a recycled buffer are unspecified.
    pub fn acquire(&self) -> Option<FrameBuffer> {
        let mut inner = self.inner.lock();
        if inner.outstanding >= inner.capacity {
            return None;
        }
        let data = match inner.free.pop() {
            Some(data) => data,
            None => {
                inner.total_allocated += 1;
                vec![0u8; inner.frame_len]
            }
        };
        inner.outstanding += 1;
        Some(FrameBuffer {
            width: inner.width,
            height: inner.height,
            stride: inner.format.stride(inner.width),
            format: inner.format.clone(),
            data,
            lease: Some(PoolLease {
                pool: Arc::downgrade(&self.inner),
            }),
        })
    }

    /// Frame dimensions of buffers from this pool.
    pub fn dimensions(&self) -> (u32, u32) {
        let inner = self.inner.lock();
        (inner.width, inner.height)
    }

    /// Buffers currently lent out.
    pub fn outstanding(&self) -> usize {
        self.inner.lock().outstanding
    }

    /// Recycled buffers waiting for reuse.
    pub fn available(&self) -> usize {
        self.inner.lock().free.len()
    }

    /// Total number of fresh allocations made by this pool.
    pub fn total_allocated(&self) -> usize {
        self.inner.lock().total_allocated
    }
}

impl fmt::Debug for FramePool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("FramePool")
            .field("width", &inner.width)
            .field("height", &inner.height)
            .field("format", &inner.format)
            .field("capacity", &inner.capacity)
            .field("outstanding", &inner.outstanding)
            .finish()
    }
}
