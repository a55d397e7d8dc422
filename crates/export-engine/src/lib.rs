//! Clipforge Export Engine
//!
//! Pull-driven export pipeline that moves samples from a source demuxer
//! into a sink muxer, one pump per output track, and reconciles the pumps
//! into a single outcome.
//!
//! # Pipeline Architecture
//!
//! ```text
//! MediaAsset ──► SourceDemuxer ──┬── video SampleStream ──► TrackPump ──► SinkTrack ──┐
//!                                │        (FrameTransformer)                          │
//!                                └── audio SampleStream ──► TrackPump ──► SinkTrack ──┤
//!                                                                                     ▼
//!                         SerialQueue (pump runs, cancels)                      SinkMuxer
//!                                                                                     │
//!               CompletionBarrier ◄── one slot per pump ──────────────────────────────┤
//!                       │                                                             │
//!                       ▼                                                             ▼
//!            CompletionCoordinator ── commit / cancel / delete partial ──►   output file
//! ```
//!
//! The demuxer and muxer are traits ([`media`]); [`synthetic`] and
//! [`manifest`] provide a generated source and a JSON-lines file sink so the
//! pipeline runs without a codec stack.

pub mod coordinator;
pub mod frame_transform;
pub mod manifest;
pub mod media;
pub mod pump;
pub mod queue;
pub mod session;
pub mod status;
pub mod synthetic;
pub mod transform;

pub use coordinator::{PumpOutcome, Settlement};
pub use frame_transform::{FrameTransformer, RenderHook};
pub use manifest::{read_manifest, ManifestMuxer, ManifestMuxerFactory, ManifestSummary};
pub use media::{
    MediaAsset, MuxerFactory, ReadyNotifier, SampleStream, SinkMuxer, SinkTrack, SourceDemuxer,
};
pub use session::{run_export, ExportHandle, ExportOutcome, ExportSession};
pub use status::{derive_status, StatusInputs};
pub use synthetic::SyntheticAsset;
pub use transform::{compute_composition, CompositionInputs};
