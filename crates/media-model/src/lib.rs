//! Clipforge Media Model
//!
//! Defines the data contracts shared by the export engine and its
//! collaborators:
//! - **Tracks:** media kinds, source track info, output track descriptors
//! - **Settings:** open key/value output settings
//! - **Samples:** timed sample buffers and raw frames with a bounded pool
//! - **Geometry:** sizes and affine transforms for frame composition
//! - **Status:** source, sink, pump, and session states
//! - **Request:** the caller-facing description of one export

pub mod composition;
pub mod frame;
pub mod geometry;
pub mod request;
pub mod sample;
pub mod settings;
pub mod status;
pub mod track;

pub use composition::*;
pub use frame::*;
pub use geometry::*;
pub use request::*;
pub use sample::*;
pub use settings::*;
pub use status::*;
pub use track::*;
