//! Session status projection.
//!
//! The session never stores its own status. It is recomputed on every query
//! from the demuxer and muxer states plus two session flags, so there is a
//! single source of truth and no way for the two to drift apart.

use std::sync::atomic::{AtomicBool, Ordering};

use clipforge_media_model::{ExportStatus, SinkStatus, SourceStatus};

/// Everything the projection looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusInputs {
    pub source: SourceStatus,
    pub sink: SinkStatus,
    /// The caller asked for cancellation.
    pub cancel_requested: bool,
    /// A pump failed without either collaborator reporting failure.
    pub runtime_fault: bool,
}

/// Map collaborator states to the caller-facing status.
///
/// Precedence, first match wins:
/// 1. caller cancellation that reached a collaborator
/// 2. sink failure, then source failure, then an engine fault
/// 3. any other cancellation
/// 4. sink completed, sink writing, source started ahead of the sink
pub fn derive_status(inputs: StatusInputs) -> ExportStatus {
    let StatusInputs {
        source,
        sink,
        cancel_requested,
        runtime_fault,
    } = inputs;
    let any_cancelled = source == SourceStatus::Cancelled || sink == SinkStatus::Cancelled;

    if cancel_requested && any_cancelled {
        return ExportStatus::Cancelled;
    }
    if sink == SinkStatus::Failed || source == SourceStatus::Failed || runtime_fault {
        return ExportStatus::Failed;
    }
    if any_cancelled {
        return ExportStatus::Cancelled;
    }
    match (source, sink) {
        (_, SinkStatus::Completed) => ExportStatus::Completed,
        (_, SinkStatus::Writing) => ExportStatus::Exporting,
        (SourceStatus::Reading | SourceStatus::Completed, SinkStatus::Unknown) => {
            ExportStatus::Waiting
        }
        _ => ExportStatus::Unknown,
    }
}

/// What the coordinator does to the muxer once every pump has settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalizeAction {
    /// Commit the container.
    Commit,
    /// Abandon the container.
    Cancel,
    /// The muxer already failed; leave it as is.
    LeaveFailed,
}

/// Decide how to finalize given the settled states.
pub fn finalize_action(inputs: StatusInputs) -> FinalizeAction {
    if derive_status(inputs) == ExportStatus::Cancelled {
        return FinalizeAction::Cancel;
    }
    if inputs.sink == SinkStatus::Failed {
        return FinalizeAction::LeaveFailed;
    }
    if inputs.source == SourceStatus::Failed || inputs.runtime_fault {
        return FinalizeAction::Cancel;
    }
    FinalizeAction::Commit
}

/// Flags shared by a session, its pumps, and its coordinator.
#[derive(Debug, Default)]
pub struct SessionFlags {
    cancel_requested: AtomicBool,
    runtime_fault: AtomicBool,
}

impl SessionFlags {
    /// Returns `true` if this call set the flag.
    pub fn request_cancel(&self) -> bool {
        !self.cancel_requested.swap(true, Ordering::SeqCst)
    }

    /// Returns `true` if this call set the flag.
    pub fn mark_runtime_fault(&self) -> bool {
        !self.runtime_fault.swap(true, Ordering::SeqCst)
    }

    pub fn cancel_requested(&self) -> bool {
        self.cancel_requested.load(Ordering::SeqCst)
    }

    pub fn runtime_fault(&self) -> bool {
        self.runtime_fault.load(Ordering::SeqCst)
    }

    pub fn inputs(&self, source: SourceStatus, sink: SinkStatus) -> StatusInputs {
        StatusInputs {
            source,
            sink,
            cancel_requested: self.cancel_requested(),
            runtime_fault: self.runtime_fault(),
        }
    }
}
