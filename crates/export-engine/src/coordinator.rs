//! Completion barrier and finalization.
//!
//! Each pump owns one [`BarrierSlot`] and signals it exactly once when it
//! reaches a terminal state. The [`CompletionCoordinator`] waits for every
//! slot, then decides whether the container is committed or abandoned.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use clipforge_common::error::MediaError;
use clipforge_media_model::{ExportStatus, MediaKind, PumpState, SinkStatus};
use tokio::sync::oneshot;

use crate::media::{SharedDemuxer, SharedMuxer};
use crate::queue::SerialQueue;
use crate::status::{derive_status, finalize_action, FinalizeAction, SessionFlags};

/// Terminal report of one pump.
#[derive(Debug, Clone)]
pub struct PumpOutcome {
    pub kind: MediaKind,
    pub state: PumpState,
    /// Error raised by the pump itself (rejected push, exhausted pool).
    pub fault: Option<MediaError>,
    pub samples: u64,
}

/// Sending half of one barrier slot.
#[derive(Debug)]
pub struct BarrierSlot {
    kind: MediaKind,
    tx: oneshot::Sender<PumpOutcome>,
}

impl BarrierSlot {
    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    pub fn signal(self, outcome: PumpOutcome) {
        if self.tx.send(outcome).is_err() {
            tracing::debug!(track = %self.kind, "Barrier already gone; outcome dropped");
        }
    }
}

/// Receiving side: one slot per pump.
#[derive(Debug, Default)]
pub struct CompletionBarrier {
    slots: Vec<(MediaKind, oneshot::Receiver<PumpOutcome>)>,
}

impl CompletionBarrier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn slot(&mut self, kind: MediaKind) -> BarrierSlot {
        let (tx, rx) = oneshot::channel();
        self.slots.push((kind, rx));
        BarrierSlot { kind, tx }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Block the current thread until every slot has been signaled.
    ///
    /// Must not be called from inside an async runtime worker.
    pub fn wait(self) -> Vec<PumpOutcome> {
        self.slots
            .into_iter()
            .map(|(kind, rx)| rx.blocking_recv().unwrap_or_else(|_| dropped_slot(kind)))
            .collect()
    }

    pub async fn wait_async(self) -> Vec<PumpOutcome> {
        let mut outcomes = Vec::with_capacity(self.slots.len());
        for (kind, rx) in self.slots {
            outcomes.push(rx.await.unwrap_or_else(|_| dropped_slot(kind)));
        }
        outcomes
    }
}

fn dropped_slot(kind: MediaKind) -> PumpOutcome {
    PumpOutcome {
        kind,
        state: PumpState::Aborted,
        fault: Some(MediaError::new(
            "pump",
            -1,
            "pump released before reaching a terminal state",
        )),
        samples: 0,
    }
}

/// Result of finalization.
#[derive(Debug, Clone)]
pub struct Settlement {
    pub status: ExportStatus,
    pub error: Option<MediaError>,
    pub outcomes: Vec<PumpOutcome>,
}

/// Waits for all pumps, then commits or abandons the output.
pub struct CompletionCoordinator {
    barrier: CompletionBarrier,
    queue: SerialQueue,
    demuxer: SharedDemuxer,
    muxer: SharedMuxer,
    flags: Arc<SessionFlags>,
    output: PathBuf,
}

impl CompletionCoordinator {
    pub fn new(
        barrier: CompletionBarrier,
        queue: SerialQueue,
        demuxer: SharedDemuxer,
        muxer: SharedMuxer,
        flags: Arc<SessionFlags>,
        output: PathBuf,
    ) -> Self {
        Self {
            barrier,
            queue,
            demuxer,
            muxer,
            flags,
            output,
        }
    }

    pub fn finalize(mut self) -> Settlement {
        let barrier = std::mem::take(&mut self.barrier);
        let outcomes = barrier.wait();
        self.settle(outcomes)
    }

    fn settle(self, outcomes: Vec<PumpOutcome>) -> Settlement {
        // Let cancel requests that are already queued land before deciding.
        self.queue.drain();

        if outcomes.iter().any(|outcome| outcome.fault.is_some()) {
            self.flags.mark_runtime_fault();
        }

        let source = self.demuxer.lock().status();
        let sink = self.muxer.lock().status();
        let inputs = self.flags.inputs(source, sink);
        let action = finalize_action(inputs);
        tracing::info!(
            source = ?source,
            sink = ?sink,
            cancel_requested = inputs.cancel_requested,
            runtime_fault = inputs.runtime_fault,
            action = ?action,
            "Finalizing export"
        );

        let mut commit_error = None;
        match action {
            FinalizeAction::Commit => {
                let mut muxer = self.muxer.lock();
                if let Err(err) = muxer.finish_writing() {
                    tracing::error!(error = %err, "Committing output failed");
                    if muxer.status() != SinkStatus::Failed {
                        self.flags.mark_runtime_fault();
                        muxer.cancel_writing();
                    }
                    commit_error = Some(err);
                }
            }
            FinalizeAction::Cancel => self.muxer.lock().cancel_writing(),
            FinalizeAction::LeaveFailed => {}
        }

        let source = self.demuxer.lock().status();
        let (sink, sink_error) = {
            let muxer = self.muxer.lock();
            (muxer.status(), muxer.error())
        };
        let status = derive_status(self.flags.inputs(source, sink));

        let error = sink_error
            .or(commit_error)
            .or_else(|| self.demuxer.lock().error())
            .or_else(|| outcomes.iter().find_map(|outcome| outcome.fault.clone()));

        if status != ExportStatus::Completed {
            remove_partial_output(&self.output);
        }

        tracing::info!(status = %status, error = ?error.as_ref().map(ToString::to_string), "Export settled");
        Settlement {
            status,
            error,
            outcomes,
        }
    }
}

/// Delete the output artifact, tolerating its absence.
pub(crate) fn remove_partial_output(path: &std::path::Path) {
    match std::fs::remove_file(path) {
        Ok(()) => tracing::info!(path = %path.display(), "Removed partial output"),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "Failed to remove partial output")
        }
    }
}
