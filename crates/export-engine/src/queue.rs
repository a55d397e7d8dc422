//! Serial work queue for one export.
//!
//! Every pump invocation and every cancel request for a session runs on a
//! single dedicated thread, so pumps of the same session never overlap and
//! cancellation is ordered after whatever pump work is already queued.

use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle};

use tokio::sync::mpsc;

type Job = Box<dyn FnOnce() + Send + 'static>;

enum Message {
    Run(Job),
    Shutdown,
}

/// Cloneable sending side of a [`SerialQueue`].
#[derive(Clone)]
pub struct QueueHandle {
    tx: mpsc::UnboundedSender<Message>,
}

impl QueueHandle {
    /// Enqueue `job`. Returns `false` if the queue has shut down.
    pub fn submit(&self, job: impl FnOnce() + Send + 'static) -> bool {
        self.tx.send(Message::Run(Box::new(job))).is_ok()
    }
}

/// A worker thread draining jobs in submission order.
pub struct SerialQueue {
    label: String,
    tx: mpsc::UnboundedSender<Message>,
    worker: Option<JoinHandle<()>>,
}

impl SerialQueue {
    pub fn spawn(label: impl Into<String>) -> std::io::Result<Self> {
        let label = label.into();
        let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
        let thread_label = label.clone();

        let worker = thread::Builder::new().name(label.clone()).spawn(move || {
            while let Some(message) = rx.blocking_recv() {
                match message {
                    Message::Run(job) => {
                        if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
                            tracing::error!(queue = %thread_label, "Queued job panicked");
                        }
                    }
                    Message::Shutdown => break,
                }
            }
            tracing::debug!(queue = %thread_label, "Serial queue drained");
        })?;

        Ok(Self {
            label,
            tx,
            worker: Some(worker),
        })
    }

    pub fn handle(&self) -> QueueHandle {
        QueueHandle {
            tx: self.tx.clone(),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Run every job already queued, then stop the worker and wait for it.
    ///
    /// Jobs submitted after this call are dropped unrun.
    pub fn drain(mut self) {
        self.stop_and_join();
    }

    fn stop_and_join(&mut self) {
        let _ = self.tx.send(Message::Shutdown);
        if let Some(worker) = self.worker.take() {
            if worker.thread().id() == thread::current().id() {
                return;
            }
            if worker.join().is_err() {
                tracing::error!(queue = %self.label, "Serial queue worker panicked");
            }
        }
    }
}

impl Drop for SerialQueue {
    fn drop(&mut self) {
        self.stop_and_join();
    }
}
