//! Single-in-flight guard around one inference source.
//!
//! The render step must never wait on a model. A slot launches at most one
//! inference task at a time on the tokio runtime, and the task reports back
//! over a `oneshot` channel that the render step polls without blocking.
//! Each outcome carries the stream generation it was launched under, so the
//! caller can drop results that outlived the stream they were meant for.

use std::future::Future;
use std::time::{Duration, Instant};

use tokio::runtime::Handle;
use tokio::sync::oneshot::{self, error::TryRecvError};
use tracing::{debug, warn};

use crate::error::MediaResult;

/// Result of one finished inference task.
#[derive(Debug)]
pub struct InferenceOutcome<T> {
    /// Stream generation at launch time
    pub generation: u64,
    /// Wall time spent inside the model call
    pub latency: Duration,
    pub result: MediaResult<T>,
}

/// At-most-one-outstanding inference task for a single source.
#[derive(Debug)]
pub struct InferenceSlot<T> {
    kind: &'static str,
    pending: Option<oneshot::Receiver<InferenceOutcome<T>>>,
    launched: u64,
}

impl<T: Send + 'static> InferenceSlot<T> {
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            pending: None,
            launched: 0,
        }
    }

    /// Whether a task is outstanding.
    pub fn is_busy(&self) -> bool {
        self.pending.is_some()
    }

    /// Total tasks launched through this slot.
    pub fn launched(&self) -> u64 {
        self.launched
    }

    /// Spawn `inference` unless a previous task is still outstanding.
    ///
    /// Returns whether a task was launched.
    pub fn launch<F>(&mut self, runtime: &Handle, generation: u64, inference: F) -> bool
    where
        F: Future<Output = MediaResult<T>> + Send + 'static,
    {
        if self.pending.is_some() {
            return false;
        }

        let (tx, rx) = oneshot::channel();
        runtime.spawn(async move {
            let started = Instant::now();
            let result = inference.await;
            // Receiver is gone when the loop was dropped; nothing to do then
            let _ = tx.send(InferenceOutcome {
                generation,
                latency: started.elapsed(),
                result,
            });
        });

        self.pending = Some(rx);
        self.launched += 1;
        debug!(kind = self.kind, generation, "Inference launched");
        true
    }

    /// Take the finished outcome, if any. Never blocks.
    pub fn poll(&mut self) -> Option<InferenceOutcome<T>> {
        let rx = self.pending.as_mut()?;
        match rx.try_recv() {
            Ok(outcome) => {
                self.pending = None;
                Some(outcome)
            }
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Closed) => {
                // Task panicked or was torn down with the runtime
                self.pending = None;
                warn!(kind = self.kind, "Inference task ended without a result");
                None
            }
        }
    }
}
