//! Outbound event channel from the loop runner to observers.

use log::debug;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::domain::LoopRunnerEvent;

/// Sending half of the observer channel.
///
/// Unbounded so the runner never waits on a slow observer; order is the
/// order of `emit` calls. Sending to a dropped receiver is ignored.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: Option<mpsc::UnboundedSender<LoopRunnerEvent>>,
}

impl EventSink {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<LoopRunnerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// Forward every event to `callback` on a spawned task.
    ///
    /// The task ends once all clones of the sink are dropped and the queue
    /// has drained.
    pub fn from_callback<F>(mut callback: F) -> (Self, JoinHandle<()>)
    where
        F: FnMut(LoopRunnerEvent) + Send + 'static,
    {
        let (sink, mut rx) = Self::channel();
        let handle = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                callback(event);
            }
        });
        (sink, handle)
    }

    /// A sink nobody listens to
    pub fn discard() -> Self {
        Self { tx: None }
    }

    pub fn emit(&self, event: LoopRunnerEvent) {
        let Some(tx) = &self.tx else {
            return;
        };
        if let Err(e) = tx.send(event) {
            debug!("observer gone, dropping {} event", e.0.kind());
        }
    }
}
