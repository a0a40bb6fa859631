use std::sync::Arc;

use tokio::sync::mpsc;

use cohort_realtime::EventCallback;
use cohort_types::RealtimeEvent;

/// Input a manager applies to its local state.
#[derive(Debug)]
pub(crate) enum Inbound<T> {
    Realtime(RealtimeEvent),
    /// Full list fetched by the refresh fallback.
    Snapshot(Vec<T>),
}

/// Queue between asynchronous producers (realtime callbacks, refresh ticks)
/// and the task that owns a manager.
pub(crate) struct Inbox<T> {
    tx: mpsc::UnboundedSender<Inbound<T>>,
    rx: mpsc::UnboundedReceiver<Inbound<T>>,
}

impl<T: Send + 'static> Inbox<T> {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self { tx, rx }
    }

    pub fn sender(&self) -> mpsc::UnboundedSender<Inbound<T>> {
        self.tx.clone()
    }

    pub fn realtime_callback(&self) -> EventCallback {
        let tx = self.tx.clone();
        Arc::new(move |event| {
            // Receiver only goes away with the manager.
            let _ = tx.send(Inbound::Realtime(event));
        })
    }

    pub fn try_next(&mut self) -> Option<Inbound<T>> {
        self.rx.try_recv().ok()
    }

    /// Waits until something arrives. The inbox holds a sender itself, so
    /// this never observes a closed channel.
    pub async fn next(&mut self) -> Option<Inbound<T>> {
        self.rx.recv().await
    }
}
