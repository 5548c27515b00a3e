use std::sync::{
    Arc, Mutex, PoisonError,
    atomic::{AtomicUsize, Ordering},
};

use foam_model::{CompletionEvent, PushEvent};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, trace};

use crate::metrics::{MetricsHandle, noop_metrics};

/// Default per-subscriber queue length.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Fan-out of push events to every connected subscriber.
///
/// Publishing never blocks and never fails: each subscriber owns a bounded
/// queue, and a subscriber that falls behind loses its oldest events (and is
/// told so with [`PushEvent::Lagged`]) without affecting anyone else.
#[derive(Clone)]
pub struct Broadcaster {
    tx: broadcast::Sender<PushEvent>,
    /// Last completion summary, replayed to late joiners.
    last_completion: Arc<Mutex<Option<CompletionEvent>>>,
    subscribers: Arc<AtomicUsize>,
    metrics: MetricsHandle,
}

impl Broadcaster {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            tx,
            last_completion: Arc::new(Mutex::new(None)),
            subscribers: Arc::new(AtomicUsize::new(0)),
            metrics: noop_metrics(),
        }
    }

    pub fn with_metrics(mut self, metrics: MetricsHandle) -> Self {
        self.metrics = metrics;
        self
    }

    /// Deliver `event` to all current subscribers.
    pub fn publish(&self, event: PushEvent) {
        if let PushEvent::Completion(summary) = &event {
            // Replay slot and channel are updated under one lock so that a
            // concurrent subscribe sees the summary exactly once.
            let mut last = self
                .last_completion
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            *last = Some(summary.clone());
            let delivered = self.tx.send(event).unwrap_or(0);
            trace!(target: "foam.core.broadcast", delivered, "completion published");
            return;
        }

        // No receivers is not an error for fire-and-forget delivery.
        let _ = self.tx.send(event);
    }

    /// Open a new subscription.
    ///
    /// The subscriber first receives the last completion summary (if any),
    /// then every event published from now on.
    pub fn subscribe(&self) -> Subscription {
        let (rx, replay) = {
            let last = self
                .last_completion
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            (self.tx.subscribe(), last.clone().map(PushEvent::Completion))
        };

        let count = self.subscribers.fetch_add(1, Ordering::SeqCst) + 1;
        self.metrics.subscribers(count);
        debug!(target: "foam.core.broadcast", subscribers = count, "subscriber attached");

        Subscription {
            rx,
            replay,
            subscribers: Arc::clone(&self.subscribers),
            metrics: Arc::clone(&self.metrics),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.load(Ordering::SeqCst)
    }
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}

/// Receiving end held by one client session.
pub struct Subscription {
    rx: broadcast::Receiver<PushEvent>,
    replay: Option<PushEvent>,
    subscribers: Arc<AtomicUsize>,
    metrics: MetricsHandle,
}

impl Subscription {
    /// Next event, or `None` once the broadcaster is gone.
    pub async fn recv(&mut self) -> Option<PushEvent> {
        if let Some(event) = self.replay.take() {
            return Some(event);
        }
        match self.rx.recv().await {
            Ok(event) => Some(event),
            Err(RecvError::Lagged(skipped)) => {
                debug!(target: "foam.core.broadcast", skipped, "subscriber lagged");
                Some(PushEvent::Lagged { skipped })
            }
            Err(RecvError::Closed) => None,
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let count = self
            .subscribers
            .fetch_sub(1, Ordering::SeqCst)
            .saturating_sub(1);
        self.metrics.subscribers(count);
        debug!(target: "foam.core.broadcast", subscribers = count, "subscriber detached");
    }
}
