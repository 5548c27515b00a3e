use foam_core::Subscription;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::subscriber::view::log_event;

/// Follows the push channel and mirrors every event into the service log.
pub struct Journal {
    sub: Subscription,
}

impl Journal {
    pub fn new(sub: Subscription) -> Self {
        Self { sub }
    }

    /// Log events until `cancel` fires or the broadcaster goes away.
    pub async fn run(mut self, cancel: CancellationToken) {
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                event = self.sub.recv() => match event {
                    Some(event) => log_event(&event),
                    None => break,
                },
            }
        }
        debug!(target: "foam.observe.journal", "journal stopped");
    }

    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(cancel))
    }
}
