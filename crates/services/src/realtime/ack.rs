use dashmap::DashMap;
use tokio::sync::oneshot;
use uuid::Uuid;

/// Outstanding delivery confirmations, keyed by the `ack_id` sent to the client.
#[derive(Default)]
pub struct AckTracker {
    pending: DashMap<String, oneshot::Sender<()>>,
}

impl AckTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self) -> (String, oneshot::Receiver<()>) {
        let ack_id = Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();
        self.pending.insert(ack_id.clone(), tx);
        (ack_id, rx)
    }

    /// Completes a pending ack. Unknown or already-resolved ids are ignored.
    pub fn resolve(&self, ack_id: &str) -> bool {
        match self.pending.remove(ack_id) {
            Some((_, tx)) => tx.send(()).is_ok(),
            None => false,
        }
    }

    pub fn forget(&self, ack_id: &str) {
        self.pending.remove(ack_id);
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}
