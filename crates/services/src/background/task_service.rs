use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use crate::error::ChatResult;

/// Detached work that runs after the caller has been answered: summary
/// updates, fan-out, receipt broadcasts. Failures are logged, never returned.
#[derive(Clone, Default)]
pub struct TaskService {
    in_flight: Arc<AtomicUsize>,
}

impl TaskService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn_task<F>(&self, name: &'static str, fut: F)
    where
        F: Future<Output = ChatResult<()>> + Send + 'static,
    {
        let in_flight = Arc::clone(&self.in_flight);
        in_flight.fetch_add(1, Ordering::SeqCst);
        tokio::spawn(async move {
            let started = Instant::now();
            let result = fut.await;
            let elapsed_ms = started.elapsed().as_millis() as u64;
            match result {
                Ok(()) => {
                    tracing::debug!(task = name, elapsed_ms, "Background task completed");
                }
                Err(error) => {
                    tracing::error!(task = name, elapsed_ms, %error, "Background task failed");
                }
            }
            in_flight.fetch_sub(1, Ordering::SeqCst);
        });
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Resolves once no task is running or `timeout` elapses. Returns whether
    /// the queue drained.
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        while self.in_flight() > 0 {
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        true
    }
}
