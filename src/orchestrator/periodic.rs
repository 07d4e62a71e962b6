//! Self-rescheduling periodic loops with cooperative cancellation.

use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// A spawned loop that sleeps for `interval`, runs its work to completion,
/// and repeats until cancelled.
///
/// The next sleep starts only after the work finishes, so one loop never
/// overlaps itself. Cancellation is observed between runs.
pub struct PeriodicTask {
    name: &'static str,
    handle: JoinHandle<()>,
}

impl PeriodicTask {
    pub fn spawn<F, Fut>(
        name: &'static str,
        interval: Duration,
        shutdown: CancellationToken,
        mut work: F,
    ) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            debug!(task = name, ?interval, "Periodic task started");
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        debug!(task = name, "Periodic task cancelled");
                        break;
                    }
                    _ = tokio::time::sleep(interval) => {
                        work().await;
                    }
                }
            }
        });

        Self { name, handle }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Wait for the loop to exit, aborting it if it does not within `grace`.
    pub async fn join(mut self, grace: Duration) {
        match tokio::time::timeout(grace, &mut self.handle).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(task = self.name, error = %e, "Periodic task ended abnormally"),
            Err(_) => {
                warn!(task = self.name, ?grace, "Periodic task did not finish in time, aborting");
                self.handle.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_runs_until_cancelled() {
        let runs = Arc::new(AtomicU32::new(0));
        let token = CancellationToken::new();

        let counter = runs.clone();
        let task = PeriodicTask::spawn("counter", Duration::from_millis(10), token.clone(), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        tokio::time::sleep(Duration::from_millis(100)).await;
        token.cancel();
        task.join(Duration::from_secs(1)).await;

        let after_stop = runs.load(Ordering::SeqCst);
        assert!(after_stop >= 2, "expected several runs, got {}", after_stop);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(runs.load(Ordering::SeqCst), after_stop);
    }

    #[tokio::test]
    async fn test_runs_never_overlap() {
        let in_flight = Arc::new(AtomicU32::new(0));
        let max_seen = Arc::new(AtomicU32::new(0));
        let token = CancellationToken::new();

        let (flight, seen) = (in_flight.clone(), max_seen.clone());
        let task = PeriodicTask::spawn("slow", Duration::from_millis(1), token.clone(), move || {
            let (flight, seen) = (flight.clone(), seen.clone());
            async move {
                let now = flight.fetch_add(1, Ordering::SeqCst) + 1;
                seen.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                flight.fetch_sub(1, Ordering::SeqCst);
            }
        });

        tokio::time::sleep(Duration::from_millis(100)).await;
        token.cancel();
        task.join(Duration::from_secs(1)).await;

        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancel_before_first_run() {
        let runs = Arc::new(AtomicU32::new(0));
        let token = CancellationToken::new();

        let counter = runs.clone();
        let task = PeriodicTask::spawn("idle", Duration::from_secs(60), token.clone(), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        token.cancel();
        task.join(Duration::from_secs(1)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }
}
