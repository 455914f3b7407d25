//! Component lifecycle and periodic background workers.

use std::future::Future;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::error::{SecurityError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Never started.
    Idle,
    Running,
    Stopped,
}

struct LifecycleInner {
    state: LifecycleState,
    shutdown: CancellationToken,
    workers: Vec<JoinHandle<()>>,
}

/// Running flag, shutdown signal and worker handles behind one mutex.
///
/// Because the state check and the signal live under the same lock, a
/// second `stop` observes `Stopped` and returns without touching anything.
pub struct Lifecycle {
    name: &'static str,
    inner: Mutex<LifecycleInner>,
}

impl Lifecycle {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            inner: Mutex::new(LifecycleInner {
                state: LifecycleState::Idle,
                shutdown: CancellationToken::new(),
                workers: Vec::new(),
            }),
        }
    }

    /// Marks the component running and hands out a fresh shutdown token.
    pub async fn begin_start(&self) -> Result<CancellationToken> {
        let mut inner = self.inner.lock().await;
        if inner.state == LifecycleState::Running {
            return Err(SecurityError::Lifecycle(format!(
                "{} is already running",
                self.name
            )));
        }
        inner.state = LifecycleState::Running;
        inner.shutdown = CancellationToken::new();
        Ok(inner.shutdown.clone())
    }

    /// Rolls back a `begin_start` whose follow-up work failed.
    pub async fn abort_start(&self) {
        let mut inner = self.inner.lock().await;
        inner.shutdown.cancel();
        for handle in inner.workers.drain(..) {
            handle.abort();
        }
        inner.state = LifecycleState::Idle;
    }

    pub async fn attach(&self, handle: JoinHandle<()>) {
        self.inner.lock().await.workers.push(handle);
    }

    /// Signals every worker and waits for them to exit.
    ///
    /// # Returns
    ///
    /// `Ok(true)` if this call stopped the component, `Ok(false)` if it was
    /// already stopped.
    pub async fn stop(&self) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        match inner.state {
            LifecycleState::Idle => Err(SecurityError::Lifecycle(format!(
                "{} was never started",
                self.name
            ))),
            LifecycleState::Stopped => Ok(false),
            LifecycleState::Running => {
                inner.shutdown.cancel();
                for handle in inner.workers.drain(..) {
                    if let Err(e) = handle.await {
                        tracing::warn!(component = self.name, "worker exited abnormally: {}", e);
                    }
                }
                inner.state = LifecycleState::Stopped;
                Ok(true)
            }
        }
    }

    pub async fn state(&self) -> LifecycleState {
        self.inner.lock().await.state
    }

    pub async fn is_running(&self) -> bool {
        self.state().await == LifecycleState::Running
    }
}

/// Runs `tick` every `period` until `shutdown` fires.
///
/// The first run happens one full period after spawning. A tick that is in
/// progress when shutdown fires runs to completion. A zero period is
/// rejected before anything is spawned.
pub fn spawn_periodic<F, Fut>(
    name: &'static str,
    period: Duration,
    shutdown: CancellationToken,
    mut tick: F,
) -> Result<JoinHandle<()>>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    if period.is_zero() {
        return Err(SecurityError::Validation(format!(
            "{} period must be greater than zero",
            name
        )));
    }

    Ok(tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval.tick().await;

        tracing::debug!(worker = name, ?period, "Background worker started");
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => tick().await,
            }
        }
        tracing::debug!(worker = name, "Background worker stopped");
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_lifecycle_transitions() {
        let lifecycle = Lifecycle::new("test");
        assert!(matches!(lifecycle.stop().await, Err(SecurityError::Lifecycle(_))));

        lifecycle.begin_start().await.unwrap();
        assert!(matches!(
            lifecycle.begin_start().await,
            Err(SecurityError::Lifecycle(_))
        ));

        assert!(lifecycle.stop().await.unwrap());
        assert!(!lifecycle.stop().await.unwrap());
        assert_eq!(lifecycle.state().await, LifecycleState::Stopped);

        lifecycle.begin_start().await.unwrap();
        assert!(lifecycle.is_running().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_worker_ticks_and_stops() {
        let lifecycle = Lifecycle::new("ticker");
        let token = lifecycle.begin_start().await.unwrap();
        let count = Arc::new(AtomicUsize::new(0));

        let counter = count.clone();
        let handle = spawn_periodic("ticker", Duration::from_secs(10), token, move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        })
        .unwrap();
        lifecycle.attach(handle).await;

        tokio::time::sleep(Duration::from_secs(35)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);

        lifecycle.stop().await.unwrap();
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_zero_period_rejected() {
        let result = spawn_periodic("idle", Duration::ZERO, CancellationToken::new(), || async {});
        assert!(matches!(result, Err(SecurityError::Validation(_))));
    }
}
