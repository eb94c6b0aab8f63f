use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use kenzy_bus::{Context, LocalDispatch};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

const POLL_INTERVAL: Duration = Duration::from_millis(500);
const COOLDOWN: Duration = Duration::from_secs(2);
const BACKOFF_CEILING: Duration = Duration::from_secs(30);
const FAILURE_WINDOW: Duration = Duration::from_secs(5 * 60);
const FAILURES_BEFORE_BACKOFF: usize = 5;

/// A restart flag a device's worker tasks can raise from anywhere; the
/// supervisor polls it rather than being pushed to, matching
/// `core.py::_restart_watcher`'s poll loop.
#[derive(Clone, Default)]
pub struct RestartSignal {
    requested: Arc<AtomicBool>,
}

impl RestartSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raised by a pipeline stage that hit an unexpected error. Per the
    /// resolved design decision, no stage silently swallows an error and
    /// continues — it raises this instead.
    pub fn request_restart(&self) {
        self.requested.store(true, Ordering::SeqCst);
    }

    fn take(&self) -> bool {
        self.requested.swap(false, Ordering::SeqCst)
    }
}

/// Watches a device's [`RestartSignal`] and calls `restart` on it when
/// raised, with a 2s cooldown and an exponential-backoff ceiling of 30s
/// applied after 5 consecutive failed restarts within a rolling 5-minute
/// window. The supervisor never gives up; it only slows down.
pub struct Supervisor {
    device: Arc<dyn LocalDispatch>,
    signal: RestartSignal,
}

impl Supervisor {
    pub fn new(device: Arc<dyn LocalDispatch>, signal: RestartSignal) -> Self {
        Self { device, signal }
    }

    pub async fn run(&self, cancel: CancellationToken) {
        let mut failures: VecDeque<Instant> = VecDeque::new();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(POLL_INTERVAL) => {}
            }

            if !self.signal.take() {
                continue;
            }

            tokio::time::sleep(COOLDOWN).await;

            let response = self
                .device
                .invoke("restart", Value::Null, &Context::default())
                .await;

            let now = Instant::now();
            while failures
                .front()
                .is_some_and(|t| now.duration_since(*t) > FAILURE_WINDOW)
            {
                failures.pop_front();
            }

            if response.is_success() {
                failures.clear();
                log::info!("device restarted successfully");
                continue;
            }

            failures.push_back(now);
            log::warn!("device restart failed: {:?}", response.errors());

            if failures.len() >= FAILURES_BEFORE_BACKOFF {
                let exponent = (failures.len() - FAILURES_BEFORE_BACKOFF) as u32;
                let backoff = Duration::from_secs(2u64.saturating_pow(exponent).saturating_mul(2))
                    .min(BACKOFF_CEILING);
                log::error!(
                    "restart ceiling hit after {} consecutive failures in the last {}s, backing off {:?}",
                    failures.len(),
                    FAILURE_WINDOW.as_secs(),
                    backoff
                );
                tokio::time::sleep(backoff).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use kenzy_bus::Response;
    use std::sync::atomic::AtomicUsize;

    struct FlakyDevice {
        attempts: AtomicUsize,
    }

    #[async_trait]
    impl LocalDispatch for FlakyDevice {
        fn accepts(&self) -> Vec<String> {
            vec!["restart".into()]
        }

        async fn invoke(&self, _action: &str, _payload: Value, _context: &Context) -> Response {
            let n = self.attempts.fetch_add(1, Ordering::SeqCst);
            if n == 0 {
                Response::success_empty()
            } else {
                Response::failure("boom")
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn restart_requested_triggers_invoke_after_cooldown() {
        let device = Arc::new(FlakyDevice {
            attempts: AtomicUsize::new(0),
        });
        let signal = RestartSignal::new();
        let supervisor = Supervisor::new(device.clone(), signal.clone());
        let cancel = CancellationToken::new();

        signal.request_restart();

        let cancel_clone = cancel.clone();
        let handle = tokio::spawn(async move { supervisor.run(cancel_clone).await });

        tokio::time::advance(POLL_INTERVAL + COOLDOWN + Duration::from_millis(10)).await;
        tokio::task::yield_now().await;

        assert_eq!(device.attempts.load(Ordering::SeqCst), 1);

        cancel.cancel();
        let _ = tokio::time::timeout(Duration::from_secs(1), handle).await;
    }
}
