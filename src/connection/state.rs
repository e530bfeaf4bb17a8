use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use super::{ConnectError, Connector, Established};

const BASE_RETRY_SECS: u64 = 15;
const MAX_BACKOFF_ATTEMPT: u32 = 8;
const MAX_RETRY_INTERVAL: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not connected yet, switched off by configuration, or connection
    /// retries stopped by shutdown
    Disabled,
    /// Waiting for or running attempt number `attempt` (1-based)
    Connecting { attempt: u32 },
    /// Tracking is live
    Enabled,
    /// Stopped for good by a configuration error
    Failed,
}

impl ConnectionState {
    pub fn is_enabled(self) -> bool {
        matches!(self, ConnectionState::Enabled)
    }
}

/// Delay before attempt `attempt` (0-based): immediate first, then
/// 15s * 2^attempt, capped at one hour from the 8th retry on.
pub fn retry_delay(attempt: u32) -> Duration {
    match attempt {
        0 => Duration::ZERO,
        n if n < MAX_BACKOFF_ATTEMPT => Duration::from_secs(BASE_RETRY_SECS << n),
        _ => MAX_RETRY_INTERVAL,
    }
}

/// Keep attempting to connect until it works, a configuration error makes
/// it pointless, or `cancel` fires.
///
/// # Arguments
/// * `connector` - Runs one connect + verify attempt
/// * `cancel` - Shutdown signal, also aborts an attempt in flight
/// * `state` - Receives `Connecting` before every attempt, then `Failed` on a
///   configuration error or `Disabled` on cancellation
///
/// # Returns
/// `Some` once an attempt succeeded, `None` when the feeder must stay disabled.
pub async fn connect_with_retry(
    connector: &Connector,
    cancel: &CancellationToken,
    state: &watch::Sender<ConnectionState>,
) -> Option<Established> {
    let mut attempt: u32 = 0;

    loop {
        let delay = retry_delay(attempt);
        if attempt > 0 {
            debug!(?delay, attempt = attempt + 1, "next connection attempt scheduled");
        }
        state.send_replace(ConnectionState::Connecting {
            attempt: attempt + 1,
        });

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("cancelled while waiting to connect, stopping connection retries");
                state.send_replace(ConnectionState::Disabled);
                return None;
            }
            _ = tokio::time::sleep(delay) => {}
        }

        attempt += 1;
        debug!(attempt, "attempting to connect to Umami");

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("cancelled during connection attempt, stopping connection retries");
                state.send_replace(ConnectionState::Disabled);
                return None;
            }
            result = connector.establish() => result,
        };

        match result {
            Ok(established) => return Some(established),
            Err(ConnectError::Fatal(e)) => {
                error!(error = %e, "configuration error, the plugin is disabled");
                state.send_replace(ConnectionState::Failed);
                return None;
            }
            Err(ConnectError::Transient(e)) => {
                warn!(error = %e, attempt, "failed to connect to Umami");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::{Collector, CollectorError, CollectorResult};
    use crate::config::FeederConfig;
    use crate::models::{Event, Website};
    use crate::tracking::SiteDirectory;
    use async_trait::async_trait;
    use axum::http::StatusCode;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use tokio::time::Instant;

    /// Fails `failures` listing calls, then succeeds. Records when each call happened.
    struct FlakyCollector {
        failures: u32,
        calls: AtomicU32,
        started: Instant,
        call_times: std::sync::Mutex<Vec<Duration>>,
    }

    #[async_trait]
    impl Collector for FlakyCollector {
        async fn authenticate(&self, _: &str, _: &str) -> CollectorResult<String> {
            Ok("token".to_string())
        }

        async fn list_websites(&self, _: &str, _: Option<&str>) -> CollectorResult<Vec<Website>> {
            self.call_times
                .lock()
                .unwrap()
                .push(self.started.elapsed());
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                Err(CollectorError::Status(StatusCode::BAD_GATEWAY))
            } else {
                Ok(Vec::new())
            }
        }

        async fn create_website(&self, _: &str, _: &str, _: Option<&str>) -> CollectorResult<Website> {
            unreachable!()
        }

        async fn send_event(&self, _: Option<&str>, _: &Event) -> CollectorResult<()> {
            unreachable!()
        }
    }

    fn setup(failures: u32) -> (Connector, Arc<FlakyCollector>) {
        let collector = Arc::new(FlakyCollector {
            failures,
            calls: AtomicU32::new(0),
            started: Instant::now(),
            call_times: std::sync::Mutex::new(Vec::new()),
        });
        let config = FeederConfig {
            umami_host: "http://umami.local".to_string(),
            umami_token: "token".to_string(),
            ..FeederConfig::default()
        };
        let connector = Connector::new(
            Arc::new(config),
            Arc::clone(&collector) as Arc<dyn Collector>,
            Arc::new(SiteDirectory::default()),
        );
        (connector, collector)
    }

    #[test]
    fn test_retry_schedule() {
        assert_eq!(retry_delay(0), Duration::ZERO);
        assert_eq!(retry_delay(1), Duration::from_secs(30));
        assert_eq!(retry_delay(2), Duration::from_secs(60));
        assert_eq!(retry_delay(7), Duration::from_secs(15 * 128));
        assert_eq!(retry_delay(8), Duration::from_secs(3600));
        assert_eq!(retry_delay(100), Duration::from_secs(3600));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_back_off() {
        let (connector, collector) = setup(3);
        let cancel = CancellationToken::new();
        let (state, rx) = watch::channel(ConnectionState::Disabled);

        let established = connect_with_retry(&connector, &cancel, &state).await;
        assert!(established.is_some());
        assert!(!rx.borrow().is_enabled());

        // 0s, then +30s, +60s, +120s
        let times = collector.call_times.lock().unwrap().clone();
        assert_eq!(
            times.iter().map(|d| d.as_secs()).collect::<Vec<_>>(),
            vec![0, 30, 90, 210]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_retrying() {
        let (connector, collector) = setup(u32::MAX);
        let cancel = CancellationToken::new();
        let (state, rx) = watch::channel(ConnectionState::Disabled);

        let canceller = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(45)).await;
                cancel.cancel();
            })
        };

        assert!(connect_with_retry(&connector, &cancel, &state).await.is_none());
        canceller.await.unwrap();

        assert_eq!(collector.calls.load(Ordering::SeqCst), 2);
        assert_eq!(*rx.borrow(), ConnectionState::Disabled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_error_marks_failed() {
        let collector = Arc::new(FlakyCollector {
            failures: 0,
            calls: AtomicU32::new(0),
            started: Instant::now(),
            call_times: std::sync::Mutex::new(Vec::new()),
        });
        let connector = Connector::new(
            Arc::new(FeederConfig::default()),
            collector,
            Arc::new(SiteDirectory::default()),
        );
        let cancel = CancellationToken::new();
        let (state, rx) = watch::channel(ConnectionState::Disabled);

        assert!(connect_with_retry(&connector, &cancel, &state).await.is_none());
        assert_eq!(*rx.borrow(), ConnectionState::Failed);
    }

    /// Listing never answers.
    struct StalledCollector {
        calls: AtomicU32,
    }

    #[async_trait]
    impl Collector for StalledCollector {
        async fn authenticate(&self, _: &str, _: &str) -> CollectorResult<String> {
            Ok("token".to_string())
        }

        async fn list_websites(&self, _: &str, _: Option<&str>) -> CollectorResult<Vec<Website>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            std::future::pending().await
        }

        async fn create_website(&self, _: &str, _: &str, _: Option<&str>) -> CollectorResult<Website> {
            unreachable!()
        }

        async fn send_event(&self, _: Option<&str>, _: &Event) -> CollectorResult<()> {
            unreachable!()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_aborts_attempt_in_flight() {
        let collector = Arc::new(StalledCollector {
            calls: AtomicU32::new(0),
        });
        let config = FeederConfig {
            umami_host: "http://umami.local".to_string(),
            umami_token: "token".to_string(),
            ..FeederConfig::default()
        };
        let connector = Connector::new(
            Arc::new(config),
            Arc::clone(&collector) as Arc<dyn Collector>,
            Arc::new(SiteDirectory::default()),
        );
        let cancel = CancellationToken::new();
        let (state, rx) = watch::channel(ConnectionState::Disabled);

        let canceller = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(5)).await;
                cancel.cancel();
            })
        };

        let started = Instant::now();
        let result = tokio::time::timeout(
            Duration::from_secs(60),
            connect_with_retry(&connector, &cancel, &state),
        )
        .await
        .expect("attempt in flight should stop on cancellation");
        canceller.await.unwrap();

        assert!(result.is_none());
        assert!(started.elapsed() < Duration::from_secs(6));
        assert_eq!(collector.calls.load(Ordering::SeqCst), 1);
        assert_eq!(*rx.borrow(), ConnectionState::Disabled);
    }
}
