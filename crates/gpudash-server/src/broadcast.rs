use std::sync::Arc;
use std::time::Duration;

use gpudash_core::BroadcastConfig;
use gpudash_services::{MetricsError, MetricsSource};
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::protocol::ServerEvent;

#[derive(Error, Debug)]
pub enum BroadcastError {
    #[error("metrics read failed: {0}")]
    Read(#[from] MetricsError),
    #[error("metrics task failed: {0}")]
    Task(#[from] JoinError),
    #[error("encode failed: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Pushes a `system_stats` event to every subscriber on a fixed cadence.
/// A failing tick is logged and followed by a longer pause; the loop only
/// stops on cancellation.
pub struct BroadcastLoop {
    metrics: Arc<dyn MetricsSource>,
    events: broadcast::Sender<String>,
    interval: Duration,
    backoff: Duration,
}

impl BroadcastLoop {
    pub fn new(
        metrics: Arc<dyn MetricsSource>,
        events: broadcast::Sender<String>,
        config: &BroadcastConfig,
    ) -> Self {
        Self {
            metrics,
            events,
            interval: config.interval(),
            backoff: config.backoff(),
        }
    }

    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            interval_ms = self.interval.as_millis() as u64,
            backoff_ms = self.backoff.as_millis() as u64,
            "Broadcast loop started"
        );

        loop {
            let pause = match self.tick().await {
                Ok(receivers) => {
                    debug!(receivers, "Pushed system stats");
                    self.interval
                }
                Err(e) => {
                    error!("Error emitting system stats: {}", e);
                    self.backoff
                }
            };

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(pause) => {}
            }
        }

        info!("Broadcast loop stopped");
    }

    /// One read-and-push. Returns how many subscribers got the event; zero
    /// subscribers is not an error.
    pub async fn tick(&self) -> Result<usize, BroadcastError> {
        let metrics = self.metrics.clone();
        let snapshot = tokio::task::spawn_blocking(move || metrics.read_snapshot()).await??;
        let text = ServerEvent::SystemStats(snapshot).to_text()?;
        Ok(self.events.send(text).unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use chrono::Local;
    use gpudash_core::{CpuUsage, DiskUsage, MemoryUsage, NetworkCounters, SystemSnapshot};
    use tokio::time::Instant;

    enum Script {
        FailFirst,
        PanicFirst,
    }

    struct ScriptedMetrics {
        script: Script,
        calls: AtomicUsize,
    }

    impl ScriptedMetrics {
        fn new(script: Script) -> Arc<Self> {
            Arc::new(Self {
                script,
                calls: AtomicUsize::new(0),
            })
        }
    }

    impl MetricsSource for ScriptedMetrics {
        fn read_snapshot(&self) -> Result<SystemSnapshot, MetricsError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call == 0 {
                match self.script {
                    Script::FailFirst => {
                        return Err(MetricsError::ReadFailed("sensor offline".into()))
                    }
                    Script::PanicFirst => panic!("sensor exploded"),
                }
            }
            Ok(SystemSnapshot {
                timestamp: Local::now(),
                cpu: CpuUsage::default(),
                memory: MemoryUsage::new(100, 40, 60),
                disk: DiskUsage::new(100, 50),
                network: NetworkCounters::default(),
                gpu: Vec::new(),
            })
        }
    }

    fn config() -> BroadcastConfig {
        BroadcastConfig {
            interval_ms: 2_000,
            backoff_ms: 5_000,
            capacity: 16,
        }
    }

    #[tokio::test]
    async fn test_tick_without_subscribers_is_ok() {
        let (tx, rx) = broadcast::channel(4);
        drop(rx);
        let looper = BroadcastLoop::new(ScriptedMetrics::new(Script::FailFirst), tx, &config());

        assert!(looper.tick().await.is_err());
        assert_eq!(looper.tick().await.unwrap(), 0);
    }

    async fn assert_recovers_with_backoff(script: Script) {
        let (tx, mut rx) = broadcast::channel(16);
        let shutdown = CancellationToken::new();
        let start = Instant::now();
        let handle = BroadcastLoop::new(ScriptedMetrics::new(script), tx, &config())
            .spawn(shutdown.clone());

        let first = rx.recv().await.unwrap();
        let after_backoff = start.elapsed();
        assert!(first.contains("\"event\":\"system_stats\""));
        assert!(after_backoff >= Duration::from_millis(5_000));

        rx.recv().await.unwrap();
        let gap = start.elapsed() - after_backoff;
        assert!(gap >= Duration::from_millis(2_000));
        assert!(gap < Duration::from_millis(5_000));

        shutdown.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_survives_failed_read() {
        assert_recovers_with_backoff(Script::FailFirst).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_survives_panicking_read() {
        assert_recovers_with_backoff(Script::PanicFirst).await;
    }
}
