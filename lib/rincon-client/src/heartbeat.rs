//! Client-driven heartbeats
//!
//! In client heartbeat mode the client re-registers its service on a fixed
//! interval until stopped. Failed ticks are logged, counted and published as
//! events; they never stop the schedule.

use crate::client::{ClientInner, RegistryClient};
use crate::config::HeartbeatMode;
use crate::{ClientError, Result};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub(crate) const HEARTBEAT_EVENT_CAPACITY: usize = 32;

/// Largest exponent used when growing the delay after failures
const MAX_BACKOFF_EXPONENT: u32 = 16;

/// Delay between heartbeats after consecutive failures
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "lowercase")]
pub enum BackoffPolicy {
    /// Always wait the configured interval
    #[default]
    Fixed,
    /// Double the interval per consecutive failure, up to `max_interval_secs`
    Exponential { max_interval_secs: u64 },
}

impl BackoffPolicy {
    /// Delay before the next tick given the number of consecutive failures
    pub fn delay(&self, interval: Duration, consecutive_failures: u32) -> Duration {
        match self {
            BackoffPolicy::Fixed => interval,
            BackoffPolicy::Exponential { max_interval_secs } => {
                let factor = 2u32.pow(consecutive_failures.min(MAX_BACKOFF_EXPONENT));
                let max = Duration::from_secs(*max_interval_secs).max(interval);
                interval.saturating_mul(factor).min(max)
            }
        }
    }
}

/// Heartbeat outcome published to subscribers
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HeartbeatEvent {
    /// The registry accepted the heartbeat
    Beat { id: Option<i64> },
    /// The heartbeat failed; the next one is attempted after `retry_in`
    Failed {
        error: String,
        consecutive_failures: u32,
        retry_in: Duration,
    },
}

/// Point-in-time copy of the heartbeat counters
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HeartbeatSnapshot {
    pub ticks: u64,
    pub successes: u64,
    pub failures: u64,
    /// Failures since the last success or the last (re)start
    pub consecutive_failures: u32,
    /// Cause of the most recent failed tick; kept after later successes
    pub last_error: Option<String>,
}

#[derive(Default)]
pub(crate) struct HeartbeatStats {
    ticks: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
    consecutive_failures: AtomicU32,
    last_error: Mutex<Option<String>>,
}

impl HeartbeatStats {
    fn record_success(&self) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
        self.successes.fetch_add(1, Ordering::Relaxed);
        self.consecutive_failures.store(0, Ordering::Relaxed);
    }

    fn record_failure(&self, error: &ClientError) -> u32 {
        self.ticks.fetch_add(1, Ordering::Relaxed);
        self.failures.fetch_add(1, Ordering::Relaxed);
        *self.last_error.lock().unwrap_or_else(PoisonError::into_inner) = Some(error.to_string());
        self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// A new heartbeat task starts with a clean failure streak
    fn reset_streak(&self) {
        self.consecutive_failures.store(0, Ordering::Relaxed);
    }

    fn snapshot(&self) -> HeartbeatSnapshot {
        HeartbeatSnapshot {
            ticks: self.ticks.load(Ordering::Relaxed),
            successes: self.successes.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            consecutive_failures: self.consecutive_failures.load(Ordering::Relaxed),
            last_error: self
                .last_error
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
        }
    }
}

/// Running heartbeat task; dropping it lets the task wind down
pub(crate) struct HeartbeatHandle {
    shutdown: watch::Sender<bool>,
    _task: JoinHandle<()>,
}

impl RegistryClient {
    /// Arm the heartbeat for the current registration
    pub async fn start_heartbeat(&self) -> Result<()> {
        if self.inner.config.heartbeat_mode == HeartbeatMode::Server {
            return Err(ClientError::ServerHeartbeatMode);
        }

        let mut slot = self.inner.heartbeat.lock().await;
        if slot.is_some() {
            return Err(ClientError::HeartbeatAlreadyActive);
        }
        if !self.is_registered().await {
            return Err(ClientError::NotRegistered);
        }

        self.inner.heartbeat_stats.reset_streak();
        let interval = self.inner.config.heartbeat_interval();
        let (shutdown, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(run_heartbeat(
            Arc::downgrade(&self.inner),
            shutdown_rx,
            interval,
            self.timeout,
        ));

        *slot = Some(HeartbeatHandle {
            shutdown,
            _task: task,
        });
        info!("Heartbeat started with interval {:?}", interval);
        Ok(())
    }

    /// Disarm the heartbeat. A tick already in flight finishes but does not
    /// re-register, and no further tick starts.
    pub async fn stop_heartbeat(&self) -> Result<()> {
        if self.inner.config.heartbeat_mode == HeartbeatMode::Server {
            return Err(ClientError::ServerHeartbeatMode);
        }

        let handle = self
            .inner
            .heartbeat
            .lock()
            .await
            .take()
            .ok_or(ClientError::HeartbeatNotActive)?;
        let _ = handle.shutdown.send(true);

        info!("Heartbeat stopped");
        Ok(())
    }

    pub async fn is_heartbeat_active(&self) -> bool {
        self.inner.heartbeat.lock().await.is_some()
    }

    /// Heartbeat counters since the client was connected
    pub fn heartbeat_stats(&self) -> HeartbeatSnapshot {
        self.inner.heartbeat_stats.snapshot()
    }

    /// Receive an event for every heartbeat tick
    pub fn subscribe_heartbeat(&self) -> broadcast::Receiver<HeartbeatEvent> {
        self.inner.heartbeat_events.subscribe()
    }

    /// Re-register the current service without routes. Returns None when the
    /// heartbeat was stopped while waiting for the lifecycle lock.
    async fn heartbeat_tick(&self, shutdown: &watch::Receiver<bool>) -> Option<Result<Option<i64>>> {
        let _lifecycle = self.inner.lifecycle.lock().await;
        if *shutdown.borrow() {
            return None;
        }

        let service = match self.inner.registration.read().await.clone() {
            Some(service) => service,
            None => return Some(Err(ClientError::NotRegistered)),
        };

        Some(self.announce(&service).await.map(|registered| registered.id))
    }
}

async fn run_heartbeat(
    inner: Weak<ClientInner>,
    mut shutdown: watch::Receiver<bool>,
    interval: Duration,
    timeout: Duration,
) {
    let mut consecutive_failures = 0u32;

    loop {
        let delay = match inner.upgrade() {
            Some(inner) => inner.config.backoff.delay(interval, consecutive_failures),
            None => break,
        };

        tokio::select! {
            biased;
            changed = shutdown.changed() => {
                // Sender dropped with the client, or stop was requested
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
                continue;
            }
            _ = tokio::time::sleep(delay) => {}
        }

        let Some(shared) = inner.upgrade() else {
            break;
        };
        let client = RegistryClient {
            inner: shared,
            timeout,
        };

        let outcome = match client.heartbeat_tick(&shutdown).await {
            Some(outcome) => outcome,
            None => break,
        };

        client.inner.metrics.heartbeat_ticks_total.inc();
        match outcome {
            Ok(id) => {
                consecutive_failures = 0;
                client.inner.heartbeat_stats.record_success();
                debug!("Heartbeat success: {:?}", id);
                let _ = client.inner.heartbeat_events.send(HeartbeatEvent::Beat { id });
            }
            Err(e) => {
                consecutive_failures = client.inner.heartbeat_stats.record_failure(&e);
                client.inner.metrics.heartbeat_failures_total.inc();
                let retry_in = client.inner.config.backoff.delay(interval, consecutive_failures);
                warn!(
                    "Heartbeat failed ({} in a row), retrying in {:?}: {}",
                    consecutive_failures, retry_in, e
                );
                let _ = client.inner.heartbeat_events.send(HeartbeatEvent::Failed {
                    error: e.to_string(),
                    consecutive_failures,
                    retry_in,
                });
            }
        }
    }

    debug!("Heartbeat task exited");
}
