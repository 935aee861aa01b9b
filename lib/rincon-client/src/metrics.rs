//! Prometheus metrics for registry traffic and heartbeats

use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use std::sync::Arc;

use crate::Result;

/// Counters describing how a client talks to the registry
#[derive(Clone)]
pub struct ClientMetrics {
    /// Registry requests by operation and outcome ("ok", "registry_error", "transport_error")
    pub requests_total: IntCounterVec,
    /// Heartbeat ticks attempted
    pub heartbeat_ticks_total: IntCounter,
    /// Heartbeat ticks that failed
    pub heartbeat_failures_total: IntCounter,
    /// Prometheus registry holding the metrics above
    pub registry: Arc<Registry>,
}

impl ClientMetrics {
    pub fn new() -> Result<Self> {
        let registry = Arc::new(Registry::new());

        let requests_total = IntCounterVec::new(
            Opts::new("rincon_client_requests_total", "Total registry requests"),
            &["operation", "outcome"],
        )?;

        let heartbeat_ticks_total = IntCounter::new(
            "rincon_heartbeat_ticks_total",
            "Total heartbeat ticks",
        )?;

        let heartbeat_failures_total = IntCounter::new(
            "rincon_heartbeat_failures_total",
            "Total failed heartbeat ticks",
        )?;

        registry.register(Box::new(requests_total.clone()))?;
        registry.register(Box::new(heartbeat_ticks_total.clone()))?;
        registry.register(Box::new(heartbeat_failures_total.clone()))?;

        Ok(Self {
            requests_total,
            heartbeat_ticks_total,
            heartbeat_failures_total,
            registry,
        })
    }

    pub fn record_request(&self, operation: &str, outcome: &str) {
        self.requests_total
            .with_label_values(&[operation, outcome])
            .inc();
    }

    /// Render all metrics in the Prometheus text format
    pub fn gather_text(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}
