//! Client for the Rincon service registry
//!
//! This library provides:
//! - Registry connection with protocol negotiation and reachability probing
//! - Service registration lifecycle (register / deregister)
//! - Route registration, lookup and route-to-service matching
//! - Client-driven heartbeat scheduling with configurable backoff

pub mod client;
pub mod config;
pub mod error;
pub mod heartbeat;
pub mod metrics;
pub mod routes;
pub mod transport;

#[cfg(test)]
mod fake;

pub use client::{RegistrationReport, RegistryClient, RouteOutcome};
pub use config::{ClientConfig, HeartbeatMode};
pub use error::{ClientError, Result};
pub use heartbeat::{BackoffPolicy, HeartbeatEvent, HeartbeatSnapshot};
pub use metrics::ClientMetrics;
pub use transport::{HttpTransport, Method, RegistryRequest, Transport, TransportResponse};

pub use rincon_api::{ErrorResponse, Ping, ProtocolVersion, Route, Service};
