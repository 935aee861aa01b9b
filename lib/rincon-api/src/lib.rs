//! Rincon registry wire types
//!
//! This library defines the JSON documents exchanged with a Rincon registry:
//! - Service: a registered service identity
//! - Route: a path (and method) claimed by a service
//! - Ping: registry reachability snapshot
//! - ErrorResponse: error envelope returned for non-2xx responses
//! - ProtocolVersion: the wire shape of the registry API

pub mod service;
pub mod route;
pub mod ping;
pub mod error;
pub mod protocol;

pub use service::Service;
pub use route::Route;
pub use ping::Ping;
pub use error::ErrorResponse;
pub use protocol::{ApiPath, ProtocolVersion};

/// Name under which the registry registers itself
pub const REGISTRY_SERVICE_NAME: &str = "rincon";
