use serde::{Deserialize, Serialize};

/// Ping is the registry's reachability snapshot
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ping {
    pub message: String,

    /// Number of routes known to the registry
    #[serde(default)]
    pub routes: u64,

    /// Number of services known to the registry
    #[serde(default)]
    pub services: u64,
}
