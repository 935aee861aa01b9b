use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Route is a path (optionally restricted to an HTTP method) claimed by a service
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    /// Path claimed by the service (e.g., "/invoices")
    pub route: String,

    /// Name of the owning service
    #[serde(default)]
    pub service_name: String,

    /// HTTP method; empty or "*" means any method
    #[serde(default)]
    pub method: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Route {
    /// Create a route to be registered for the current service
    pub fn new(route: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            route: route.into(),
            service_name: String::new(),
            method: method.into(),
            created_at: None,
        }
    }
}
