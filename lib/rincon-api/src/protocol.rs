//! Registry API revisions and the request paths they use

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Sentinel that stands in for `/` inside a v1 match path segment
pub const V1_PATH_SEPARATOR: &str = "<->";

/// Revision of the registry HTTP API
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolVersion {
    /// Unprefixed ping, method-less routes, path-encoded match lookups
    V1,
    /// `/rincon` prefixed ping, routes carry a method, structured match query
    #[default]
    V2,
}

/// Request path kept as unencoded segments.
///
/// Segments may hold any text (`?`, `#`, `/`); the transport percent-encodes
/// each one when building the URL. Displays as the unencoded `/a/b` form.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct ApiPath(Vec<String>);

impl ApiPath {
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    /// Append one segment, taken verbatim
    pub fn push(mut self, segment: impl Into<String>) -> Self {
        self.0.push(segment.into());
        self
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }
}

/// Split a literal path such as "/rincon/ping" on `/`
impl From<&str> for ApiPath {
    fn from(path: &str) -> Self {
        Self::new(path.trim_start_matches('/').split('/'))
    }
}

impl fmt::Display for ApiPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.0.join("/"))
    }
}

impl ProtocolVersion {
    /// Path of the reachability ping
    pub fn ping_path(&self) -> ApiPath {
        match self {
            ProtocolVersion::V1 => ApiPath::from("/ping"),
            ProtocolVersion::V2 => ApiPath::from("/rincon/ping"),
        }
    }

    /// Whether routes carry an HTTP method
    pub fn supports_route_methods(&self) -> bool {
        matches!(self, ProtocolVersion::V2)
    }

    /// Build the path and query for a match lookup.
    ///
    /// `route` must already be normalized (no leading/trailing `/`).
    pub fn match_request(&self, route: &str, method: &str) -> (ApiPath, Vec<(String, String)>) {
        match self {
            ProtocolVersion::V1 => (
                ApiPath::from("/rincon/match").push(route.replace('/', V1_PATH_SEPARATOR)),
                Vec::new(),
            ),
            ProtocolVersion::V2 => (
                ApiPath::from("/rincon/match"),
                vec![
                    ("route".to_string(), route.to_string()),
                    ("method".to_string(), method.to_string()),
                ],
            ),
        }
    }
}

/// Path for registering or listing services
pub fn services_path() -> ApiPath {
    ApiPath::from("/rincon/services")
}

/// Path of a single registered service instance
pub fn service_by_id_path(id: i64) -> ApiPath {
    services_path().push(id.to_string())
}

/// Path listing services registered under a name
pub fn services_by_name_path(name: &str) -> ApiPath {
    services_path().push(name)
}

/// Path listing the routes of a service
pub fn service_routes_path(name: &str) -> ApiPath {
    services_path().push(name).push("routes")
}

/// Path for registering routes
pub fn routes_path() -> ApiPath {
    ApiPath::from("/rincon/routes")
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolVersion::V1 => write!(f, "v1"),
            ProtocolVersion::V2 => write!(f, "v2"),
        }
    }
}

/// Error returned when parsing an unknown protocol name
#[derive(Debug, thiserror::Error)]
#[error("unknown protocol version: {0}")]
pub struct UnknownProtocol(pub String);

impl FromStr for ProtocolVersion {
    type Err = UnknownProtocol;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "v1" | "1" => Ok(ProtocolVersion::V1),
            "v2" | "2" => Ok(ProtocolVersion::V2),
            other => Err(UnknownProtocol(other.to_string())),
        }
    }
}
