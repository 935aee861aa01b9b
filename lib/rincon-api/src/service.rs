use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Service is the identity a process registers with the registry
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    /// Registry-assigned identifier, absent until the first registration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,

    /// Service name (e.g., "billing")
    pub name: String,

    #[serde(default)]
    pub version: String,

    /// Base URI the service is reachable at
    #[serde(default)]
    pub endpoint: String,

    /// URI the registry polls in server heartbeat mode
    #[serde(default)]
    pub health_check: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Service {
    /// Create a service definition that has not been registered yet
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        endpoint: impl Into<String>,
        health_check: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            name: name.into(),
            version: version.into(),
            endpoint: endpoint.into(),
            health_check: health_check.into(),
            updated_at: None,
            created_at: None,
        }
    }

    /// Name with underscores turned into spaces and each word capitalized,
    /// e.g. "montecito_lodge" becomes "Montecito Lodge"
    pub fn formatted_name(&self) -> String {
        self.name
            .split('_')
            .filter(|word| !word.is_empty())
            .map(|word| {
                let mut chars = word.chars();
                match chars.next() {
                    Some(first) => {
                        first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
                    }
                    None => String::new(),
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Formatted name followed by the version, e.g. "Montecito Lodge v1.4.2"
    pub fn formatted_name_with_version(&self) -> String {
        format!("{} v{}", self.formatted_name(), self.version)
    }
}
