use rincon_api::ErrorResponse;
use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ClientError>;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Failed to decode registry response: {0}")]
    Decode(#[from] serde_json::Error),

    /// Non-2xx answer from the registry, displayed as "[code] message"
    #[error("{0}")]
    Registry(ErrorResponse),

    #[error("client is not registered")]
    NotRegistered,

    #[error("client is in server heartbeat mode")]
    ServerHeartbeatMode,

    #[error("heartbeat already active")]
    HeartbeatAlreadyActive,

    #[error("heartbeat not active")]
    HeartbeatNotActive,

    #[error("No service matches route {route} ({method})")]
    NoMatch { route: String, method: String },

    #[error("Invalid base URL {url}: {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    #[error("Failed to connect to registry: {0}")]
    Connection(#[source] Box<ClientError>),

    #[error("Invalid client configuration: {0}")]
    Config(String),

    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),
}

impl ClientError {
    /// Whether the operation was rejected locally because the client was in
    /// the wrong state, without contacting the registry
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            ClientError::NotRegistered
                | ClientError::ServerHeartbeatMode
                | ClientError::HeartbeatAlreadyActive
                | ClientError::HeartbeatNotActive
        )
    }

    /// HTTP status of a registry error envelope, if this is one
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ClientError::Registry(envelope) => Some(envelope.status_code),
            ClientError::Connection(inner) => inner.status_code(),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        ClientError::Transport(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_error_display() {
        let err = ClientError::Registry(ErrorResponse {
            status_code: 404,
            message: "No service with id 9 found".to_string(),
        });
        assert_eq!(err.to_string(), "[404] No service with id 9 found");
        assert_eq!(err.status_code(), Some(404));
        assert!(!err.is_precondition());
    }

    #[test]
    fn test_precondition_classification() {
        assert!(ClientError::NotRegistered.is_precondition());
        assert!(ClientError::HeartbeatNotActive.is_precondition());
        assert!(!ClientError::Transport("connection refused".into()).is_precondition());
    }

    #[test]
    fn test_connection_error_keeps_status() {
        let err = ClientError::Connection(Box::new(ClientError::Registry(ErrorResponse {
            status_code: 401,
            message: "unauthorized".to_string(),
        })));
        assert_eq!(err.status_code(), Some(401));
        assert_eq!(err.to_string(), "Failed to connect to registry: [401] unauthorized");
    }
}
