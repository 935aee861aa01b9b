//! Registry error envelope

use serde::{Deserialize, Serialize};
use std::fmt;

/// ErrorResponse is the normalized body of a non-2xx registry response.
///
/// The status code comes from the HTTP response, never from the body.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    #[serde(skip)]
    pub status_code: u16,

    #[serde(default)]
    pub message: String,
}

impl ErrorResponse {
    /// Decode an error body, attaching the transport status code.
    ///
    /// Bodies that are not a JSON envelope keep their raw text as the message.
    pub fn from_body(status_code: u16, body: &[u8]) -> Self {
        match serde_json::from_slice::<ErrorResponse>(body) {
            Ok(mut envelope) => {
                envelope.status_code = status_code;
                envelope
            }
            Err(_) => Self {
                status_code,
                message: String::from_utf8_lossy(body).trim().to_string(),
            },
        }
    }
}

impl fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.status_code, self.message)
    }
}
