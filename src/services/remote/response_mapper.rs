//! Response Mapper
//!
//! Converts relay errors into client messages and serializes outbound frames.

use session_relay_core::{ErrorCategory, RelayError, ServerMessage};

/// Outbound message formatter.
pub struct ResponseMapper;

impl ResponseMapper {
    /// Serialize a server message as the JSON body of a text frame.
    pub fn encode(message: &ServerMessage) -> Result<String, serde_json::Error> {
        serde_json::to_string(message)
    }

    /// Report an error as the message its category calls for.
    ///
    /// `path` is attached to operation errors so the client can tell which
    /// request failed.
    pub fn from_error(error: &RelayError, path: Option<&str>) -> ServerMessage {
        let message = error.to_string();
        match error.category() {
            ErrorCategory::Connect => ServerMessage::ConnectError { message },
            ErrorCategory::Operation => ServerMessage::ProtocolError {
                message,
                path: path.map(str::to_string),
            },
            ErrorCategory::Restore => ServerMessage::RestoreFailed { message },
        }
    }

    /// Error for a request that needs a ready session.
    pub fn not_connected(path: Option<&str>) -> ServerMessage {
        ServerMessage::ProtocolError {
            message: "not connected".to_string(),
            path: path.map(str::to_string),
        }
    }
}
