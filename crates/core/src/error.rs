//! Relay Error Types
//!
//! Defines the error taxonomy shared by the adapter, registry and gateway.
//! These error types are dependency-free (only thiserror + std) to keep the core
//! crate lightweight.
//!
//! Every variant is recoverable at the gateway boundary: it is converted into
//! one of three client-facing messages (see [`ErrorCategory`]).

use thiserror::Error;

/// Error type for the remote session relay.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RelayError {
    /// Missing or malformed connection fields, rejected before any remote call
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Port that is not an integer in `[0, 65536)`
    #[error("Invalid port: {0}")]
    InvalidPort(String),

    /// Remote host unreachable, handshake failure or rejected credentials
    #[error("Connection failed: {0}")]
    Connect(String),

    /// File-transfer subsystem could not be opened after connecting
    #[error("File transfer subsystem failed: {0}")]
    FileTransferFailed(String),

    /// Interactive shell could not be opened after connecting
    #[error("Shell failed: {0}")]
    ShellFailed(String),

    /// A directory or file operation failed mid-session
    #[error("Operation failed: {0}")]
    Protocol(String),

    /// Restore targeted a session whose TTL has elapsed
    #[error("Session expired: {0}")]
    SessionExpired(String),

    /// Restore targeted an identifier the registry does not know
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// Restore requested by a transport other than the session's last owner
    #[error("Session {0} belongs to another connection")]
    OwnerMismatch(String),
}

/// Result type alias for relay errors
pub type RelayResult<T> = Result<T, RelayError>;

/// Which client-facing message an error is reported as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// "could not connect" (`connect-error`)
    Connect,
    /// "operation failed" (`protocol-error`)
    Operation,
    /// "session could not be restored" (`restore-failed`)
    Restore,
}

impl RelayError {
    /// Create an invalid configuration error
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a connect error
    pub fn connect(msg: impl Into<String>) -> Self {
        Self::Connect(msg.into())
    }

    /// Create a protocol error
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Client-facing category for this error.
    pub fn category(&self) -> ErrorCategory {
        match self {
            RelayError::InvalidConfig(_)
            | RelayError::InvalidPort(_)
            | RelayError::Connect(_)
            | RelayError::FileTransferFailed(_)
            | RelayError::ShellFailed(_) => ErrorCategory::Connect,
            RelayError::Protocol(_) => ErrorCategory::Operation,
            RelayError::SessionExpired(_)
            | RelayError::SessionNotFound(_)
            | RelayError::OwnerMismatch(_) => ErrorCategory::Restore,
        }
    }
}

/// Convert RelayError to a string
impl From<RelayError> for String {
    fn from(err: RelayError) -> String {
        err.to_string()
    }
}
