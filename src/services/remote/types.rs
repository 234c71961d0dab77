//! Remote Session Relay Types
//!
//! Gateway states, adapter events and registry summaries shared by the
//! relay services.

use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Gateway State
// ---------------------------------------------------------------------------

/// Per-transport gateway state.
///
/// `Disconnected → Connecting → Ready → (Detached ↔ Ready) → Closed`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum GatewayState {
    #[default]
    Disconnected,
    Connecting,
    Ready,
    /// Adapter still running, owned by the registry
    Detached,
    Closed,
}

impl fmt::Display for GatewayState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GatewayState::Disconnected => write!(f, "disconnected"),
            GatewayState::Connecting => write!(f, "connecting"),
            GatewayState::Ready => write!(f, "ready"),
            GatewayState::Detached => write!(f, "detached"),
            GatewayState::Closed => write!(f, "closed"),
        }
    }
}

// ---------------------------------------------------------------------------
// Adapter Events
// ---------------------------------------------------------------------------

/// Asynchronous output of a session adapter, delivered to its current sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdapterEvent {
    /// Shell output (stdout and stderr merged), in remote order
    Data(String),
    /// Out-of-band failure (e.g. a write to the shell failed)
    Error(String),
    /// The shell ended; no further events follow
    Closed,
}

// ---------------------------------------------------------------------------
// Registry Summaries
// ---------------------------------------------------------------------------

/// Read-only view of a preserved session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub host: String,
    pub port: u16,
    pub username: String,
    /// Whether a transport currently owns the session
    pub attached: bool,
    pub created_at: String,
    pub has_terminal_state: bool,
    pub has_file_browser_state: bool,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
