//! Settings Models
//!
//! Relay configuration data structures.

use std::net::SocketAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use session_relay_core::{ShellRequest, TerminalDimensions};

/// Who may restore a preserved session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestorePolicy {
    /// Any transport presenting the session id may reattach.
    #[default]
    AnyTransport,
    /// Only the transport that last owned the session may reattach.
    OwnerOnly,
}

/// PTY settings applied when a shell is opened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalSettings {
    pub term: String,
    pub cols: u32,
    pub rows: u32,
}

impl Default for TerminalSettings {
    fn default() -> Self {
        Self {
            term: "xterm-256color".to_string(),
            cols: 80,
            rows: 24,
        }
    }
}

impl TerminalSettings {
    pub fn shell_request(&self) -> ShellRequest {
        ShellRequest {
            term: self.term.clone(),
            dimensions: TerminalDimensions {
                cols: self.cols,
                rows: self.rows,
            },
        }
    }
}

/// Relay configuration stored in config.json
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// WebSocket bind address
    pub listen_addr: String,
    /// How long a detached session stays restorable
    pub session_ttl_secs: u64,
    /// Period of the expiry sweep
    pub sweep_interval_secs: u64,
    /// Timeout for directory listings and file reads
    pub file_op_timeout_secs: u64,
    /// Timeout for the SSH handshake and authentication
    pub connect_timeout_secs: u64,
    /// Largest file `read-file` will return
    pub max_file_bytes: u64,
    pub restore_policy: RestorePolicy,
    pub terminal: TerminalSettings,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:7681".to_string(),
            session_ttl_secs: 15 * 60,
            sweep_interval_secs: 5 * 60,
            file_op_timeout_secs: 30,
            connect_timeout_secs: 20,
            max_file_bytes: 10 * 1024 * 1024,
            restore_policy: RestorePolicy::AnyTransport,
            terminal: TerminalSettings::default(),
        }
    }
}

impl RelayConfig {
    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn file_op_timeout(&self) -> Duration {
        Duration::from_secs(self.file_op_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.listen_addr.parse::<SocketAddr>().is_err() {
            return Err(format!("Invalid listen_addr: {}", self.listen_addr));
        }

        if self.session_ttl_secs == 0 {
            return Err("session_ttl_secs must be greater than 0".to_string());
        }

        if self.sweep_interval_secs == 0 {
            return Err("sweep_interval_secs must be greater than 0".to_string());
        }

        if self.file_op_timeout_secs == 0 || self.connect_timeout_secs == 0 {
            return Err("timeouts must be greater than 0".to_string());
        }

        if self.terminal.cols == 0 || self.terminal.rows == 0 {
            return Err("terminal size must be non-zero".to_string());
        }

        if self.terminal.term.is_empty() {
            return Err("terminal.term must not be empty".to_string());
        }

        Ok(())
    }
}
