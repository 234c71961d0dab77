//! Client Protocol Types
//!
//! Message types exchanged with the client over its transport connection,
//! plus the connection configuration and navigation snapshots they carry.
//!
//! Every message is a JSON object tagged by `type`, using the kebab-case
//! message names (`list-directory`, `navigation-restore`, ...). Payload
//! fields are camelCase.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{RelayError, RelayResult};

/// Directory bit of a POSIX file mode.
pub const DIRECTORY_MODE_BIT: u32 = 0o40000;

/// Returns whether a raw file mode has the directory bit set.
pub fn is_directory(mode: u32) -> bool {
    mode & DIRECTORY_MODE_BIT != 0
}

/// Parse a port given as decimal text into `[0, 65536)`.
pub fn parse_port(raw: &str) -> RelayResult<u16> {
    let value: i64 = raw
        .trim()
        .parse()
        .map_err(|_| RelayError::InvalidPort(raw.to_string()))?;
    u16::try_from(value).map_err(|_| RelayError::InvalidPort(raw.to_string()))
}

// ---------------------------------------------------------------------------
// Connection configuration
// ---------------------------------------------------------------------------

/// Port as sent by the client: either a JSON number or a string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PortValue {
    Number(i64),
    Text(String),
    Other(serde_json::Value),
}

impl PortValue {
    /// Validate into a TCP port.
    pub fn to_port(&self) -> RelayResult<u16> {
        match self {
            PortValue::Number(n) => {
                u16::try_from(*n).map_err(|_| RelayError::InvalidPort(n.to_string()))
            }
            PortValue::Text(s) => parse_port(s),
            PortValue::Other(v) => Err(RelayError::InvalidPort(v.to_string())),
        }
    }
}

/// Unvalidated `connect` payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectRequest {
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub port: Option<PortValue>,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

/// Validated parameters for one remote connection. Write-once.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    #[serde(skip_serializing, default)]
    pub password: String,
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl ConnectionConfig {
    /// `host:port` for logging.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl TryFrom<ConnectRequest> for ConnectionConfig {
    type Error = RelayError;

    fn try_from(request: ConnectRequest) -> RelayResult<Self> {
        let port = request
            .port
            .as_ref()
            .ok_or_else(|| RelayError::invalid_config("port is required"))?
            .to_port()?;

        if request.host.trim().is_empty() {
            return Err(RelayError::invalid_config("host is required"));
        }
        if request.username.is_empty() {
            return Err(RelayError::invalid_config("username is required"));
        }
        if request.password.is_empty() {
            return Err(RelayError::invalid_config("password is required"));
        }

        Ok(Self {
            host: request.host.trim().to_string(),
            port,
            username: request.username,
            password: request.password,
        })
    }
}

// ---------------------------------------------------------------------------
// Navigation snapshots
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorPosition {
    pub row: u32,
    pub col: u32,
}

/// Terminal size in character cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalDimensions {
    pub cols: u32,
    pub rows: u32,
}

impl Default for TerminalDimensions {
    fn default() -> Self {
        Self { cols: 80, rows: 24 }
    }
}

/// Terminal snapshot captured when the client detaches.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TerminalState {
    pub output_buffer: String,
    pub cursor_position: CursorPosition,
    pub dimensions: TerminalDimensions,
}

/// File-browser snapshot captured when the client detaches.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FileBrowserState {
    pub current_path: String,
    pub selected_entry: Option<String>,
    pub scroll_offset: f64,
}

// ---------------------------------------------------------------------------
// Directory listings
// ---------------------------------------------------------------------------

/// Raw attributes reported by the file-transfer subsystem.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryAttrs {
    /// POSIX mode bits, 0 when the server sent none
    pub mode: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mtime: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirEntry {
    pub name: String,
    pub attrs: EntryAttrs,
    pub is_directory: bool,
}

impl DirEntry {
    /// Build an entry, deriving `is_directory` from the mode bits.
    pub fn new(name: impl Into<String>, attrs: EntryAttrs) -> Self {
        Self {
            name: name.into(),
            is_directory: is_directory(attrs.mode),
            attrs,
        }
    }
}

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// Client → relay messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientMessage {
    Connect(ConnectRequest),
    Data {
        data: String,
    },
    Resize {
        cols: u32,
        rows: u32,
    },
    ListDirectory {
        path: String,
    },
    ReadFile {
        path: String,
    },
    Disconnect,
    #[serde(rename_all = "camelCase")]
    NavigationDisconnect {
        #[serde(default)]
        terminal_state: Option<TerminalState>,
        #[serde(default)]
        file_browser_state: Option<FileBrowserState>,
    },
    #[serde(rename_all = "camelCase")]
    NavigationRestore {
        session_id: String,
    },
}

impl ClientMessage {
    /// Wire name of the message, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            ClientMessage::Connect(_) => "connect",
            ClientMessage::Data { .. } => "data",
            ClientMessage::Resize { .. } => "resize",
            ClientMessage::ListDirectory { .. } => "list-directory",
            ClientMessage::ReadFile { .. } => "read-file",
            ClientMessage::Disconnect => "disconnect",
            ClientMessage::NavigationDisconnect { .. } => "navigation-disconnect",
            ClientMessage::NavigationRestore { .. } => "navigation-restore",
        }
    }
}

/// Relay → client messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerMessage {
    #[serde(rename_all = "camelCase")]
    Ready {
        session_id: String,
    },
    ConnectError {
        message: String,
    },
    Data {
        data: String,
    },
    ListDirectoryResult {
        path: String,
        entries: Vec<DirEntry>,
    },
    ReadFileResult {
        path: String,
        content: String,
    },
    ProtocolError {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        path: Option<String>,
    },
    Closed,
    Restored,
    RestoreFailed {
        message: String,
    },
}
