//! Session Relay Core
//!
//! Shared vocabulary for the remote session relay: the error taxonomy, the
//! client protocol, the traits a remote protocol implementation plugs into,
//! and the consumer-side navigation cache interface. This crate has no
//! dependency on the runtime, the SSH stack or the WebSocket server.
//!
//! ## Module Organization
//!
//! - `error` - Relay error taxonomy (`RelayError`, `ErrorCategory`)
//! - `protocol` - Client/server messages, connection config, snapshots
//! - `remote` - Connector, connection, shell and file-transfer traits
//! - `state_cache` - Client State Cache interface

pub mod error;
pub mod protocol;
pub mod remote;
pub mod state_cache;

// ── Error Types ────────────────────────────────────────────────────────
pub use error::{ErrorCategory, RelayError, RelayResult};

// ── Protocol ───────────────────────────────────────────────────────────
pub use protocol::{
    is_directory, parse_port, ClientMessage, ConnectRequest, ConnectionConfig, CursorPosition,
    DirEntry, EntryAttrs, FileBrowserState, PortValue, ServerMessage, TerminalDimensions,
    TerminalState, DIRECTORY_MODE_BIT,
};

// ── Remote Connection Traits ───────────────────────────────────────────
pub use remote::{
    FileTransfer, RemoteConnection, RemoteConnector, RemoteEntry, ShellChannel, ShellRequest,
};

// ── Client State Cache ─────────────────────────────────────────────────
pub use state_cache::{ClientStateCache, InMemoryClientStateCache};
