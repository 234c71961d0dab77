//! Remote Connection Traits
//!
//! The seams between the session adapter and a concrete remote protocol.
//! A [`RemoteConnector`] opens one [`RemoteConnection`]; the connection then
//! yields a [`FileTransfer`] handle and an interactive [`ShellChannel`].
//! The application crate provides the SSH/SFTP implementation; tests provide
//! in-memory ones.

use async_trait::async_trait;

use crate::error::RelayResult;
use crate::protocol::{ConnectionConfig, EntryAttrs, TerminalDimensions};

/// Raw entry as reported by the file-transfer subsystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    pub name: String,
    pub attrs: EntryAttrs,
}

/// PTY parameters used when opening the shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellRequest {
    pub term: String,
    pub dimensions: TerminalDimensions,
}

impl Default for ShellRequest {
    fn default() -> Self {
        Self {
            term: "xterm-256color".to_string(),
            dimensions: TerminalDimensions::default(),
        }
    }
}

/// Opens authenticated connections to a remote host.
#[async_trait]
pub trait RemoteConnector: Send + Sync {
    /// Connect and authenticate. Fails with `Connect` on network or auth errors.
    async fn connect(&self, config: &ConnectionConfig) -> RelayResult<Box<dyn RemoteConnection>>;
}

/// One authenticated remote connection.
#[async_trait]
pub trait RemoteConnection: Send + Sync {
    /// Open the file-transfer subsystem.
    async fn open_file_transfer(&mut self) -> RelayResult<Box<dyn FileTransfer>>;

    /// Open an interactive shell with a PTY.
    async fn open_shell(&mut self, request: &ShellRequest) -> RelayResult<Box<dyn ShellChannel>>;

    /// End the connection.
    async fn close(&self) -> RelayResult<()>;
}

/// Interactive shell with merged stdout/stderr.
#[async_trait]
pub trait ShellChannel: Send {
    /// Next chunk of output; `None` once the shell has closed.
    ///
    /// Must be cancel-safe: the adapter polls it inside `select!`.
    async fn read(&mut self) -> Option<Vec<u8>>;

    /// Write to the shell's input stream.
    async fn write(&mut self, data: &[u8]) -> RelayResult<()>;

    /// Send a window-size change.
    async fn resize(&mut self, dimensions: TerminalDimensions) -> RelayResult<()>;

    /// Close the channel.
    async fn close(&mut self) -> RelayResult<()>;
}

/// Directory and file access over the file-transfer subsystem.
#[async_trait]
pub trait FileTransfer: Send + Sync {
    async fn list_directory(&self, path: &str) -> RelayResult<Vec<RemoteEntry>>;

    /// Size of `path` in bytes, when the server reports one.
    async fn file_size(&self, path: &str) -> RelayResult<Option<u64>>;

    /// Read from the start of `path`, stopping after `limit` bytes.
    async fn read_file(&self, path: &str, limit: u64) -> RelayResult<Vec<u8>>;

    async fn close(&self) -> RelayResult<()>;
}
