//! SSH Adapter
//!
//! `russh`/`russh-sftp` implementation of the remote connection seams:
//! password authentication, an SFTP subsystem channel and a PTY shell
//! channel over one SSH connection.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use russh::client::{self, Handle, Msg};
use russh::{Channel, ChannelMsg, Disconnect};
use russh_sftp::client::SftpSession;
use russh_sftp::protocol::FileAttributes;
use session_relay_core::{
    ConnectionConfig, EntryAttrs, FileTransfer, RelayError, RelayResult, RemoteConnection,
    RemoteConnector, RemoteEntry, ShellChannel, ShellRequest, TerminalDimensions,
};
use tokio::io::AsyncReadExt;
use tracing::{debug, info};

const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

/// Opens SSH connections with password authentication.
pub struct SshConnector {
    config: Arc<client::Config>,
}

impl SshConnector {
    pub fn new() -> Self {
        let config = client::Config {
            inactivity_timeout: None,
            keepalive_interval: Some(KEEPALIVE_INTERVAL),
            ..Default::default()
        };
        Self {
            config: Arc::new(config),
        }
    }
}

impl Default for SshConnector {
    fn default() -> Self {
        Self::new()
    }
}

/// Accepts every host key and logs its fingerprint.
struct HostKeyLogger {
    address: String,
}

#[async_trait]
impl client::Handler for HostKeyLogger {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &russh_keys::key::PublicKey,
    ) -> Result<bool, Self::Error> {
        info!(
            remote = %self.address,
            fingerprint = %server_public_key.fingerprint(),
            "accepting host key"
        );
        Ok(true)
    }
}

#[async_trait]
impl RemoteConnector for SshConnector {
    async fn connect(&self, config: &ConnectionConfig) -> RelayResult<Box<dyn RemoteConnection>> {
        let address = config.address();
        let handler = HostKeyLogger {
            address: address.clone(),
        };

        let mut handle = client::connect(
            Arc::clone(&self.config),
            (config.host.as_str(), config.port),
            handler,
        )
        .await
        .map_err(|e| RelayError::connect(format!("{}: {}", address, e)))?;

        let authenticated = handle
            .authenticate_password(config.username.as_str(), config.password.as_str())
            .await
            .map_err(|e| RelayError::connect(format!("{}: {}", address, e)))?;
        if !authenticated {
            return Err(RelayError::connect(format!(
                "Authentication failed for {}@{}",
                config.username, address
            )));
        }

        debug!(remote = %address, user = %config.username, "ssh authenticated");
        Ok(Box::new(SshConnection { handle, address }))
    }
}

struct SshConnection {
    handle: Handle<HostKeyLogger>,
    address: String,
}

/// Wait for the reply to a `want_reply` channel request.
async fn await_reply(channel: &mut Channel<Msg>, what: &str) -> Result<(), String> {
    loop {
        match channel.wait().await {
            Some(ChannelMsg::Success) => return Ok(()),
            Some(ChannelMsg::Failure) => return Err(format!("{} request refused", what)),
            Some(ChannelMsg::Close) | Some(ChannelMsg::Eof) | None => {
                return Err(format!("channel closed during {} request", what))
            }
            Some(_) => continue,
        }
    }
}

#[async_trait]
impl RemoteConnection for SshConnection {
    async fn open_file_transfer(&mut self) -> RelayResult<Box<dyn FileTransfer>> {
        let mut channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(|e| RelayError::FileTransferFailed(e.to_string()))?;
        channel
            .request_subsystem(true, "sftp")
            .await
            .map_err(|e| RelayError::FileTransferFailed(e.to_string()))?;
        await_reply(&mut channel, "sftp subsystem")
            .await
            .map_err(RelayError::FileTransferFailed)?;

        let sftp = SftpSession::new(channel.into_stream())
            .await
            .map_err(|e| RelayError::FileTransferFailed(e.to_string()))?;
        debug!(remote = %self.address, "sftp subsystem ready");
        Ok(Box::new(SftpTransfer { sftp }))
    }

    async fn open_shell(&mut self, request: &ShellRequest) -> RelayResult<Box<dyn ShellChannel>> {
        let mut channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(|e| RelayError::ShellFailed(e.to_string()))?;

        channel
            .request_pty(
                true,
                &request.term,
                request.dimensions.cols,
                request.dimensions.rows,
                0,
                0,
                &[],
            )
            .await
            .map_err(|e| RelayError::ShellFailed(e.to_string()))?;
        await_reply(&mut channel, "pty")
            .await
            .map_err(RelayError::ShellFailed)?;

        channel
            .request_shell(true)
            .await
            .map_err(|e| RelayError::ShellFailed(e.to_string()))?;
        await_reply(&mut channel, "shell")
            .await
            .map_err(RelayError::ShellFailed)?;

        debug!(remote = %self.address, term = %request.term, "shell ready");
        Ok(Box::new(SshShell { channel }))
    }

    async fn close(&self) -> RelayResult<()> {
        self.handle
            .disconnect(Disconnect::ByApplication, "", "en")
            .await
            .map_err(|e| RelayError::connect(e.to_string()))
    }
}

struct SshShell {
    channel: Channel<Msg>,
}

#[async_trait]
impl ShellChannel for SshShell {
    async fn read(&mut self) -> Option<Vec<u8>> {
        loop {
            match self.channel.wait().await? {
                ChannelMsg::Data { data } => return Some(data.to_vec()),
                // stderr is merged into the same stream
                ChannelMsg::ExtendedData { data, .. } => return Some(data.to_vec()),
                ChannelMsg::Eof | ChannelMsg::Close => return None,
                ChannelMsg::ExitStatus { exit_status } => {
                    debug!(exit_status, "remote shell exited");
                }
                _ => {}
            }
        }
    }

    async fn write(&mut self, data: &[u8]) -> RelayResult<()> {
        self.channel
            .data(data)
            .await
            .map_err(|e| RelayError::ShellFailed(e.to_string()))
    }

    async fn resize(&mut self, dimensions: TerminalDimensions) -> RelayResult<()> {
        self.channel
            .window_change(dimensions.cols, dimensions.rows, 0, 0)
            .await
            .map_err(|e| RelayError::ShellFailed(e.to_string()))
    }

    async fn close(&mut self) -> RelayResult<()> {
        self.channel
            .close()
            .await
            .map_err(|e| RelayError::ShellFailed(e.to_string()))
    }
}

struct SftpTransfer {
    sftp: SftpSession,
}

fn entry_attrs(metadata: &FileAttributes) -> EntryAttrs {
    EntryAttrs {
        mode: metadata.permissions.unwrap_or(0),
        size: metadata.size,
        mtime: metadata.mtime,
    }
}

#[async_trait]
impl FileTransfer for SftpTransfer {
    async fn list_directory(&self, path: &str) -> RelayResult<Vec<RemoteEntry>> {
        let entries = self
            .sftp
            .read_dir(path)
            .await
            .map_err(|e| RelayError::protocol(format!("{}: {}", path, e)))?;

        Ok(entries
            .map(|entry| RemoteEntry {
                attrs: entry_attrs(&entry.metadata()),
                name: entry.file_name(),
            })
            .collect())
    }

    async fn file_size(&self, path: &str) -> RelayResult<Option<u64>> {
        let metadata = self
            .sftp
            .metadata(path)
            .await
            .map_err(|e| RelayError::protocol(format!("{}: {}", path, e)))?;
        Ok(metadata.size)
    }

    async fn read_file(&self, path: &str, limit: u64) -> RelayResult<Vec<u8>> {
        let file = self
            .sftp
            .open(path)
            .await
            .map_err(|e| RelayError::protocol(format!("{}: {}", path, e)))?;

        let mut content = Vec::new();
        file.take(limit)
            .read_to_end(&mut content)
            .await
            .map_err(|e| RelayError::protocol(format!("{}: {}", path, e)))?;
        Ok(content)
    }

    async fn close(&self) -> RelayResult<()> {
        self.sftp
            .close()
            .await
            .map_err(|e| RelayError::FileTransferFailed(e.to_string()))
    }
}
