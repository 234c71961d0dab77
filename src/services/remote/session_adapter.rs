//! Remote Session Adapter
//!
//! Owns exactly one remote connection and presents it as two independent
//! channels: an interactive shell (byte stream in both directions) and a
//! file-transfer handle (directory listings and text file reads).
//!
//! The shell runs on its own task. Input, resizes and close requests reach it
//! over an mpsc channel; output is pushed to whichever sink is currently
//! attached. The gateway swaps sinks when a session is restored on a new
//! transport.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use session_relay_core::{
    ConnectRequest, ConnectionConfig, DirEntry, FileTransfer, RelayError, RelayResult,
    RemoteConnection, RemoteConnector, ShellChannel, ShellRequest, TerminalDimensions,
};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::types::AdapterEvent;

/// Settings applied to every adapter the relay opens.
#[derive(Debug, Clone)]
pub struct AdapterOptions {
    pub shell: ShellRequest,
    pub connect_timeout: Duration,
    pub max_file_bytes: u64,
}

impl Default for AdapterOptions {
    fn default() -> Self {
        Self {
            shell: ShellRequest::default(),
            connect_timeout: Duration::from_secs(20),
            max_file_bytes: 10 * 1024 * 1024,
        }
    }
}

/// Unsubscribe handle returned by [`RemoteSessionAdapter::attach_sink`].
#[derive(Debug, PartialEq, Eq)]
pub struct SinkHandle {
    id: u64,
}

struct SinkSlot {
    id: u64,
    tx: mpsc::UnboundedSender<AdapterEvent>,
}

/// Current sink plus the events produced before the first one attached.
struct SinkState {
    slot: Option<SinkSlot>,
    backlog: Option<Vec<AdapterEvent>>,
}

impl SinkState {
    fn new() -> Self {
        Self {
            slot: None,
            backlog: Some(Vec::new()),
        }
    }

    fn emit(&mut self, event: AdapterEvent) {
        let gone = match &self.slot {
            Some(current) => current.tx.send(event).is_err(),
            None => {
                if let Some(backlog) = self.backlog.as_mut() {
                    backlog.push(event);
                }
                false
            }
        };
        if gone {
            self.slot = None;
        }
    }
}

type SharedSink = Arc<Mutex<SinkState>>;

enum ShellCommand {
    Write(Vec<u8>),
    Resize(TerminalDimensions),
    Close,
}

/// One remote connection with its shell and file-transfer channels.
pub struct RemoteSessionAdapter {
    config: ConnectionConfig,
    connection: tokio::sync::Mutex<Option<Box<dyn RemoteConnection>>>,
    file_transfer: Box<dyn FileTransfer>,
    shell_tx: mpsc::UnboundedSender<ShellCommand>,
    sink: SharedSink,
    next_sink_id: AtomicU64,
    /// Shell has ended (remote hang-up or close)
    closed: Arc<AtomicBool>,
    /// `close()` has run
    torn_down: AtomicBool,
    max_file_bytes: u64,
}

impl RemoteSessionAdapter {
    /// Validate `request`, connect, then open the file-transfer subsystem and
    /// the shell, in that order. The adapter is only returned once both are
    /// ready; any failure tears down what was opened.
    pub async fn connect(
        connector: &dyn RemoteConnector,
        request: ConnectRequest,
        options: &AdapterOptions,
    ) -> RelayResult<Arc<Self>> {
        let config = ConnectionConfig::try_from(request)?;
        let address = config.address();

        let mut connection = tokio::time::timeout(options.connect_timeout, connector.connect(&config))
            .await
            .map_err(|_| RelayError::connect(format!("Timed out connecting to {}", address)))??;

        let file_transfer = match connection.open_file_transfer().await {
            Ok(file_transfer) => file_transfer,
            Err(e) => {
                Self::abandon(connection.as_ref(), None).await;
                return Err(match e {
                    RelayError::FileTransferFailed(_) => e,
                    other => RelayError::FileTransferFailed(other.to_string()),
                });
            }
        };

        let shell = match connection.open_shell(&options.shell).await {
            Ok(shell) => shell,
            Err(e) => {
                Self::abandon(connection.as_ref(), Some(file_transfer.as_ref())).await;
                return Err(match e {
                    RelayError::ShellFailed(_) => e,
                    other => RelayError::ShellFailed(other.to_string()),
                });
            }
        };

        let (shell_tx, shell_rx) = mpsc::unbounded_channel();
        let sink: SharedSink = Arc::new(Mutex::new(SinkState::new()));
        let closed = Arc::new(AtomicBool::new(false));

        tokio::spawn(Self::run_shell(
            shell,
            shell_rx,
            Arc::clone(&sink),
            Arc::clone(&closed),
            address.clone(),
        ));

        info!(remote = %address, user = %config.username, "remote session ready");

        Ok(Arc::new(Self {
            config,
            connection: tokio::sync::Mutex::new(Some(connection)),
            file_transfer,
            shell_tx,
            sink,
            next_sink_id: AtomicU64::new(1),
            closed,
            torn_down: AtomicBool::new(false),
            max_file_bytes: options.max_file_bytes,
        }))
    }

    async fn abandon(connection: &dyn RemoteConnection, file_transfer: Option<&dyn FileTransfer>) {
        if let Some(file_transfer) = file_transfer {
            if let Err(e) = file_transfer.close().await {
                debug!("file transfer close during failed connect: {}", e);
            }
        }
        if let Err(e) = connection.close().await {
            debug!("connection close during failed connect: {}", e);
        }
    }

    /// Shell task: relays output to the sink and applies queued commands.
    async fn run_shell(
        mut shell: Box<dyn ShellChannel>,
        mut commands: mpsc::UnboundedReceiver<ShellCommand>,
        sink: SharedSink,
        closed: Arc<AtomicBool>,
        address: String,
    ) {
        let mut decoder = Utf8Decoder::default();

        loop {
            tokio::select! {
                output = shell.read() => match output {
                    Some(bytes) => {
                        let text = decoder.decode(&bytes);
                        if !text.is_empty() {
                            emit(&sink, AdapterEvent::Data(text));
                        }
                    }
                    None => {
                        info!(remote = %address, "remote shell closed");
                        break;
                    }
                },
                command = commands.recv() => match command {
                    Some(ShellCommand::Write(data)) => {
                        if let Err(e) = shell.write(&data).await {
                            emit(&sink, AdapterEvent::Error(e.to_string()));
                        }
                    }
                    Some(ShellCommand::Resize(dimensions)) => {
                        if let Err(e) = shell.resize(dimensions).await {
                            emit(&sink, AdapterEvent::Error(e.to_string()));
                        }
                    }
                    Some(ShellCommand::Close) | None => {
                        if let Err(e) = shell.close().await {
                            debug!(remote = %address, "shell close: {}", e);
                        }
                        break;
                    }
                },
            }
        }

        if let Ok(mut sink) = sink.lock() {
            closed.store(true, Ordering::SeqCst);
            sink.emit(AdapterEvent::Closed);
        } else {
            closed.store(true, Ordering::SeqCst);
        }
    }

    /// Parameters this adapter was opened with.
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Forward input to the shell on behalf of the sink behind `handle`.
    ///
    /// Returns false, sending nothing, when that sink has been replaced.
    /// Input after the shell has closed is dropped.
    pub fn write(&self, handle: &SinkHandle, data: &[u8]) -> bool {
        self.send_as(handle, || {
            (!data.is_empty()).then(|| ShellCommand::Write(data.to_vec()))
        })
    }

    /// Forward a window-size change on behalf of the sink behind `handle`.
    pub fn resize(&self, handle: &SinkHandle, cols: u32, rows: u32) -> bool {
        self.send_as(handle, || {
            Some(ShellCommand::Resize(TerminalDimensions { cols, rows }))
        })
    }

    /// Whether `handle` is the sink currently receiving events.
    pub fn is_current_sink(&self, handle: &SinkHandle) -> bool {
        self.sink
            .lock()
            .map(|sink| sink.slot.as_ref().map(|s| s.id) == Some(handle.id))
            .unwrap_or(false)
    }

    /// Queue a shell command while holding the sink lock, so a concurrent
    /// takeover either lands before the check or after the send.
    fn send_as(&self, handle: &SinkHandle, command: impl FnOnce() -> Option<ShellCommand>) -> bool {
        let Ok(sink) = self.sink.lock() else {
            return false;
        };
        if sink.slot.as_ref().map(|s| s.id) != Some(handle.id) {
            return false;
        }
        if !self.is_closed() {
            if let Some(command) = command() {
                let _ = self.shell_tx.send(command);
            }
        }
        true
    }

    /// List `path`, deriving `is_directory` from each entry's mode bits.
    pub async fn list_directory(&self, path: &str) -> RelayResult<Vec<DirEntry>> {
        let entries = self.file_transfer.list_directory(path).await?;
        Ok(entries
            .into_iter()
            .filter(|entry| entry.name != "." && entry.name != "..")
            .map(|entry| DirEntry::new(entry.name, entry.attrs))
            .collect())
    }

    /// Read a whole file as UTF-8 text.
    ///
    /// Files over `max_file_bytes` are refused from their reported size when
    /// the server gives one; the read itself never pulls more than one byte
    /// past the limit.
    pub async fn read_file(&self, path: &str) -> RelayResult<String> {
        let too_large = || {
            RelayError::protocol(format!(
                "{} is larger than {} bytes",
                path, self.max_file_bytes
            ))
        };

        if let Some(size) = self.file_transfer.file_size(path).await? {
            if size > self.max_file_bytes {
                return Err(too_large());
            }
        }

        let bytes = self
            .file_transfer
            .read_file(path, self.max_file_bytes.saturating_add(1))
            .await?;
        if bytes.len() as u64 > self.max_file_bytes {
            return Err(too_large());
        }
        String::from_utf8(bytes)
            .map_err(|_| RelayError::protocol(format!("{} is not valid UTF-8 text", path)))
    }

    /// Install `tx` as the event sink, replacing (and disconnecting) any
    /// previous one.
    ///
    /// The first sink also receives whatever the shell produced before it
    /// attached. A sink attached after the shell ended gets a lone `Closed`.
    pub fn attach_sink(&self, tx: mpsc::UnboundedSender<AdapterEvent>) -> SinkHandle {
        let id = self.next_sink_id.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut sink) = self.sink.lock() {
            match sink.backlog.take() {
                Some(backlog) => {
                    for event in backlog {
                        let _ = tx.send(event);
                    }
                }
                None if self.is_closed() => {
                    let _ = tx.send(AdapterEvent::Closed);
                }
                None => {}
            }
            sink.slot = Some(SinkSlot { id, tx });
        }
        SinkHandle { id }
    }

    /// Remove the sink registered under `handle`. Returns false if it had
    /// already been replaced.
    pub fn detach_sink(&self, handle: &SinkHandle) -> bool {
        match self.sink.lock() {
            Ok(mut sink) => {
                if sink.slot.as_ref().map(|s| s.id) == Some(handle.id) {
                    sink.slot = None;
                    true
                } else {
                    false
                }
            }
            Err(_) => false,
        }
    }

    /// End the remote connection. Idempotent; errors are logged, never
    /// returned.
    pub async fn close(&self) {
        if self.torn_down.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.shell_tx.send(ShellCommand::Close);

        if let Err(e) = self.file_transfer.close().await {
            warn!(remote = %self.config.address(), "file transfer close failed: {}", e);
        }

        let connection = self.connection.lock().await.take();
        if let Some(connection) = connection {
            if let Err(e) = connection.close().await {
                warn!(remote = %self.config.address(), "connection close failed: {}", e);
            }
        }
        info!(remote = %self.config.address(), "remote session closed");
    }
}

fn emit(sink: &SharedSink, event: AdapterEvent) {
    if let Ok(mut sink) = sink.lock() {
        sink.emit(event);
    }
}

/// Incremental UTF-8 decoder: holds back a multibyte sequence split across
/// reads until the rest arrives.
#[derive(Debug, Default)]
pub(crate) struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    pub(crate) fn decode(&mut self, chunk: &[u8]) -> String {
        self.pending.extend_from_slice(chunk);
        let mut out = String::new();

        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(text) => {
                    out.push_str(text);
                    self.pending.clear();
                    return out;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&self.pending[..valid]));
                    match e.error_len() {
                        Some(bad) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid + bad);
                        }
                        None => {
                            self.pending.drain(..valid);
                            return out;
                        }
                    }
                }
            }
        }
    }
}
