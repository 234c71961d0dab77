//! In-memory remote used by the relay's unit tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use session_relay_core::{
    ConnectRequest, ConnectionConfig, FileTransfer, PortValue, RelayError, RelayResult,
    RemoteConnection, RemoteConnector, RemoteEntry, ShellChannel, ShellRequest,
    TerminalDimensions,
};
use tokio::sync::{mpsc, Notify};

pub fn connect_request() -> ConnectRequest {
    ConnectRequest {
        host: "docs.internal".to_string(),
        port: Some(PortValue::Number(22)),
        username: "editor".to_string(),
        password: "secret".to_string(),
    }
}

#[derive(Default)]
struct MockState {
    connects: usize,
    connection_closes: usize,
    file_transfer_closes: usize,
    open_order: Vec<&'static str>,
    writes: Vec<Vec<u8>>,
    resizes: Vec<TerminalDimensions>,
    shell_requests: Vec<ShellRequest>,
    listings: HashMap<String, Vec<RemoteEntry>>,
    files: HashMap<String, Vec<u8>>,
    hide_file_sizes: bool,
    /// (path, bytes handed back) per read
    reads: Vec<(String, usize)>,
    output: Option<mpsc::UnboundedSender<Vec<u8>>>,
    fail_connect: bool,
    hang_connect: bool,
    fail_file_transfer: bool,
    fail_shell: bool,
    fail_close: bool,
    file_op_delay: Option<Duration>,
}

/// Scriptable remote host. Clones share state.
#[derive(Clone, Default)]
pub struct MockRemote {
    state: Arc<Mutex<MockState>>,
    changed: Arc<Notify>,
}

impl MockRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connector(&self) -> MockConnector {
        MockConnector {
            remote: self.clone(),
        }
    }

    fn with<R>(&self, f: impl FnOnce(&mut MockState) -> R) -> R {
        let mut state = self.state.lock().unwrap();
        let result = f(&mut state);
        drop(state);
        self.changed.notify_waiters();
        result
    }

    pub fn fail_connect(&self) {
        self.with(|s| s.fail_connect = true);
    }

    pub fn hang_connect(&self) {
        self.with(|s| s.hang_connect = true);
    }

    pub fn fail_file_transfer(&self) {
        self.with(|s| s.fail_file_transfer = true);
    }

    pub fn fail_shell(&self) {
        self.with(|s| s.fail_shell = true);
    }

    pub fn fail_close(&self) {
        self.with(|s| s.fail_close = true);
    }

    pub fn delay_file_ops(&self, delay: Duration) {
        self.with(|s| s.file_op_delay = Some(delay));
    }

    pub fn set_listing(&self, path: &str, entries: Vec<RemoteEntry>) {
        self.with(|s| s.listings.insert(path.to_string(), entries));
    }

    pub fn set_file(&self, path: &str, content: Vec<u8>) {
        self.with(|s| s.files.insert(path.to_string(), content));
    }

    /// Stop reporting file sizes, as some servers do.
    pub fn hide_file_sizes(&self) {
        self.with(|s| s.hide_file_sizes = true);
    }

    /// Push output from the most recently opened shell.
    pub fn emit(&self, bytes: &[u8]) {
        self.with(|s| {
            if let Some(output) = &s.output {
                let _ = output.send(bytes.to_vec());
            }
        });
    }

    /// End the most recently opened shell from the remote side.
    pub fn hang_up(&self) {
        self.with(|s| s.output = None);
    }

    pub fn connect_count(&self) -> usize {
        self.state.lock().unwrap().connects
    }

    pub fn connection_close_count(&self) -> usize {
        self.state.lock().unwrap().connection_closes
    }

    pub fn file_transfer_close_count(&self) -> usize {
        self.state.lock().unwrap().file_transfer_closes
    }

    pub fn open_order(&self) -> Vec<&'static str> {
        self.state.lock().unwrap().open_order.clone()
    }

    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.state.lock().unwrap().writes.clone()
    }

    pub fn resizes(&self) -> Vec<TerminalDimensions> {
        self.state.lock().unwrap().resizes.clone()
    }

    pub fn reads(&self) -> Vec<(String, usize)> {
        self.state.lock().unwrap().reads.clone()
    }

    pub fn shell_requests(&self) -> Vec<ShellRequest> {
        self.state.lock().unwrap().shell_requests.clone()
    }

    async fn wait_until(&self, done: impl Fn(&MockState) -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let notified = self.changed.notified();
                if done(&self.state.lock().unwrap()) {
                    return;
                }
                notified.await;
            }
        })
        .await
        .expect("timed out waiting on mock remote");
    }

    pub async fn wait_for_writes(&self, count: usize) {
        self.wait_until(|s| s.writes.len() >= count).await;
    }

    pub async fn wait_for_resizes(&self, count: usize) {
        self.wait_until(|s| s.resizes.len() >= count).await;
    }

    pub async fn wait_for_connection_closes(&self, count: usize) {
        self.wait_until(|s| s.connection_closes >= count).await;
    }
}

pub struct MockConnector {
    remote: MockRemote,
}

#[async_trait]
impl RemoteConnector for MockConnector {
    async fn connect(&self, config: &ConnectionConfig) -> RelayResult<Box<dyn RemoteConnection>> {
        let (fail, hang) = self.remote.with(|s| {
            s.connects += 1;
            (s.fail_connect, s.hang_connect)
        });
        if hang {
            std::future::pending::<()>().await;
        }
        if fail {
            return Err(RelayError::connect(format!(
                "Authentication failed for {}",
                config.username
            )));
        }
        Ok(Box::new(MockConnection {
            remote: self.remote.clone(),
        }))
    }
}

struct MockConnection {
    remote: MockRemote,
}

#[async_trait]
impl RemoteConnection for MockConnection {
    async fn open_file_transfer(&mut self) -> RelayResult<Box<dyn FileTransfer>> {
        let fail = self.remote.with(|s| {
            s.open_order.push("file-transfer");
            s.fail_file_transfer
        });
        if fail {
            return Err(RelayError::FileTransferFailed(
                "subsystem request denied".into(),
            ));
        }
        Ok(Box::new(MockFileTransfer {
            remote: self.remote.clone(),
        }))
    }

    async fn open_shell(&mut self, request: &ShellRequest) -> RelayResult<Box<dyn ShellChannel>> {
        let (tx, rx) = mpsc::unbounded_channel();
        let fail = self.remote.with(|s| {
            s.open_order.push("shell");
            s.shell_requests.push(request.clone());
            if !s.fail_shell {
                s.output = Some(tx);
            }
            s.fail_shell
        });
        if fail {
            return Err(RelayError::ShellFailed("pty request denied".into()));
        }
        Ok(Box::new(MockShell {
            remote: self.remote.clone(),
            output: rx,
        }))
    }

    async fn close(&self) -> RelayResult<()> {
        let fail = self.remote.with(|s| {
            s.connection_closes += 1;
            s.fail_close
        });
        if fail {
            return Err(RelayError::connect("connection reset"));
        }
        Ok(())
    }
}

struct MockShell {
    remote: MockRemote,
    output: mpsc::UnboundedReceiver<Vec<u8>>,
}

#[async_trait]
impl ShellChannel for MockShell {
    async fn read(&mut self) -> Option<Vec<u8>> {
        self.output.recv().await
    }

    async fn write(&mut self, data: &[u8]) -> RelayResult<()> {
        self.remote.with(|s| s.writes.push(data.to_vec()));
        Ok(())
    }

    async fn resize(&mut self, dimensions: TerminalDimensions) -> RelayResult<()> {
        self.remote.with(|s| s.resizes.push(dimensions));
        Ok(())
    }

    async fn close(&mut self) -> RelayResult<()> {
        self.output.close();
        Ok(())
    }
}

struct MockFileTransfer {
    remote: MockRemote,
}

impl MockFileTransfer {
    async fn delay(&self) {
        let delay = self.remote.state.lock().unwrap().file_op_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl FileTransfer for MockFileTransfer {
    async fn list_directory(&self, path: &str) -> RelayResult<Vec<RemoteEntry>> {
        self.delay().await;
        self.remote
            .state
            .lock()
            .unwrap()
            .listings
            .get(path)
            .cloned()
            .ok_or_else(|| RelayError::protocol(format!("No such file: {}", path)))
    }

    async fn file_size(&self, path: &str) -> RelayResult<Option<u64>> {
        let state = self.remote.state.lock().unwrap();
        let content = state
            .files
            .get(path)
            .ok_or_else(|| RelayError::protocol(format!("No such file: {}", path)))?;
        Ok((!state.hide_file_sizes).then_some(content.len() as u64))
    }

    async fn read_file(&self, path: &str, limit: u64) -> RelayResult<Vec<u8>> {
        self.delay().await;
        self.remote.with(|s| {
            let content = s
                .files
                .get(path)
                .ok_or_else(|| RelayError::protocol(format!("No such file: {}", path)))?;
            let served: Vec<u8> = content.iter().copied().take(limit as usize).collect();
            s.reads.push((path.to_string(), served.len()));
            Ok(served)
        })
    }

    async fn close(&self) -> RelayResult<()> {
        let fail = self.remote.with(|s| {
            s.file_transfer_closes += 1;
            s.fail_close
        });
        if fail {
            return Err(RelayError::FileTransferFailed("channel already closed".into()));
        }
        Ok(())
    }
}
