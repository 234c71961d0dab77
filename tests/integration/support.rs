//! In-memory remote host for integration tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use session_relay::{RelayConfig, RelayState};
use session_relay_core::{
    ConnectRequest, ConnectionConfig, EntryAttrs, FileTransfer, PortValue, RelayError,
    RelayResult, RemoteConnection, RemoteConnector, RemoteEntry, ShellChannel, ShellRequest,
    TerminalDimensions,
};
use tokio::sync::mpsc;

pub fn connect_request() -> ConnectRequest {
    ConnectRequest {
        host: "h".to_string(),
        port: Some(PortValue::Text("22".to_string())),
        username: "u".to_string(),
        password: "p".to_string(),
    }
}

#[derive(Default)]
struct HostState {
    connects: usize,
    closes: usize,
    writes: Vec<u8>,
    shells: Vec<mpsc::UnboundedSender<Vec<u8>>>,
    files: HashMap<String, Vec<u8>>,
}

/// Remote host whose shells and files are scripted by the test.
#[derive(Clone, Default)]
pub struct FakeHost {
    state: Arc<Mutex<HostState>>,
}

impl FakeHost {
    pub fn new() -> Self {
        let host = Self::default();
        host.add_file("/docs/readme.md", b"# Docs\n");
        host
    }

    pub fn relay(&self, config: RelayConfig) -> Arc<RelayState> {
        Arc::new(RelayState::new(config, Arc::new(self.clone())))
    }

    pub fn add_file(&self, path: &str, content: &[u8]) {
        self.state
            .lock()
            .unwrap()
            .files
            .insert(path.to_string(), content.to_vec());
    }

    /// Write to the most recently opened shell's output.
    pub fn shell_output(&self, text: &str) {
        let state = self.state.lock().unwrap();
        if let Some(shell) = state.shells.last() {
            let _ = shell.send(text.as_bytes().to_vec());
        }
    }

    pub fn connects(&self) -> usize {
        self.state.lock().unwrap().connects
    }

    pub fn closes(&self) -> usize {
        self.state.lock().unwrap().closes
    }

    pub fn typed(&self) -> String {
        String::from_utf8_lossy(&self.state.lock().unwrap().writes).into_owned()
    }

    /// Poll until `text` has been typed into a shell.
    pub async fn wait_typed(&self, text: &str) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !self.typed().contains(text) {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("shell input never arrived");
    }
}

#[async_trait]
impl RemoteConnector for FakeHost {
    async fn connect(&self, config: &ConnectionConfig) -> RelayResult<Box<dyn RemoteConnection>> {
        self.state.lock().unwrap().connects += 1;
        if config.password != "p" {
            return Err(RelayError::connect("Authentication failed"));
        }
        Ok(Box::new(FakeConnection { host: self.clone() }))
    }
}

struct FakeConnection {
    host: FakeHost,
}

#[async_trait]
impl RemoteConnection for FakeConnection {
    async fn open_file_transfer(&mut self) -> RelayResult<Box<dyn FileTransfer>> {
        Ok(Box::new(FakeFiles {
            host: self.host.clone(),
        }))
    }

    async fn open_shell(&mut self, _request: &ShellRequest) -> RelayResult<Box<dyn ShellChannel>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.host.state.lock().unwrap().shells.push(tx);
        Ok(Box::new(FakeShell {
            host: self.host.clone(),
            output: rx,
        }))
    }

    async fn close(&self) -> RelayResult<()> {
        self.host.state.lock().unwrap().closes += 1;
        Ok(())
    }
}

struct FakeShell {
    host: FakeHost,
    output: mpsc::UnboundedReceiver<Vec<u8>>,
}

#[async_trait]
impl ShellChannel for FakeShell {
    async fn read(&mut self) -> Option<Vec<u8>> {
        self.output.recv().await
    }

    async fn write(&mut self, data: &[u8]) -> RelayResult<()> {
        self.host
            .state
            .lock()
            .unwrap()
            .writes
            .extend_from_slice(data);
        Ok(())
    }

    async fn resize(&mut self, _dimensions: TerminalDimensions) -> RelayResult<()> {
        Ok(())
    }

    async fn close(&mut self) -> RelayResult<()> {
        self.output.close();
        Ok(())
    }
}

struct FakeFiles {
    host: FakeHost,
}

#[async_trait]
impl FileTransfer for FakeFiles {
    async fn list_directory(&self, path: &str) -> RelayResult<Vec<RemoteEntry>> {
        let state = self.host.state.lock().unwrap();
        let prefix = format!("{}/", path.trim_end_matches('/'));
        let entries: Vec<RemoteEntry> = state
            .files
            .iter()
            .filter_map(|(file, content)| {
                file.strip_prefix(&prefix).map(|name| RemoteEntry {
                    name: name.to_string(),
                    attrs: EntryAttrs {
                        mode: 0o100644,
                        size: Some(content.len() as u64),
                        mtime: None,
                    },
                })
            })
            .collect();
        if entries.is_empty() {
            return Err(RelayError::protocol(format!("No such directory: {}", path)));
        }
        Ok(entries)
    }

    async fn file_size(&self, path: &str) -> RelayResult<Option<u64>> {
        Ok(self
            .host
            .state
            .lock()
            .unwrap()
            .files
            .get(path)
            .map(|content| content.len() as u64))
    }

    async fn read_file(&self, path: &str, limit: u64) -> RelayResult<Vec<u8>> {
        self.host
            .state
            .lock()
            .unwrap()
            .files
            .get(path)
            .map(|content| content.iter().copied().take(limit as usize).collect())
            .ok_or_else(|| RelayError::protocol(format!("No such file: {}", path)))
    }

    async fn close(&self) -> RelayResult<()> {
        Ok(())
    }
}
