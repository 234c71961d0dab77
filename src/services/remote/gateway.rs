//! Connection Gateway
//!
//! Per-transport state machine. Owns at most one adapter while attached and
//! translates client messages into adapter and registry calls.
//!
//! ```text
//! Disconnected → Connecting → Ready → (Detached ↔ Ready) → Closed
//! ```

use std::sync::Arc;

use session_relay_core::{
    ClientMessage, ConnectRequest, FileBrowserState, RelayError, ServerMessage, TerminalState,
};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::response_mapper::ResponseMapper;
use super::session_adapter::{RemoteSessionAdapter, SinkHandle};
use super::types::{AdapterEvent, GatewayState};
use crate::state::RelayState;

/// Gateway for one transport connection.
pub struct ConnectionGateway {
    transport_id: String,
    state: GatewayState,
    relay: Arc<RelayState>,
    outbound: mpsc::UnboundedSender<ServerMessage>,
    adapter: Option<Arc<RemoteSessionAdapter>>,
    session_id: Option<String>,
    sink: Option<SinkHandle>,
    events: Option<mpsc::UnboundedReceiver<AdapterEvent>>,
    /// Snapshots handed back by the last restore
    restored: Option<(Option<TerminalState>, Option<FileBrowserState>)>,
}

impl ConnectionGateway {
    /// Create a gateway whose replies go to `outbound`.
    pub fn new(relay: Arc<RelayState>, outbound: mpsc::UnboundedSender<ServerMessage>) -> Self {
        Self {
            transport_id: uuid::Uuid::new_v4().to_string(),
            state: GatewayState::Disconnected,
            relay,
            outbound,
            adapter: None,
            session_id: None,
            sink: None,
            events: None,
            restored: None,
        }
    }

    pub fn transport_id(&self) -> &str {
        &self.transport_id
    }

    pub fn state(&self) -> GatewayState {
        self.state
    }

    /// Session issued at connect or taken over by restore.
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Snapshots returned by the most recent successful restore.
    pub fn restored_snapshots(&self) -> Option<&(Option<TerminalState>, Option<FileBrowserState>)> {
        self.restored.as_ref()
    }

    /// Dispatch one client message.
    pub async fn handle(&mut self, message: ClientMessage) {
        debug!(transport_id = %self.transport_id, state = %self.state, kind = message.kind(), "client message");

        match message {
            ClientMessage::Connect(request) => self.connect(request).await,
            ClientMessage::Data { data } => {
                let delivered = match (self.state, &self.adapter, &self.sink) {
                    (GatewayState::Ready, Some(adapter), Some(sink)) => {
                        adapter.write(sink, data.as_bytes())
                    }
                    _ => true,
                };
                if !delivered {
                    self.session_taken_over();
                }
            }
            ClientMessage::Resize { cols, rows } => {
                let delivered = match (self.state, &self.adapter, &self.sink) {
                    (GatewayState::Ready, Some(adapter), Some(sink)) => {
                        adapter.resize(sink, cols, rows)
                    }
                    _ => true,
                };
                if !delivered {
                    self.session_taken_over();
                }
            }
            ClientMessage::ListDirectory { path } => self.list_directory(path),
            ClientMessage::ReadFile { path } => self.read_file(path),
            ClientMessage::Disconnect => self.disconnect().await,
            ClientMessage::NavigationDisconnect {
                terminal_state,
                file_browser_state,
            } => {
                self.navigation_disconnect(terminal_state, file_browser_state)
                    .await
            }
            ClientMessage::NavigationRestore { session_id } => {
                self.navigation_restore(session_id).await
            }
        }
    }

    /// Report an undecodable frame to the client.
    pub fn reject(&self, message: impl Into<String>) {
        self.send(ServerMessage::ProtocolError {
            message: message.into(),
            path: None,
        });
    }

    /// Next event from the attached adapter. Never resolves while detached.
    ///
    /// Cancel-safe.
    pub async fn next_event(&mut self) -> Option<AdapterEvent> {
        match self.events.as_mut() {
            Some(events) => events.recv().await,
            None => std::future::pending().await,
        }
    }

    /// Apply an adapter event. `None` means the sink was taken over by
    /// another transport.
    pub async fn handle_event(&mut self, event: Option<AdapterEvent>) {
        match event {
            Some(AdapterEvent::Data(data)) => self.send(ServerMessage::Data { data }),
            Some(AdapterEvent::Error(message)) => self.send(ServerMessage::ProtocolError {
                message,
                path: None,
            }),
            Some(AdapterEvent::Closed) => {
                info!(transport_id = %self.transport_id, "remote session ended");
                self.teardown().await;
                self.set_state(GatewayState::Closed);
                self.send(ServerMessage::Closed);
            }
            None => self.session_taken_over(),
        }
    }

    /// The transport went away. An attached session is closed; a detached
    /// one stays in the registry.
    pub async fn transport_closed(&mut self) {
        match self.state {
            GatewayState::Ready | GatewayState::Connecting => {
                info!(transport_id = %self.transport_id, "transport closed without navigation signal");
                self.teardown().await;
                self.set_state(GatewayState::Closed);
            }
            GatewayState::Detached => {
                debug!(
                    transport_id = %self.transport_id,
                    session_id = ?self.session_id,
                    "transport closed; session stays preserved"
                );
            }
            GatewayState::Disconnected | GatewayState::Closed => {}
        }
    }

    async fn connect(&mut self, request: ConnectRequest) {
        if self.adapter.is_some() {
            self.teardown().await;
        }
        self.session_id = None;
        self.restored = None;
        self.set_state(GatewayState::Connecting);

        let options = self.relay.adapter_options();
        match RemoteSessionAdapter::connect(self.relay.connector(), request, &options).await {
            Ok(adapter) => {
                let session_id = self
                    .relay
                    .registry()
                    .preserve(
                        &self.transport_id,
                        Arc::clone(&adapter),
                        adapter.config().clone(),
                        None,
                        None,
                    )
                    .await;
                self.attach(adapter, session_id.clone());
                self.set_state(GatewayState::Ready);
                self.send(ServerMessage::Ready { session_id });
            }
            Err(e) => {
                warn!(transport_id = %self.transport_id, "connect failed: {}", e);
                self.set_state(GatewayState::Closed);
                self.send(ResponseMapper::from_error(&e, None));
            }
        }
    }

    fn list_directory(&mut self, path: String) {
        let Some(adapter) = self.owned_adapter() else {
            self.send(ResponseMapper::not_connected(Some(&path)));
            return;
        };
        let outbound = self.outbound.clone();
        let timeout = self.relay.config().file_op_timeout();

        tokio::spawn(async move {
            let reply = match tokio::time::timeout(timeout, adapter.list_directory(&path)).await {
                Ok(Ok(entries)) => ServerMessage::ListDirectoryResult { path, entries },
                Ok(Err(e)) => ResponseMapper::from_error(&e, Some(&path)),
                Err(_) => ResponseMapper::from_error(
                    &RelayError::protocol(format!("Timed out listing {}", path)),
                    Some(&path),
                ),
            };
            let _ = outbound.send(reply);
        });
    }

    fn read_file(&mut self, path: String) {
        let Some(adapter) = self.owned_adapter() else {
            self.send(ResponseMapper::not_connected(Some(&path)));
            return;
        };
        let outbound = self.outbound.clone();
        let timeout = self.relay.config().file_op_timeout();

        tokio::spawn(async move {
            let reply = match tokio::time::timeout(timeout, adapter.read_file(&path)).await {
                Ok(Ok(content)) => ServerMessage::ReadFileResult { path, content },
                Ok(Err(e)) => ResponseMapper::from_error(&e, Some(&path)),
                Err(_) => ResponseMapper::from_error(
                    &RelayError::protocol(format!("Timed out reading {}", path)),
                    Some(&path),
                ),
            };
            let _ = outbound.send(reply);
        });
    }

    async fn navigation_disconnect(
        &mut self,
        terminal_state: Option<TerminalState>,
        file_browser_state: Option<FileBrowserState>,
    ) {
        if self.owned_adapter().is_none() {
            debug!(transport_id = %self.transport_id, state = %self.state, "navigation-disconnect ignored");
            return;
        }
        let Some(session_id) = self.session_id.clone() else {
            return;
        };

        if let Err(e) = self
            .relay
            .registry()
            .detach(&session_id, &self.transport_id, terminal_state, file_browser_state)
            .await
        {
            warn!(transport_id = %self.transport_id, session_id = %session_id, "detach failed: {}", e);
            self.session_id = None;
        }

        if let (Some(adapter), Some(sink)) = (self.adapter.take(), self.sink.take()) {
            adapter.detach_sink(&sink);
        }
        self.events = None;
        self.set_state(GatewayState::Detached);
    }

    async fn navigation_restore(&mut self, session_id: String) {
        if matches!(self.state, GatewayState::Ready | GatewayState::Connecting) {
            self.send(ServerMessage::RestoreFailed {
                message: "connection already has an active session".to_string(),
            });
            return;
        }

        match self
            .relay
            .registry()
            .restore(&session_id, &self.transport_id)
            .await
        {
            Ok(restored) => {
                self.restored = Some((restored.terminal_state, restored.file_browser_state));
                self.attach(restored.adapter, restored.session_id);
                self.set_state(GatewayState::Ready);
                self.send(ServerMessage::Restored);
            }
            Err(e) => {
                info!(transport_id = %self.transport_id, session_id = %session_id, "restore failed: {}", e);
                self.send(ResponseMapper::from_error(&e, None));
            }
        }
    }

    async fn disconnect(&mut self) {
        if self.state == GatewayState::Closed {
            return;
        }
        self.teardown().await;
        self.set_state(GatewayState::Closed);
        self.send(ServerMessage::Closed);
    }

    fn attach(&mut self, adapter: Arc<RemoteSessionAdapter>, session_id: String) {
        let (tx, rx) = mpsc::unbounded_channel();
        self.sink = Some(adapter.attach_sink(tx));
        self.events = Some(rx);
        self.adapter = Some(adapter);
        self.session_id = Some(session_id);
    }

    /// Evict this gateway's session, which closes its adapter, unless
    /// another transport has taken the session over in the meantime.
    async fn teardown(&mut self) {
        self.events = None;
        if let (Some(adapter), Some(sink)) = (self.adapter.take(), self.sink.take()) {
            adapter.detach_sink(&sink);
        }

        if let Some(session_id) = self.session_id.take() {
            let evicted = self
                .relay
                .registry()
                .evict_if_owned(&session_id, &self.transport_id)
                .await;
            if !evicted {
                debug!(
                    transport_id = %self.transport_id,
                    session_id = %session_id,
                    "session no longer held by this connection; not closing"
                );
            }
        }
    }

    /// Another transport restored this gateway's session. Drop every
    /// reference to it without closing anything.
    fn session_taken_over(&mut self) {
        info!(
            transport_id = %self.transport_id,
            session_id = ?self.session_id,
            "session moved to another connection"
        );
        self.events = None;
        self.sink = None;
        self.adapter = None;
        self.session_id = None;
        self.restored = None;
        if self.state == GatewayState::Ready {
            self.set_state(GatewayState::Detached);
        }
    }

    /// The attached adapter, if this gateway is ready and still the
    /// adapter's current sink. Notices a takeover the event loop has not
    /// delivered yet.
    fn owned_adapter(&mut self) -> Option<Arc<RemoteSessionAdapter>> {
        if self.state != GatewayState::Ready {
            return None;
        }
        let current = match (&self.adapter, &self.sink) {
            (Some(adapter), Some(sink)) => adapter.is_current_sink(sink),
            _ => return None,
        };
        if current {
            self.adapter.clone()
        } else {
            self.session_taken_over();
            None
        }
    }

    fn set_state(&mut self, state: GatewayState) {
        if self.state != state {
            debug!(transport_id = %self.transport_id, from = %self.state, to = %state, "gateway state");
            self.state = state;
        }
    }

    fn send(&self, message: ServerMessage) {
        if self.outbound.send(message).is_err() {
            debug!(transport_id = %self.transport_id, "outbound channel closed");
        }
    }
}
