//! WebSocket Server
//!
//! Accepts transport connections and drives one [`ConnectionGateway`] per
//! connection. Each connection gets a reader loop (frames and adapter events)
//! and a writer task draining the gateway's outbound queue.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use session_relay_core::ServerMessage;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::command_router::{CommandRouter, InboundFrame};
use super::gateway::ConnectionGateway;
use super::response_mapper::ResponseMapper;
use super::types::AdapterEvent;
use crate::state::RelayState;
use crate::utils::error::{AppError, AppResult};

/// How long the writer may keep flushing after the reader loop ends.
const WRITER_GRACE: Duration = Duration::from_secs(1);

/// WebSocket listener bound to the relay's address.
pub struct RelayServer {
    listener: TcpListener,
    relay: Arc<RelayState>,
}

impl RelayServer {
    /// Bind to `listen_addr` from the relay configuration.
    pub async fn bind(relay: Arc<RelayState>) -> AppResult<Self> {
        let addr: SocketAddr = relay
            .config()
            .listen_addr
            .parse()
            .map_err(|e| AppError::config(format!("Invalid listen_addr: {}", e)))?;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| AppError::transport(format!("Failed to bind {}: {}", addr, e)))?;

        info!("relay listening on ws://{}", listener.local_addr()?);
        Ok(Self { listener, relay })
    }

    pub fn local_addr(&self) -> AppResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until `cancel` fires.
    pub async fn run(self, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("relay server stopping");
                    break;
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let relay = Arc::clone(&self.relay);
                        let cancel = cancel.clone();
                        tokio::spawn(async move {
                            if let Err(e) = serve_connection(stream, peer, relay, cancel).await {
                                warn!(peer = %peer, "connection ended with error: {}", e);
                            }
                        });
                    }
                    Err(e) => {
                        error!("accept failed: {}", e);
                        tokio::time::sleep(Duration::from_millis(100)).await;
                    }
                }
            }
        }
    }
}

enum Step {
    Frame(Option<Result<Message, tokio_tungstenite::tungstenite::Error>>),
    Event(Option<AdapterEvent>),
    Shutdown,
}

async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    relay: Arc<RelayState>,
    cancel: CancellationToken,
) -> AppResult<()> {
    let ws_stream = tokio_tungstenite::accept_async(stream).await?;
    let (mut ws_writer, mut ws_reader) = ws_stream.split();

    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<ServerMessage>();
    let mut gateway = ConnectionGateway::new(relay, outbound_tx);
    info!(peer = %peer, transport_id = %gateway.transport_id(), "transport connected");

    let mut writer = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            let text = match ResponseMapper::encode(&message) {
                Ok(text) => text,
                Err(e) => {
                    error!("failed to encode outbound message: {}", e);
                    continue;
                }
            };
            if let Err(e) = ws_writer.send(Message::Text(text)).await {
                debug!("websocket send failed: {}", e);
                break;
            }
        }
        let _ = ws_writer.close().await;
    });

    loop {
        let step = tokio::select! {
            _ = cancel.cancelled() => Step::Shutdown,
            frame = ws_reader.next() => Step::Frame(frame),
            event = gateway.next_event() => Step::Event(event),
        };

        match step {
            Step::Shutdown => break,
            Step::Event(event) => gateway.handle_event(event).await,
            Step::Frame(None) => break,
            Step::Frame(Some(Err(e))) => {
                debug!(transport_id = %gateway.transport_id(), "websocket read failed: {}", e);
                break;
            }
            Step::Frame(Some(Ok(frame))) => match CommandRouter::parse(frame) {
                InboundFrame::Message(message) => gateway.handle(message).await,
                InboundFrame::Close => break,
                InboundFrame::Ignored => {}
                InboundFrame::Invalid(reason) => {
                    debug!(transport_id = %gateway.transport_id(), "rejected frame: {}", reason);
                    gateway.reject(reason);
                }
            },
        }
    }

    gateway.transport_closed().await;
    info!(
        peer = %peer,
        transport_id = %gateway.transport_id(),
        state = %gateway.state(),
        "transport disconnected"
    );
    drop(gateway);

    if tokio::time::timeout(WRITER_GRACE, &mut writer).await.is_err() {
        writer.abort();
    }
    Ok(())
}
