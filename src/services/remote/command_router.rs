//! Command Router
//!
//! Parses incoming WebSocket frames into [`ClientMessage`] variants.

use session_relay_core::ClientMessage;
use tokio_tungstenite::tungstenite::Message;

/// Outcome of parsing one inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    Message(ClientMessage),
    /// Peer sent a close frame
    Close,
    /// Control frame with nothing to route (ping/pong)
    Ignored,
    /// Undecodable frame; carries the parse error
    Invalid(String),
}

/// Stateless frame parser.
pub struct CommandRouter;

impl CommandRouter {
    /// Parse a WebSocket frame.
    ///
    /// - Text frames are decoded as a JSON message tagged by `type`
    /// - Binary frames are shell input, equivalent to a `data` message
    /// - Close ends the connection; ping/pong are ignored
    pub fn parse(frame: Message) -> InboundFrame {
        match frame {
            Message::Text(text) => Self::parse_text(&text),
            Message::Binary(bytes) => InboundFrame::Message(ClientMessage::Data {
                data: String::from_utf8_lossy(&bytes).into_owned(),
            }),
            Message::Close(_) => InboundFrame::Close,
            Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => InboundFrame::Ignored,
        }
    }

    /// Parse the JSON body of a text frame.
    pub fn parse_text(text: &str) -> InboundFrame {
        let text = text.trim();
        if text.is_empty() {
            return InboundFrame::Invalid("empty message".to_string());
        }
        match serde_json::from_str::<ClientMessage>(text) {
            Ok(message) => InboundFrame::Message(message),
            Err(e) => InboundFrame::Invalid(format!("malformed message: {}", e)),
        }
    }
}
