//! Session Relay - Rust Backend Library
//!
//! Relays browser terminal and file-browser traffic to remote hosts over SSH,
//! and keeps sessions alive while the client navigates between pages.
//! It includes:
//! - The WebSocket server and per-connection gateway
//! - The session registry with TTL expiry
//! - The SSH/SFTP remote session adapter
//! - Configuration storage, models and utilities

pub mod models;
pub mod services;
pub mod state;
pub mod storage;
pub mod utils;

pub use models::settings::{RelayConfig, RestorePolicy, TerminalSettings};
pub use services::remote::adapters::SshConnector;
pub use services::remote::gateway::ConnectionGateway;
pub use services::remote::registry::SessionRegistry;
pub use services::remote::server::RelayServer;
pub use services::remote::session_adapter::{AdapterOptions, RemoteSessionAdapter};
pub use state::RelayState;
pub use storage::ConfigService;
pub use utils::error::{AppError, AppResult};
