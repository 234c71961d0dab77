//! Remote Session Relay
//!
//! Bridges browser transports to remote shells and file systems, and keeps
//! sessions alive across client-side navigation.
//!
//! ## Architecture
//!
//! ```text
//! WebSocket → RelayServer → CommandRouter.parse()
//!                                 ↓
//!                       ConnectionGateway (one per transport)
//!                         ↓                 ↓
//!          RemoteSessionAdapter ←→ SessionRegistry (TTL + sweep)
//!                         ↓
//!                SshConnector (russh shell + SFTP)
//!                         ↓
//!          AdapterEvent → ResponseMapper → WebSocket
//! ```

pub mod adapters;
pub mod command_router;
pub mod gateway;
pub mod registry;
pub mod response_mapper;
pub mod server;
pub mod session_adapter;
#[cfg(test)]
pub(crate) mod testing;
pub mod types;

pub use types::*;
