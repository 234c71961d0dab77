//! Remote Adapters
//!
//! Protocol implementations of the connector seams in `session_relay_core`.
//! SSH (shell + SFTP) is the only one the relay ships with.

pub mod ssh;

pub use ssh::SshConnector;
