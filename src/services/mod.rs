//! Services
//!
//! Relay services: the session adapter, registry, gateway and server.

pub mod remote;
