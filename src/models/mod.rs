//! Data Models
//!
//! Configuration structures used throughout the relay.

pub mod settings;

pub use settings::*;
