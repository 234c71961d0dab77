//! Relay State
//!
//! Shared state handed to every connection: configuration, the session
//! registry and the connector used to reach remote hosts.

use std::sync::Arc;

use session_relay_core::RemoteConnector;

use crate::models::settings::RelayConfig;
use crate::services::remote::registry::SessionRegistry;
use crate::services::remote::session_adapter::AdapterOptions;

/// State shared across all transport connections
pub struct RelayState {
    config: RelayConfig,
    /// Preserved sessions, shared by every gateway
    registry: Arc<SessionRegistry>,
    /// Opens remote connections (SSH in production)
    connector: Arc<dyn RemoteConnector>,
}

impl RelayState {
    pub fn new(config: RelayConfig, connector: Arc<dyn RemoteConnector>) -> Self {
        let registry = Arc::new(SessionRegistry::new(
            config.session_ttl(),
            config.restore_policy,
        ));
        Self {
            config,
            registry,
            connector,
        }
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn connector(&self) -> &dyn RemoteConnector {
        self.connector.as_ref()
    }

    /// Options for each adapter a gateway opens
    pub fn adapter_options(&self) -> AdapterOptions {
        AdapterOptions {
            shell: self.config.terminal.shell_request(),
            connect_timeout: self.config.connect_timeout(),
            max_file_bytes: self.config.max_file_bytes,
        }
    }

    /// Start background services (the expiry sweep)
    pub fn start(&self) {
        self.registry.start(self.config.sweep_interval());
    }

    /// Stop background services and close every preserved session
    pub async fn shutdown(&self) {
        self.registry.shutdown().await;
    }
}
