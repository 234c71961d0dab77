//! Client State Cache
//!
//! Last-known navigation position, kept by the consumer so the UI can
//! re-render immediately while the relay finishes restoring a session.
//! The relay itself never reads it; only the interface and an in-memory
//! implementation live here.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::protocol::FileBrowserState;

/// Consumer-side store of navigation snapshots, keyed by session id.
pub trait ClientStateCache: Send + Sync {
    fn save(&self, session_id: &str, state: FileBrowserState);

    fn load(&self, session_id: &str) -> Option<FileBrowserState>;

    fn clear(&self, session_id: &str);
}

/// Process-local [`ClientStateCache`].
#[derive(Debug, Default)]
pub struct InMemoryClientStateCache {
    entries: Mutex<HashMap<String, FileBrowserState>>,
}

impl InMemoryClientStateCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ClientStateCache for InMemoryClientStateCache {
    fn save(&self, session_id: &str, state: FileBrowserState) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(session_id.to_string(), state);
        }
    }

    fn load(&self, session_id: &str) -> Option<FileBrowserState> {
        self.entries
            .lock()
            .ok()
            .and_then(|entries| entries.get(session_id).cloned())
    }

    fn clear(&self, session_id: &str) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.remove(session_id);
        }
    }
}
