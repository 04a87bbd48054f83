//! Persisted Client State
//!
//! The streaming core never touches storage directly. It asks a
//! [`StateProvider`] for the handful of values it needs: the bearer token,
//! the tenant the user picked, and the user's own default tenant.
//!
//! Two providers ship with the crate:
//! - [`MemoryStateStore`]: a settable key/value map (embedding, tests)
//! - [`FileStateStore`]: a JSON object on disk, re-read on every lookup

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;

/// Storage key of the bearer token
pub const TOKEN_KEY: &str = "weknora_token";
/// Storage key of the refresh token
pub const REFRESH_TOKEN_KEY: &str = "weknora_refresh_token";
/// Storage key of the tenant id the user switched to
pub const SELECTED_TENANT_KEY: &str = "weknora_selected_tenant_id";
/// Storage key of the user's default tenant (a JSON object with an `id`)
pub const DEFAULT_TENANT_KEY: &str = "weknora_tenant";

/// Typed read access to persisted client state
pub trait StateProvider: Send + Sync {
    /// Look up a raw value by storage key
    fn get(&self, key: &str) -> Option<String>;

    /// Bearer token for the `Authorization` header
    fn bearer_token(&self) -> Option<String> {
        self.get(TOKEN_KEY)
    }

    /// Refresh token (not used by the streaming core)
    fn refresh_token(&self) -> Option<String> {
        self.get(REFRESH_TOKEN_KEY)
    }

    /// Tenant id selected for cross-tenant access
    fn selected_tenant_id(&self) -> Option<String> {
        self.get(SELECTED_TENANT_KEY)
    }

    /// Raw default-tenant blob, unparsed
    fn default_tenant(&self) -> Option<String> {
        self.get(DEFAULT_TENANT_KEY)
    }
}

/// In-memory state store
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    values: RwLock<HashMap<String, String>>,
}

impl MemoryStateStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a value
    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        self.values.write().insert(key.into(), value.into());
    }

    /// Remove a value, returning it if present
    pub fn remove(&self, key: &str) -> Option<String> {
        self.values.write().remove(key)
    }

    /// Builder-style setter
    #[must_use]
    pub fn with(self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }
}

impl StateProvider for MemoryStateStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.read().get(key).cloned()
    }
}

/// JSON-file backed state store
///
/// The file holds one JSON object keyed like the browser storage:
///
/// ```json
/// {
///   "weknora_token": "eyJ...",
///   "weknora_selected_tenant_id": "7",
///   "weknora_tenant": "{\"id\":5,\"name\":\"acme\"}"
/// }
/// ```
///
/// Non-string values are stored back as their JSON text, so a default
/// tenant may also be written as a nested object.
#[derive(Clone, Debug)]
pub struct FileStateStore {
    path: PathBuf,
}

impl FileStateStore {
    /// Create a store reading from `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the backing file
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> HashMap<String, serde_json::Value> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return HashMap::new(),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Failed to read state file");
                return HashMap::new();
            }
        };

        match serde_json::from_str(&content) {
            Ok(values) => values,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "State file is not a JSON object");
                HashMap::new()
            }
        }
    }
}

impl StateProvider for FileStateStore {
    fn get(&self, key: &str) -> Option<String> {
        match self.load().remove(key)? {
            serde_json::Value::Null => None,
            serde_json::Value::String(s) => Some(s),
            other => Some(other.to_string()),
        }
    }
}
