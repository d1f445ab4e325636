use serde::{Deserialize, Serialize};

/// Configuration of a [`MountStore`](crate::MountStore).
#[derive(Debug, Clone)]
pub struct MountStoreConfig {
    /// Name attached to log events and iterator spans.
    pub name: String,
    /// Re-check every merged key against the requested range before
    /// emitting it.
    pub verify_merged_bounds: bool,
}

impl Default for MountStoreConfig {
    fn default() -> Self {
        Self {
            name: "mount".to_string(),
            verify_merged_bounds: true,
        }
    }
}

/// Options a mount's backing store is opened with.
///
/// Stores interpret the fields they understand; `extra` carries anything
/// store-specific and is never inspected by the mount layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenOptions {
    /// Create the store if it does not exist yet.
    pub create_if_missing: bool,
    /// Fail to open if the store already holds data.
    pub error_if_exists: bool,
    /// Store-specific options.
    pub extra: serde_json::Value,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            create_if_missing: true,
            error_if_exists: false,
            extra: serde_json::Value::Null,
        }
    }
}
