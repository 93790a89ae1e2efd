//! Sync configuration, persisted in the device-local blob store.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::session::{LocalStore, StoreResult};

/// Blob key the configuration lives under.
const CONFIG_KEY: &str = "live_sync_config";
/// API base used when nothing is configured, relative to the hosting origin.
const DEFAULT_API_BASE: &str = "/api/v1";

/// Network-sync configuration.
///
/// Stored as one JSON blob; a missing or unreadable blob falls back to the
/// defaults so a wiped device still scores locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Master switch; when off, every operation stays local.
    pub enabled: bool,
    /// Base URL of the scoring API, up to and including `/v1`.
    pub api_base: String,
    /// Coach API key, granting write access to rounds and events.
    pub api_key: Option<String>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_base: DEFAULT_API_BASE.to_string(),
            api_key: None,
        }
    }
}

impl SyncConfig {
    /// Load the configuration from the local store, falling back to defaults
    /// on absence or parse failure.
    pub fn load(store: &dyn LocalStore) -> Self {
        match store.get(CONFIG_KEY) {
            Some(raw) => match serde_json::from_str::<Self>(&raw) {
                Ok(config) => {
                    info!(
                        enabled = config.enabled,
                        api_base = %config.api_base,
                        has_key = config.api_key.is_some(),
                        "loaded sync configuration"
                    );
                    config
                }
                Err(err) => {
                    warn!(error = %err, "failed to parse sync configuration; using defaults");
                    Self::default()
                }
            },
            None => {
                info!("no sync configuration stored; using defaults");
                Self::default()
            }
        }
    }

    /// Persist the configuration.
    pub fn save(&self, store: &dyn LocalStore) -> StoreResult<()> {
        let raw = serde_json::to_string(self).unwrap_or_default();
        store.set(CONFIG_KEY, &raw)
    }

    /// Coach key, trimmed, `None` when blank.
    pub fn coach_key(&self) -> Option<&str> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
    }
}
