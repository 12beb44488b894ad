use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use comment_store::{LocalStorageAdapter, QueryCacheAdapter, RestApiAdapter, RestConfig, StorageAdapter};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

const DEFAULT_VARIANT: &str = "default";
const DEFAULT_STALE_TIME_SECS: u64 = 300;

/// Host-facing configuration of a comment provider.
///
/// Every field has a default, so `{}` is a valid config document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CommentConfig {
    /// Visual style name. Display-only.
    pub variant: String,
    /// Emit verbose `debug` diagnostics from the provider.
    pub debug: bool,
    /// Suppress user-facing notifications from the action layer.
    pub hide_toast: bool,
    pub editor_features: EditorFeatures,
    pub delete_mode: DeleteMode,
    pub storage: StorageConfig,
}

impl Default for CommentConfig {
    fn default() -> Self {
        Self {
            variant: DEFAULT_VARIANT.to_string(),
            debug: false,
            hide_toast: false,
            editor_features: EditorFeatures::default(),
            delete_mode: DeleteMode::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl CommentConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|err| Error::Config {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?;
        let config = serde_json::from_str(&content).map_err(|err| Error::Config {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?;
        log::info!("loaded comment config from {}", path.display());
        Ok(config)
    }
}

/// Optional editor plugins. The core does not enforce these; they gate UI features.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EditorFeatures {
    pub mentions: bool,
    pub lists: bool,
    pub check_lists: bool,
    pub auto_link: bool,
    pub auto_list: bool,
    pub emoji: bool,
}

impl Default for EditorFeatures {
    fn default() -> Self {
        Self {
            mentions: true,
            lists: true,
            check_lists: true,
            auto_link: true,
            auto_list: true,
            emoji: true,
        }
    }
}

/// How `delete_comment` reconciles in-memory state with the adapter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeleteMode {
    /// Remove from state first, then call the adapter. Failures are not rolled back.
    #[default]
    Optimistic,
    /// Hide the comment while the adapter call runs; remove on success, restore on failure.
    Confirmed,
}

/// Which adapter [`StorageConfig::build_adapter`] assembles.
///
/// With no `rest` section comments live in process memory.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StorageConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rest: Option<RestConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query_cache: Option<QueryCacheConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QueryCacheConfig {
    pub stale_time_secs: u64,
}

impl Default for QueryCacheConfig {
    fn default() -> Self {
        Self {
            stale_time_secs: DEFAULT_STALE_TIME_SECS,
        }
    }
}

impl QueryCacheConfig {
    pub fn stale_time(&self) -> Duration {
        Duration::from_secs(self.stale_time_secs)
    }
}

impl StorageConfig {
    pub fn build_adapter(&self) -> Result<Arc<dyn StorageAdapter>> {
        let adapter: Arc<dyn StorageAdapter> = match (&self.rest, &self.query_cache) {
            (Some(rest), Some(cache)) => Arc::new(QueryCacheAdapter::with_stale_time(
                RestApiAdapter::new(rest)?,
                cache.stale_time(),
            )),
            (Some(rest), None) => Arc::new(RestApiAdapter::new(rest)?),
            (None, Some(cache)) => Arc::new(QueryCacheAdapter::with_stale_time(
                LocalStorageAdapter::in_memory(),
                cache.stale_time(),
            )),
            (None, None) => Arc::new(LocalStorageAdapter::in_memory()),
        };
        Ok(adapter)
    }
}
