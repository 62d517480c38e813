//! Hub configuration persisted as JSON.
//!
//! Every field has a default, so a hand-edited partial file still loads
//! and a missing file falls back to a fresh default configuration.

use std::path::Path;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::sync::channel::BroadcastPolicy;

pub const CONFIG_DIR: &str = ".modelhub";
const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    pub version: String,
    /// Stable identity of this hub node, used in logs.
    pub node_id: Uuid,
    pub port: u16,
    /// Who receives each broadcast; see [`BroadcastPolicy`].
    pub broadcast: BroadcastPolicy,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            node_id: Uuid::new_v4(),
            port: 3000,
            broadcast: BroadcastPolicy::default(),
        }
    }
}

/// Create `.modelhub/config.json` under `path` with fresh defaults.
pub async fn init(path: &Path) -> Result<HubConfig> {
    let dir = path.join(CONFIG_DIR);
    tokio::fs::create_dir_all(&dir).await?;

    let config = HubConfig::default();
    tokio::fs::write(
        dir.join(CONFIG_FILE),
        serde_json::to_string_pretty(&config)?,
    )
    .await?;

    Ok(config)
}

/// Load the configuration under `path`; defaults when no file exists.
pub async fn load(path: &Path) -> Result<HubConfig> {
    let file = path.join(CONFIG_DIR).join(CONFIG_FILE);
    match tokio::fs::read(&file).await {
        Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(HubConfig::default()),
        Err(err) => Err(err.into()),
    }
}
