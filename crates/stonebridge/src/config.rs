//! Plugin Configuration
//!
//! Declarative list of plugin processes loaded from a TOML file.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::types::Result;

/// Broker configuration (plugins.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BrokerConfig {
    #[serde(default)]
    pub plugins: Vec<PluginDef>,
}

/// One plugin process definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginDef {
    /// Stable identifier; falls back to the name, then to a generated id.
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Executable to launch.
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
}

impl PluginDef {
    /// Resolve the registry id for this definition.
    pub fn effective_id(&self) -> String {
        if !self.id.is_empty() {
            return self.id.clone();
        }
        if !self.name.is_empty() {
            return self.name.clone();
        }
        format!("plugin-{}", &Uuid::new_v4().simple().to_string()[..8])
    }
}

/// Load a broker configuration. A missing file is a benign no-op and
/// returns `Ok(None)`.
pub fn load(path: impl AsRef<Path>) -> Result<Option<BrokerConfig>> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(None);
    }
    debug!("Loading plugin configuration from: {}", path.display());
    let content = std::fs::read_to_string(path)?;
    let config: BrokerConfig = toml::from_str(&content)?;
    Ok(Some(config))
}
