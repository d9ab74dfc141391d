use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::PluginError;

/// On-disk `plugin.json`, one per plugin directory. `entry` is a path,
/// relative to the manifest, to a compiled executable the engine shells
/// out to at invoke time; `node_types` is what that executable claims to
/// provide, used to build `NodeTypeDescriptor`s without running it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginManifest {
  pub id: String,
  pub name: String,
  pub version: String,
  #[serde(default)]
  pub description: String,
  pub entry: String,
  #[serde(default)]
  pub node_types: Vec<String>,
  #[serde(default)]
  pub module_dependencies: Vec<String>,
}

impl PluginManifest {
  pub async fn load(dir: &Path) -> Result<Self, PluginError> {
    let manifest_path = dir.join("plugin.json");
    let raw = tokio::fs::read_to_string(&manifest_path).await.map_err(|e| PluginError::NotAPlugin {
      path: dir.display().to_string(),
      reason: format!("no readable plugin.json ({e})"),
    })?;
    let manifest: PluginManifest = serde_json::from_str(&raw).map_err(|e| PluginError::NotAPlugin {
      path: dir.display().to_string(),
      reason: format!("malformed plugin.json ({e})"),
    })?;
    Ok(manifest)
  }

  pub fn entry_path(&self, plugin_dir: &Path) -> PathBuf {
    plugin_dir.join(&self.entry)
  }
}
