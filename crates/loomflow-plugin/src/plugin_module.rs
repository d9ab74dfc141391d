use std::any::Any;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use loomflow_module::{Module, ModuleMetadata};

use crate::manifest::PluginManifest;

/// Adapts a discovered, on-disk plugin into a [`Module`]. `load` only
/// checks the entry executable exists; `activate`/`deactivate` are no-ops
/// because invocation is per-call (the engine shells out to `entry` once
/// per node execution, it is never kept resident).
pub struct FilesystemPluginModule {
  manifest: PluginManifest,
  dir: PathBuf,
}

impl FilesystemPluginModule {
  pub fn new(manifest: PluginManifest, dir: PathBuf) -> Self {
    Self { manifest, dir }
  }

  pub fn manifest(&self) -> &PluginManifest {
    &self.manifest
  }

  pub fn dir(&self) -> &PathBuf {
    &self.dir
  }
}

#[async_trait]
impl Module for FilesystemPluginModule {
  fn metadata(&self) -> ModuleMetadata {
    ModuleMetadata {
      id: self.manifest.id.clone(),
      name: self.manifest.name.clone(),
      version: self.manifest.version.clone(),
      description: self.manifest.description.clone(),
      module_dependencies: self.manifest.module_dependencies.clone(),
      package_dependencies: Vec::new(),
    }
  }

  async fn load(&self) -> Result<(), String> {
    let entry = self.manifest.entry_path(&self.dir);
    if !tokio::fs::try_exists(&entry).await.unwrap_or(false) {
      return Err(format!("entry point '{}' does not exist", entry.display()));
    }
    Ok(())
  }

  async fn activate(&self) -> Result<(), String> {
    Ok(())
  }

  async fn deactivate(&self) -> Result<(), String> {
    Ok(())
  }

  fn api(&self) -> Option<Arc<dyn Any + Send + Sync>> {
    Some(Arc::new(self.manifest.clone()))
  }
}
