use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use loomflow_module::{ModuleManager, ModuleState};
use tokio::sync::{Mutex, RwLock};
use tracing::{info, instrument, warn};

use crate::error::PluginError;
use crate::index::PluginIndex;
use crate::manifest::PluginManifest;
use crate::plugin_module::FilesystemPluginModule;

/// Outcome of a bulk "install whatever is needed to satisfy these missing
/// node types" pass, the one-click remediation path a validator failure
/// triggers.
#[derive(Debug, Default)]
pub struct RemediationReport {
  pub installed: Vec<String>,
  pub unresolved: Vec<String>,
  pub failed: HashMap<String, String>,
}

/// Plugin discovery, remote-index lookup, and git install layered on top
/// of a plain [`ModuleManager`]. A plugin is just a [`Module`] whose
/// metadata and entry point were read from an on-disk `plugin.json`
/// rather than compiled in.
pub struct PluginManager {
  modules: ModuleManager,
  index: Mutex<PluginIndex>,
  plugin_dir: PathBuf,
  installed_dirs: RwLock<HashMap<String, PathBuf>>,
  restart_required: AtomicBool,
}

impl PluginManager {
  /// `proxy`, when set, is an explicit `http://[user:pass@]host:port` that
  /// overrides whatever `HTTP_PROXY`/`HTTPS_PROXY` the environment sets
  /// for the remote index fetch. Pass `None` to use the environment's
  /// proxy configuration (or none, if unset).
  pub async fn new(
    plugin_dir: PathBuf,
    primary_index_url: impl Into<String>,
    repositories_path: PathBuf,
    proxy: Option<String>,
  ) -> Self {
    let mut index = PluginIndex::new(primary_index_url, repositories_path).await;
    if let Some(proxy_url) = proxy {
      index = index.with_proxy(proxy_url);
    }
    Self {
      modules: ModuleManager::new(),
      index: Mutex::new(index),
      plugin_dir,
      installed_dirs: RwLock::new(HashMap::new()),
      restart_required: AtomicBool::new(false),
    }
  }

  pub fn modules(&self) -> &ModuleManager {
    &self.modules
  }

  pub fn restart_required(&self) -> bool {
    self.restart_required.load(Ordering::SeqCst)
  }

  /// Walks the plugin directory, registering one `Module` per subdirectory
  /// that carries a readable `plugin.json`. Unreadable or malformed
  /// entries are logged and skipped, not fatal to discovery as a whole.
  #[instrument(skip(self))]
  pub async fn discover(&self) -> Result<Vec<String>, PluginError> {
    let mut discovered = Vec::new();
    let mut entries = match tokio::fs::read_dir(&self.plugin_dir).await {
      Ok(entries) => entries,
      Err(_) => return Ok(discovered),
    };

    while let Ok(Some(entry)) = entries.next_entry().await {
      let path = entry.path();
      if !path.is_dir() {
        continue;
      }
      match self.register_from_dir(&path).await {
        Ok(id) => discovered.push(id),
        Err(err) => warn!(dir = %path.display(), error = %err, "skipping non-plugin directory"),
      }
    }
    Ok(discovered)
  }

  async fn register_from_dir(&self, dir: &std::path::Path) -> Result<String, PluginError> {
    let manifest = PluginManifest::load(dir).await?;
    let id = manifest.id.clone();
    self.modules.register(Arc::new(FilesystemPluginModule::new(manifest, dir.to_path_buf()))).await;
    self.installed_dirs.write().await.insert(id.clone(), dir.to_path_buf());
    Ok(id)
  }

  pub async fn refresh_index(&self, force: bool) -> Result<(), PluginError> {
    self.index.lock().await.refresh(force).await
  }

  pub async fn available(&self) -> HashMap<String, Vec<String>> {
    self.index.lock().await.available().clone()
  }

  pub async fn find_by_node(&self, node_type: &str) -> Option<String> {
    self.index.lock().await.find_by_node(node_type).map(str::to_string)
  }

  /// Resolves each missing node type to a git url via the index, installs
  /// the distinct set of resulting repositories, and reports what could
  /// not be resolved or failed to install. Never partially aborts: one
  /// failed install does not block the rest.
  #[instrument(skip(self))]
  pub async fn install_missing_nodes(&self, missing: &[String]) -> RemediationReport {
    let mut report = RemediationReport::default();
    let mut by_git_url: HashMap<String, Vec<String>> = HashMap::new();

    for node_type in missing {
      match self.find_by_node(node_type).await {
        Some(git_url) => by_git_url.entry(git_url).or_default().push(node_type.clone()),
        None => report.unresolved.push(node_type.clone()),
      }
    }

    for (git_url, _node_types) in by_git_url {
      match self.install(&git_url).await {
        Ok(id) => report.installed.push(id),
        Err(err) => {
          report.failed.insert(git_url, err.to_string());
        }
      }
    }
    report
  }

  /// Clones `git_url` into the plugin directory and registers it. Already
  /// installed (directory exists) is treated as success, not re-cloned.
  /// Sets `restart_required` since node registration only happens at
  /// discovery time, not live.
  #[instrument(skip(self))]
  pub async fn install(&self, git_url: &str) -> Result<String, PluginError> {
    let repo_name = git_url.trim_end_matches('/').trim_end_matches(".git").rsplit('/').next().unwrap_or(git_url).to_string();
    let target = self.plugin_dir.join(&repo_name);

    if !tokio::fs::try_exists(&target).await.unwrap_or(false) {
      tokio::fs::create_dir_all(&self.plugin_dir).await.map_err(|e| PluginError::CloneFailure {
        git_url: git_url.to_string(),
        message: e.to_string(),
      })?;
      let url = git_url.to_string();
      let dest = target.clone();
      tokio::task::spawn_blocking(move || git2::Repository::clone(&url, &dest))
        .await
        .map_err(|e| PluginError::CloneFailure { git_url: git_url.to_string(), message: e.to_string() })?
        .map_err(|e| PluginError::CloneFailure { git_url: git_url.to_string(), message: e.to_string() })?;
    }

    let id = self.register_from_dir(&target).await?;
    self.restart_required.store(true, Ordering::SeqCst);
    info!(plugin_id = %id, git_url, "plugin installed");
    Ok(id)
  }

  #[instrument(skip(self))]
  pub async fn uninstall(&self, plugin_id: &str) -> Result<(), PluginError> {
    if self.modules.state(plugin_id).await == Some(ModuleState::Activated) {
      self.modules.deactivate(plugin_id).await?;
    }
    self.modules.unregister(plugin_id).await;
    if let Some(dir) = self.installed_dirs.write().await.remove(plugin_id) {
      let _ = tokio::fs::remove_dir_all(dir).await;
    }
    self.restart_required.store(true, Ordering::SeqCst);
    Ok(())
  }

  /// Deactivate, unregister, and re-discover from the same directory.
  pub async fn reload(&self, plugin_id: &str) -> Result<String, PluginError> {
    let dir = self.installed_dirs.read().await.get(plugin_id).cloned().ok_or_else(|| PluginError::NotFound(plugin_id.to_string()))?;
    if self.modules.state(plugin_id).await == Some(ModuleState::Activated) {
      self.modules.deactivate(plugin_id).await?;
    }
    self.modules.unregister(plugin_id).await;
    self.installed_dirs.write().await.remove(plugin_id);
    self.register_from_dir(&dir).await
  }

  pub async fn add_custom_repository(&self, url: impl Into<String>) -> Result<(), PluginError> {
    self.index.lock().await.add_custom_repository(url).await
  }

  pub async fn disable_repository(&self, url: impl Into<String>) -> Result<(), PluginError> {
    self.index.lock().await.disable_repository(url).await
  }

  pub async fn enable_repository(&self, url: &str) -> Result<(), PluginError> {
    self.index.lock().await.enable_repository(url).await
  }

  pub async fn custom_repositories(&self) -> Vec<String> {
    self.index.lock().await.custom_repositories().to_vec()
  }

  pub async fn disabled_repositories(&self) -> Vec<String> {
    self.index.lock().await.disabled_repositories().to_vec()
  }
}
