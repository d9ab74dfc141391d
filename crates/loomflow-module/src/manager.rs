use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Notify, RwLock};
use tokio::time::timeout;
use tracing::{instrument, warn};

use crate::error::ModuleError;
use crate::module::{Module, ModuleMetadata, ModuleRecord, ModuleState};

const DEFAULT_LOAD_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(2);
const DEFAULT_MAX_RETRIES: u32 = 3;

struct Entry {
  record: ModuleRecord,
  module: Arc<dyn Module>,
  notify: Arc<Notify>,
}

/// A registry of [`ModuleRecord`]s driving each through:
///
/// ```text
/// Unloaded --load--> Loading --success--> Loaded
///                              \-failure-> Failed
/// Loaded   --activate--> Activating --success--> Activated
///                                    \-failure--> Failed
/// Activated --deactivate--> Loaded
/// Failed    --(retry, up to N times with delay)--> Loading
/// ```
///
/// A `Failed` module never crashes the manager; `get_module_api` on a
/// non-`Activated` module returns `None` and logs a warning.
pub struct ModuleManager {
  entries: Arc<RwLock<HashMap<String, Entry>>>,
  load_timeout: Duration,
  retry_delay: Duration,
  max_retries: u32,
}

impl Default for ModuleManager {
  fn default() -> Self {
    Self {
      entries: Arc::new(RwLock::new(HashMap::new())),
      load_timeout: DEFAULT_LOAD_TIMEOUT,
      retry_delay: DEFAULT_RETRY_DELAY,
      max_retries: DEFAULT_MAX_RETRIES,
    }
  }
}

impl ModuleManager {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_policy(load_timeout: Duration, retry_delay: Duration, max_retries: u32) -> Self {
    Self {
      entries: Arc::new(RwLock::new(HashMap::new())),
      load_timeout,
      retry_delay,
      max_retries,
    }
  }

  pub async fn register(&self, module: Arc<dyn Module>) {
    let metadata = module.metadata();
    let mut entries = self.entries.write().await;
    entries.insert(
      metadata.id.clone(),
      Entry {
        record: ModuleRecord::new(metadata),
        module,
        notify: Arc::new(Notify::new()),
      },
    );
  }

  pub async fn state(&self, id: &str) -> Option<ModuleState> {
    self.entries.read().await.get(id).map(|e| e.record.state)
  }

  pub async fn metadata(&self, id: &str) -> Option<ModuleMetadata> {
    self.entries.read().await.get(id).map(|e| e.record.metadata.clone())
  }

  fn set_state(entries: &mut HashMap<String, Entry>, id: &str, state: ModuleState) {
    if let Some(e) = entries.get_mut(id) {
      e.record.state = state;
      e.notify.notify_waiters();
    }
  }

  /// Idempotent while the module is already `Loading`: the caller waits on
  /// a state-change signal until `Loaded` or `Failed` rather than racing a
  /// second load attempt.
  #[instrument(skip(self))]
  pub async fn load(&self, id: &str) -> Result<(), ModuleError> {
    loop {
      let (module, notify, current_state) = {
        let entries = self.entries.read().await;
        let entry = entries.get(id).ok_or_else(|| ModuleError::NotFound(id.to_string()))?;
        (entry.module.clone(), entry.notify.clone(), entry.record.state)
      };

      match current_state {
        ModuleState::Loaded | ModuleState::Activating | ModuleState::Activated => return Ok(()),
        ModuleState::Loading => {
          notify.notified().await;
          continue;
        }
        ModuleState::Unloaded | ModuleState::Failed => {
          return self.attempt_load(id, module, notify).await;
        }
      }
    }
  }

  async fn attempt_load(
    &self,
    id: &str,
    module: Arc<dyn Module>,
    notify: Arc<Notify>,
  ) -> Result<(), ModuleError> {
    {
      let mut entries = self.entries.write().await;
      Self::set_state(&mut entries, id, ModuleState::Loading);
    }

    let mut attempts = 0;
    loop {
      attempts += 1;
      let result = timeout(self.load_timeout, module.load()).await;

      let mut entries = self.entries.write().await;
      let entry = entries.get_mut(id).expect("entry exists for the duration of load()");
      entry.record.load_attempts = attempts;

      match result {
        Ok(Ok(())) => {
          entry.record.state = ModuleState::Loaded;
          entry.record.last_error = None;
          notify.notify_waiters();
          return Ok(());
        }
        Ok(Err(message)) => {
          entry.record.state = ModuleState::Failed;
          entry.record.last_error = Some(message.clone());
          notify.notify_waiters();
          if attempts > self.max_retries {
            return Err(ModuleError::LoadFailure { id: id.to_string(), message });
          }
        }
        Err(_elapsed) => {
          entry.record.state = ModuleState::Failed;
          entry.record.last_error = Some("load timed out".to_string());
          notify.notify_waiters();
          if attempts > self.max_retries {
            return Err(ModuleError::LoadTimeout(id.to_string()));
          }
        }
      }
      drop(entries);
      tokio::time::sleep(self.retry_delay).await;
      let mut entries = self.entries.write().await;
      Self::set_state(&mut entries, id, ModuleState::Loading);
    }
  }

  /// Requires `Loaded`. Recursively activates declared module dependencies
  /// first; a dependency failure propagates and this module is left
  /// `Loaded`, never `Activated`.
  #[instrument(skip(self))]
  pub fn activate<'a>(
    &'a self,
    id: &'a str,
  ) -> Pin<Box<dyn Future<Output = Result<(), ModuleError>> + Send + 'a>> {
    Box::pin(async move {
      let (module, metadata, current_state) = {
        let entries = self.entries.read().await;
        let entry = entries.get(id).ok_or_else(|| ModuleError::NotFound(id.to_string()))?;
        (entry.module.clone(), entry.record.metadata.clone(), entry.record.state)
      };

      if current_state == ModuleState::Activated {
        return Ok(());
      }
      if current_state != ModuleState::Loaded {
        return Err(ModuleError::DependencyValidation {
          id: id.to_string(),
          dependency: id.to_string(),
          reason: format!("module must be Loaded to activate, is {current_state:?}"),
        });
      }

      for dep_id in &metadata.module_dependencies {
        self.validate_dependency_activatable(id, dep_id).await?;
        self.activate(dep_id).await.map_err(|_| ModuleError::DependencyValidation {
          id: id.to_string(),
          dependency: dep_id.clone(),
          reason: "dependency failed to activate".to_string(),
        })?;
      }

      {
        let mut entries = self.entries.write().await;
        Self::set_state(&mut entries, id, ModuleState::Activating);
      }

      let result = timeout(self.load_timeout, module.activate()).await;
      let mut entries = self.entries.write().await;
      let entry = entries.get_mut(id).expect("entry exists for the duration of activate()");
      match result {
        Ok(Ok(())) => {
          entry.record.state = ModuleState::Activated;
          entry.record.last_error = None;
          entry.notify.notify_waiters();
          Ok(())
        }
        Ok(Err(message)) => {
          entry.record.state = ModuleState::Failed;
          entry.record.last_error = Some(message.clone());
          entry.notify.notify_waiters();
          Err(ModuleError::ActivationFailure { id: id.to_string(), message })
        }
        Err(_elapsed) => {
          entry.record.state = ModuleState::Failed;
          entry.record.last_error = Some("activation timed out".to_string());
          entry.notify.notify_waiters();
          Err(ModuleError::ActivationFailure {
            id: id.to_string(),
            message: "activation timed out".to_string(),
          })
        }
      }
    })
  }

  /// Rejects activation if a declared dependency is absent or in a
  /// transient state (Loading/Activating) — only Loaded/Activated are
  /// valid starting points for recursive activation.
  async fn validate_dependency_activatable(&self, id: &str, dep_id: &str) -> Result<(), ModuleError> {
    let entries = self.entries.read().await;
    match entries.get(dep_id).map(|e| e.record.state) {
      None => Err(ModuleError::DependencyValidation {
        id: id.to_string(),
        dependency: dep_id.to_string(),
        reason: "not registered".to_string(),
      }),
      Some(ModuleState::Failed) => Err(ModuleError::DependencyValidation {
        id: id.to_string(),
        dependency: dep_id.to_string(),
        reason: "dependency is Failed".to_string(),
      }),
      Some(_) => Ok(()),
    }
  }

  /// Returns to `Loaded`. Dependents are not automatically deactivated.
  #[instrument(skip(self))]
  pub async fn deactivate(&self, id: &str) -> Result<(), ModuleError> {
    let module = {
      let entries = self.entries.read().await;
      entries.get(id).ok_or_else(|| ModuleError::NotFound(id.to_string()))?.module.clone()
    };
    module.deactivate().await.map_err(|message| ModuleError::DeactivationFailure {
      id: id.to_string(),
      message,
    })?;
    let mut entries = self.entries.write().await;
    Self::set_state(&mut entries, id, ModuleState::Loaded);
    Ok(())
  }

  /// `None` unless the module is `Activated`; logs a warning otherwise so
  /// misconfigured callers are visible without crashing the manager.
  pub async fn get_module_api(&self, id: &str) -> Option<Arc<dyn std::any::Any + Send + Sync>> {
    let entries = self.entries.read().await;
    let entry = entries.get(id)?;
    if entry.record.state != ModuleState::Activated {
      warn!(module_id = id, state = ?entry.record.state, "module API requested while not Activated");
      return None;
    }
    entry.module.api()
  }

  pub async fn list_ids(&self) -> Vec<String> {
    self.entries.read().await.keys().cloned().collect()
  }

  /// Drops the entry entirely. Callers are responsible for deactivating
  /// first if the module may still hold resources.
  pub async fn unregister(&self, id: &str) -> bool {
    self.entries.write().await.remove(id).is_some()
  }
}
