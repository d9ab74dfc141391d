use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleMetadata {
  pub id: String,
  pub name: String,
  pub version: String,
  pub description: String,
  /// Other module ids that must be Activated before this one can be.
  pub module_dependencies: Vec<String>,
  /// External package names this module needs installed before activation.
  pub package_dependencies: Vec<String>,
}

/// A lifecycle-managed unit of code. Built-in modules ship with the engine;
/// plugins (see `loomflow-plugin`) are a `Module` discovered or installed
/// at runtime.
#[async_trait]
pub trait Module: Send + Sync {
  fn metadata(&self) -> ModuleMetadata;

  /// Perform whatever work is needed to bring the module's code into
  /// memory (e.g. dynamic library load, wasm compile). Bounded by the
  /// manager's load timeout, not by this method.
  async fn load(&self) -> Result<(), String>;

  /// Perform whatever work activates the module (e.g. registering node
  /// types). Only called once all declared module dependencies are
  /// Activated.
  async fn activate(&self) -> Result<(), String>;

  async fn deactivate(&self) -> Result<(), String>;

  /// The module's public API, queryable only while Activated. Returned as
  /// `Any` so callers downcast to the concrete API type they expect.
  fn api(&self) -> Option<Arc<dyn Any + Send + Sync>> {
    None
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModuleState {
  Unloaded,
  Loading,
  Loaded,
  Activating,
  Activated,
  Failed,
}

#[derive(Debug, Clone)]
pub struct ModuleRecord {
  pub metadata: ModuleMetadata,
  pub state: ModuleState,
  pub load_attempts: u32,
  pub last_error: Option<String>,
}

impl ModuleRecord {
  pub fn new(metadata: ModuleMetadata) -> Self {
    Self {
      metadata,
      state: ModuleState::Unloaded,
      load_attempts: 0,
      last_error: None,
    }
  }
}
