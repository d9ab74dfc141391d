//! loomflow-module
//!
//! The module lifecycle state machine shared by built-in and plugin code:
//! discovery-independent load/activate/deactivate with timeout, bounded
//! retry, and dependency-ordered recursive activation. See
//! `loomflow-plugin` for the filesystem/remote-index layer built on top.

mod error;
mod manager;
mod module;

pub use error::ModuleError;
pub use manager::ModuleManager;
pub use module::{Module, ModuleMetadata, ModuleRecord, ModuleState};

#[cfg(test)]
mod tests {
  use super::*;
  use async_trait::async_trait;
  use std::sync::atomic::{AtomicBool, Ordering};
  use std::sync::Arc;

  struct Fixture {
    id: &'static str,
    deps: Vec<String>,
    fail_activate: bool,
    activated: Arc<AtomicBool>,
  }

  #[async_trait]
  impl Module for Fixture {
    fn metadata(&self) -> ModuleMetadata {
      ModuleMetadata {
        id: self.id.to_string(),
        name: self.id.to_string(),
        version: "0.1.0".to_string(),
        description: String::new(),
        module_dependencies: self.deps.clone(),
        package_dependencies: vec![],
      }
    }

    async fn load(&self) -> Result<(), String> {
      Ok(())
    }

    async fn activate(&self) -> Result<(), String> {
      if self.fail_activate {
        Err("boom".to_string())
      } else {
        self.activated.store(true, Ordering::SeqCst);
        Ok(())
      }
    }

    async fn deactivate(&self) -> Result<(), String> {
      self.activated.store(false, Ordering::SeqCst);
      Ok(())
    }
  }

  #[tokio::test]
  async fn activation_dependency_order() {
    let manager = ModuleManager::new();
    let q_activated = Arc::new(AtomicBool::new(false));
    let p_activated = Arc::new(AtomicBool::new(false));

    manager
      .register(Arc::new(Fixture {
        id: "q",
        deps: vec![],
        fail_activate: false,
        activated: q_activated.clone(),
      }))
      .await;
    manager
      .register(Arc::new(Fixture {
        id: "p",
        deps: vec!["q".to_string()],
        fail_activate: false,
        activated: p_activated.clone(),
      }))
      .await;

    manager.load("q").await.unwrap();
    manager.load("p").await.unwrap();
    manager.activate("p").await.unwrap();

    assert!(q_activated.load(Ordering::SeqCst));
    assert!(p_activated.load(Ordering::SeqCst));
    assert_eq!(manager.state("q").await, Some(ModuleState::Activated));
  }

  #[tokio::test]
  async fn dependency_activation_failure_leaves_parent_loaded() {
    let manager = ModuleManager::new();
    manager
      .register(Arc::new(Fixture {
        id: "q",
        deps: vec![],
        fail_activate: true,
        activated: Arc::new(AtomicBool::new(false)),
      }))
      .await;
    manager
      .register(Arc::new(Fixture {
        id: "p",
        deps: vec!["q".to_string()],
        fail_activate: false,
        activated: Arc::new(AtomicBool::new(false)),
      }))
      .await;

    manager.load("q").await.unwrap();
    manager.load("p").await.unwrap();

    let result = manager.activate("p").await;
    assert!(result.is_err());
    assert_eq!(manager.state("p").await, Some(ModuleState::Loaded));
    assert!(manager.get_module_api("p").await.is_none());
  }
}
