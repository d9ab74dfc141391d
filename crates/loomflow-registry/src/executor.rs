use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;

pub type Inputs = HashMap<String, serde_json::Value>;
pub type Outputs = HashMap<String, serde_json::Value>;

#[derive(Debug, Error)]
pub enum ExecutorError {
  #[error("{0}")]
  Failed(String),
}

/// The capability set a node type's callable exposes: invoke is required,
/// rollback is optional. This is the polymorphic interface the registry
/// dispatches through instead of a single static node type.
#[async_trait]
pub trait NodeExecutor: Send + Sync {
  /// Invoke the node with its resolved inputs, returning named outputs.
  /// Implementations must be pure with respect to `inputs` — any external
  /// state (e.g. a model cache) must be threaded through as an input port.
  async fn invoke(&self, inputs: Inputs) -> Result<Outputs, ExecutorError>;

  /// Whether this node type declares a rollback callable. The scheduler
  /// only invokes [`Self::rollback`] when this returns `true`.
  fn has_rollback(&self) -> bool {
    false
  }

  /// Undo this node's side effects given its original inputs and recorded
  /// outputs. Only called during a failure-triggered rollback cascade.
  async fn rollback(&self, _inputs: &Inputs, _outputs: &Outputs) -> Result<(), ExecutorError> {
    Ok(())
  }
}
