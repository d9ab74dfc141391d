use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
  #[error("node type already registered: {0}")]
  AlreadyRegistered(String),

  #[error("node type not found: {0}")]
  NotFound(String),

  #[error("executor for node type '{0}' failed: {1}")]
  ExecutorFailure(String, String),

  #[error("rollback for node type '{0}' failed: {1}")]
  RollbackFailure(String, String),
}
