use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModuleError {
  #[error("module not found: {0}")]
  NotFound(String),

  #[error("module '{0}' load timed out")]
  LoadTimeout(String),

  #[error("module '{id}' failed to load: {message}")]
  LoadFailure { id: String, message: String },

  #[error("module '{id}' cannot activate: dependency '{dependency}' is not satisfied ({reason})")]
  DependencyValidation {
    id: String,
    dependency: String,
    reason: String,
  },

  #[error("module '{id}' failed to activate: {message}")]
  ActivationFailure { id: String, message: String },

  #[error("module '{id}' failed to deactivate: {message}")]
  DeactivationFailure { id: String, message: String },
}
