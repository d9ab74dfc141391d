use thiserror::Error;

#[derive(Debug, Error)]
pub enum PluginError {
  #[error("plugin '{0}' is not registered")]
  NotFound(String),

  #[error("no plugin is known to provide node type '{0}'")]
  NoProviderForNode(String),

  #[error("failed to fetch plugin index from {url}: {message}")]
  IndexFetch { url: String, message: String },

  #[error("failed to clone '{git_url}': {message}")]
  CloneFailure { git_url: String, message: String },

  #[error("'{path}' does not look like a loomflow plugin: {reason}")]
  NotAPlugin { path: String, reason: String },

  #[error("repository '{0}' is already registered as a custom repository")]
  AlreadyCustomRepository(String),

  #[error("failed to persist repository configuration: {0}")]
  PersistFailure(String),

  #[error(transparent)]
  Module(#[from] loomflow_module::ModuleError),
}
