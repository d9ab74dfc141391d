use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("failed to parse workflow document: {0}")]
  Parse(String),

  #[error("node '{0}' is missing a required field")]
  MissingField(String),

  #[error("invalid reference '{0}': expected '<node_id>.outputs.<output_name>'")]
  InvalidReference(String),
}
