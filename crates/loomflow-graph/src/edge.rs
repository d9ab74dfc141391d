use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
  pub id: String,
  pub source: String,
  pub source_output: String,
  pub target: String,
  pub target_input: String,
}
