use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A node input is either a literal value or a resolved reference to
/// another node's output port.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InputSource {
  Literal { value: serde_json::Value },
  Ref {
    source_node_id: String,
    source_output: String,
  },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
  pub id: String,
  pub node_type: String,
  pub inputs: HashMap<String, InputSource>,
  pub priority: i32,
  #[serde(default)]
  pub outputs: HashMap<String, serde_json::Value>,
}

impl Node {
  /// Record this node's outputs. Only meaningful after the node's task has
  /// completed; the graph otherwise treats nodes as immutable.
  pub fn set_outputs(&mut self, outputs: HashMap<String, serde_json::Value>) {
    self.outputs = outputs;
  }
}
