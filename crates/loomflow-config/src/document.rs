use std::collections::HashMap;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::ConfigError;

/// An input binding is either a literal value or an unresolved reference to
/// another node's output, spelled `{"$ref": "<node_id>.outputs.<output_name>"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InputBinding {
  Ref {
    #[serde(rename = "$ref")]
    reference: String,
  },
  Literal(serde_json::Value),
}

impl InputBinding {
  /// Split a `$ref` binding into `(source_node_id, source_output_name)`.
  pub fn parse_reference(reference: &str) -> Result<(String, String), ConfigError> {
    reference
      .split_once(".outputs.")
      .map(|(node, output)| (node.to_string(), output.to_string()))
      .ok_or_else(|| ConfigError::InvalidReference(reference.to_string()))
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
  pub x: f64,
  pub y: f64,
}

/// A node as it appears in a submitted document, before resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawNode {
  #[serde(default)]
  pub id: String,
  #[serde(rename = "type")]
  pub node_type: String,
  #[serde(default)]
  pub inputs: HashMap<String, InputBinding>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub position: Option<Position>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub metadata: Option<serde_json::Value>,
  #[serde(default = "default_priority")]
  pub priority: i32,
}

fn default_priority() -> i32 {
  50
}

/// An edge as it appears in a submitted document. Both the underscored and
/// camelCase spellings of the port fields are accepted on input; the
/// underscored spelling is canonical on output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEdge {
  #[serde(default)]
  pub id: String,
  pub source: String,
  #[serde(alias = "sourceOutput")]
  pub source_output: String,
  pub target: String,
  #[serde(alias = "targetInput")]
  pub target_input: String,
}

trait WithId {
  fn assign_id(&mut self, id: String);
  fn has_id(&self) -> bool;
  fn get_id(&self) -> String;
}

impl WithId for RawNode {
  fn assign_id(&mut self, id: String) {
    self.id = id;
  }
  fn has_id(&self) -> bool {
    !self.id.is_empty()
  }
  fn get_id(&self) -> String {
    self.id.clone()
  }
}

impl WithId for RawEdge {
  fn assign_id(&mut self, id: String) {
    self.id = id;
  }
  fn has_id(&self) -> bool {
    !self.id.is_empty()
  }
  fn get_id(&self) -> String {
    self.id.clone()
  }
}

/// A collection may be submitted either as a map keyed by id, or as a list
/// whose elements carry an explicit `id` field. Both are normalized to the
/// map form.
#[derive(Deserialize)]
#[serde(untagged)]
enum CollectionRepr<T> {
  Map(HashMap<String, T>),
  List(Vec<T>),
}

fn deserialize_collection<'de, D, T>(deserializer: D) -> Result<HashMap<String, T>, D::Error>
where
  D: Deserializer<'de>,
  T: Deserialize<'de> + WithId,
{
  match CollectionRepr::<T>::deserialize(deserializer)? {
    CollectionRepr::Map(mut map) => {
      for (id, item) in map.iter_mut() {
        if !item.has_id() {
          item.assign_id(id.clone());
        }
      }
      Ok(map)
    }
    CollectionRepr::List(list) => Ok(
      list
        .into_iter()
        .map(|item| (item.get_id(), item))
        .collect(),
    ),
  }
}

/// The top-level shape of a workflow document submitted by a client.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WorkflowDocument {
  #[serde(default)]
  pub workflow_id: Option<String>,
  #[serde(default)]
  pub name: Option<String>,
  #[serde(deserialize_with = "deserialize_collection")]
  pub nodes: HashMap<String, RawNode>,
  #[serde(deserialize_with = "deserialize_collection")]
  pub edges: HashMap<String, RawEdge>,
}

impl WorkflowDocument {
  pub fn from_json(data: &str) -> Result<Self, ConfigError> {
    serde_json::from_str(data).map_err(|e| ConfigError::Parse(e.to_string()))
  }

  pub fn from_yaml(data: &str) -> Result<Self, ConfigError> {
    serde_yaml::from_str(data).map_err(|e| ConfigError::Parse(e.to_string()))
  }
}
