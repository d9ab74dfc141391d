use serde::{Deserialize, Serialize};

/// A tagged discriminator for the data flowing across an edge.
///
/// `Custom` covers port types a plugin declares that aren't in the closed
/// built-in set; `Any` is universally compatible with every other variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortType {
  Model,
  Image,
  Latent,
  Text,
  Number,
  Boolean,
  Conditioning,
  List,
  Any,
  #[serde(untagged)]
  Custom(String),
}

impl PortType {
  /// `any` is universally compatible; otherwise two ports must share a type.
  pub fn compatible_with(&self, other: &PortType) -> bool {
    matches!(self, PortType::Any) || matches!(other, PortType::Any) || self == other
  }
}

/// Governs how a registered input port is rendered by a UI client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WidgetHint {
  Slider,
  Combo,
  Toggle,
  Text,
  Handle,
}
