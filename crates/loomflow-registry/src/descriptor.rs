use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Controls whether a declared port is driven by an incoming edge or
/// editable directly in a UI client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayMode {
  /// Derive the render mode from the port's default value and
  /// `connection_only` flag, per the registration contract.
  Auto,
  ForceHandle,
  ForceWidget,
}

/// The resolved rendering mode for an input port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderAs {
  /// Must be driven by an incoming edge.
  Handle,
  /// Editable literal in a UI client.
  Widget,
}

/// An input port's declared specification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputPortSpec {
  pub port_type: loomflow_config::PortType,
  #[serde(default)]
  pub default: Option<serde_json::Value>,
  #[serde(default)]
  pub constraints: Option<serde_json::Value>,
  #[serde(default)]
  pub widget_hint: Option<loomflow_config::WidgetHint>,
  #[serde(default = "default_display_mode")]
  pub display_mode: DisplayMode,
  /// Marked as explicitly edge-only, overriding the `Auto` widget default.
  #[serde(default)]
  pub connection_only: bool,
}

fn default_display_mode() -> DisplayMode {
  DisplayMode::Auto
}

impl InputPortSpec {
  /// The render mode rule from the registration contract: under `Auto`, a
  /// port renders as a widget iff it has a default value and is not marked
  /// connection-only; otherwise it renders as a handle.
  pub fn render_as(&self) -> RenderAs {
    match self.display_mode {
      DisplayMode::ForceHandle => RenderAs::Handle,
      DisplayMode::ForceWidget => RenderAs::Widget,
      DisplayMode::Auto => {
        if self.default.is_some() && !self.connection_only {
          RenderAs::Widget
        } else {
          RenderAs::Handle
        }
      }
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputPortSpec {
  pub port_type: loomflow_config::PortType,
}

/// Where a node type came from: shipped with the engine, or contributed by
/// a plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Provenance {
  Builtin,
  Plugin(String),
}

/// The catalog entry for one executable node type. Immutable once
/// registered; replaced wholesale on re-registration, destroyed on
/// explicit removal or plugin unload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeTypeDescriptor {
  pub name: String,
  pub category: String,
  pub description: String,
  pub inputs: IndexMap<String, InputPortSpec>,
  pub outputs: IndexMap<String, OutputPortSpec>,
  pub provenance: Provenance,
}
