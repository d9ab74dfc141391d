use std::collections::HashMap;

use async_trait::async_trait;
use indexmap::IndexMap;
use loomflow_config::{PortType, WidgetHint};
use loomflow_registry::{
  ExecutorError, Inputs, NodeExecutor, NodeRegistry, NodeTypeDescriptor, Outputs, OutputPortSpec, Provenance, RegistryError,
};

/// Registers the handful of node types that ship with the engine itself,
/// independent of any plugin: passthrough, a numeric adder, and a literal
/// constant. Real AI node implementations are a collaborator's concern,
/// not this crate's.
pub async fn register_builtins(registry: &NodeRegistry) -> Result<(), RegistryError> {
  registry
    .register(passthrough_descriptor(), std::sync::Arc::new(Passthrough))
    .await?;
  registry.register(add_descriptor(), std::sync::Arc::new(Add)).await?;
  registry.register(constant_descriptor(), std::sync::Arc::new(Constant)).await?;
  Ok(())
}

fn passthrough_descriptor() -> NodeTypeDescriptor {
  let mut inputs = IndexMap::new();
  inputs.insert(
    "value".to_string(),
    loomflow_registry::InputPortSpec {
      port_type: PortType::Any,
      default: None,
      constraints: None,
      widget_hint: Some(WidgetHint::Handle),
      display_mode: loomflow_registry::DisplayMode::Auto,
      connection_only: true,
    },
  );
  let mut outputs = IndexMap::new();
  outputs.insert("value".to_string(), OutputPortSpec { port_type: PortType::Any });

  NodeTypeDescriptor {
    name: "core.passthrough".to_string(),
    category: "utility".to_string(),
    description: "Forwards its input to its output unchanged.".to_string(),
    inputs,
    outputs,
    provenance: Provenance::Builtin,
  }
}

fn add_descriptor() -> NodeTypeDescriptor {
  let mut inputs = IndexMap::new();
  for name in ["a", "b"] {
    inputs.insert(
      name.to_string(),
      loomflow_registry::InputPortSpec {
        port_type: PortType::Number,
        default: Some(serde_json::json!(0)),
        constraints: None,
        widget_hint: Some(WidgetHint::Slider),
        display_mode: loomflow_registry::DisplayMode::Auto,
        connection_only: false,
      },
    );
  }
  let mut outputs = IndexMap::new();
  outputs.insert("sum".to_string(), OutputPortSpec { port_type: PortType::Number });

  NodeTypeDescriptor {
    name: "core.add".to_string(),
    category: "math".to_string(),
    description: "Adds two numbers.".to_string(),
    inputs,
    outputs,
    provenance: Provenance::Builtin,
  }
}

fn constant_descriptor() -> NodeTypeDescriptor {
  let mut inputs = IndexMap::new();
  inputs.insert(
    "value".to_string(),
    loomflow_registry::InputPortSpec {
      port_type: PortType::Any,
      default: Some(serde_json::json!(null)),
      constraints: None,
      widget_hint: Some(WidgetHint::Text),
      display_mode: loomflow_registry::DisplayMode::Auto,
      connection_only: false,
    },
  );
  let mut outputs = IndexMap::new();
  outputs.insert("value".to_string(), OutputPortSpec { port_type: PortType::Any });

  NodeTypeDescriptor {
    name: "core.constant".to_string(),
    category: "utility".to_string(),
    description: "Emits a literal value supplied at the input port.".to_string(),
    inputs,
    outputs,
    provenance: Provenance::Builtin,
  }
}

struct Passthrough;

#[async_trait]
impl NodeExecutor for Passthrough {
  async fn invoke(&self, inputs: Inputs) -> Result<Outputs, ExecutorError> {
    let value = inputs.get("value").cloned().unwrap_or(serde_json::Value::Null);
    Ok(HashMap::from([("value".to_string(), value)]))
  }
}

struct Add;

#[async_trait]
impl NodeExecutor for Add {
  async fn invoke(&self, inputs: Inputs) -> Result<Outputs, ExecutorError> {
    let a = inputs.get("a").and_then(|v| v.as_f64()).unwrap_or(0.0);
    let b = inputs.get("b").and_then(|v| v.as_f64()).unwrap_or(0.0);
    Ok(HashMap::from([("sum".to_string(), serde_json::json!(a + b))]))
  }
}

struct Constant;

#[async_trait]
impl NodeExecutor for Constant {
  async fn invoke(&self, inputs: Inputs) -> Result<Outputs, ExecutorError> {
    let value = inputs.get("value").cloned().unwrap_or(serde_json::Value::Null);
    Ok(HashMap::from([("value".to_string(), value)]))
  }
}
