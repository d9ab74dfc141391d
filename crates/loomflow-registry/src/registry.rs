use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use loomflow_graph::{Graph, PortSchemaIndex};
use tokio::sync::RwLock;
use tracing::instrument;

use crate::descriptor::NodeTypeDescriptor;
use crate::error::RegistryError;
use crate::executor::NodeExecutor;

struct RegisteredNode {
  descriptor: NodeTypeDescriptor,
  executor: Arc<dyn NodeExecutor>,
}

/// An edge whose source output type and target input type aren't
/// compatible, per [`loomflow_config::PortType::compatible_with`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortMismatch {
  pub edge_id: String,
  pub source_type: loomflow_config::PortType,
  pub target_type: loomflow_config::PortType,
}

/// The result of checking a graph against the catalog: node types it
/// references but that aren't registered, and edges whose endpoints carry
/// incompatible port types. Both lists empty means the workflow is valid.
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
  pub missing_node_types: HashSet<String>,
  pub port_mismatches: Vec<PortMismatch>,
}

impl ValidationReport {
  pub fn is_valid(&self) -> bool {
    self.missing_node_types.is_empty() && self.port_mismatches.is_empty()
  }
}

/// The catalog of executable node types.
///
/// Reads (lookup, list, validate) take a shared lock; registration and
/// removal take an exclusive one. Descriptor mutation mid-execution is
/// disallowed by convention, not enforced by the lock.
#[derive(Clone, Default)]
pub struct NodeRegistry {
  entries: Arc<RwLock<HashMap<String, RegisteredNode>>>,
}

impl NodeRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  #[instrument(skip(self, executor))]
  pub async fn register(
    &self,
    descriptor: NodeTypeDescriptor,
    executor: Arc<dyn NodeExecutor>,
  ) -> Result<(), RegistryError> {
    let mut entries = self.entries.write().await;
    if entries.contains_key(&descriptor.name) {
      return Err(RegistryError::AlreadyRegistered(descriptor.name));
    }
    let name = descriptor.name.clone();
    entries.insert(name, RegisteredNode { descriptor, executor });
    Ok(())
  }

  pub async fn remove(&self, name: &str) -> Result<(), RegistryError> {
    let mut entries = self.entries.write().await;
    entries
      .remove(name)
      .map(|_| ())
      .ok_or_else(|| RegistryError::NotFound(name.to_string()))
  }

  /// Remove every descriptor contributed by a given plugin, used when a
  /// plugin is unloaded.
  pub async fn remove_plugin(&self, plugin_id: &str) -> Vec<String> {
    let mut entries = self.entries.write().await;
    let removed: Vec<String> = entries
      .iter()
      .filter(|(_, r)| {
        matches!(&r.descriptor.provenance, crate::descriptor::Provenance::Plugin(id) if id == plugin_id)
      })
      .map(|(name, _)| name.clone())
      .collect();
    for name in &removed {
      entries.remove(name);
    }
    removed
  }

  pub async fn descriptor(&self, name: &str) -> Option<NodeTypeDescriptor> {
    let entries = self.entries.read().await;
    entries.get(name).map(|r| r.descriptor.clone())
  }

  pub async fn executor(&self, name: &str) -> Option<Arc<dyn NodeExecutor>> {
    let entries = self.entries.read().await;
    entries.get(name).map(|r| r.executor.clone())
  }

  pub async fn list(&self) -> Vec<NodeTypeDescriptor> {
    let entries = self.entries.read().await;
    entries.values().map(|r| r.descriptor.clone()).collect()
  }

  pub async fn contains(&self, name: &str) -> bool {
    let entries = self.entries.read().await;
    entries.contains_key(name)
  }

  /// Checks a graph against the catalog: every node's type must be
  /// registered, and every edge's source output type must be compatible
  /// with its target input type. An edge touching an unregistered node
  /// type is skipped here — that's already reported via
  /// `missing_node_types`, and there is no schema to check it against.
  pub async fn validate_workflow(&self, graph: &Graph) -> ValidationReport {
    let entries = self.entries.read().await;
    let missing_node_types: HashSet<String> = graph
      .nodes()
      .map(|n| n.node_type.clone())
      .filter(|node_type| !entries.contains_key(node_type))
      .collect();

    let mut port_mismatches = Vec::new();
    for edge in graph.edges() {
      let (Some(source_node), Some(target_node)) =
        (graph.get_node(&edge.source), graph.get_node(&edge.target))
      else {
        continue;
      };
      let (Some(source_entry), Some(target_entry)) = (
        entries.get(&source_node.node_type),
        entries.get(&target_node.node_type),
      ) else {
        continue;
      };
      let (Some(output_spec), Some(input_spec)) = (
        source_entry.descriptor.outputs.get(&edge.source_output),
        target_entry.descriptor.inputs.get(&edge.target_input),
      ) else {
        continue;
      };
      if !output_spec.port_type.compatible_with(&input_spec.port_type) {
        port_mismatches.push(PortMismatch {
          edge_id: edge.id.clone(),
          source_type: output_spec.port_type.clone(),
          target_type: input_spec.port_type.clone(),
        });
      }
    }

    ValidationReport {
      missing_node_types,
      port_mismatches,
    }
  }

  /// A snapshot of every registered node type's declared input port names,
  /// for [`loomflow_graph::Graph::from_document`] to check input bindings
  /// against ahead of a full [`Self::validate_workflow`] pass.
  pub async fn port_schema_index(&self) -> PortSchemaIndex {
    let entries = self.entries.read().await;
    let input_ports = entries
      .iter()
      .map(|(name, entry)| {
        let ports = entry.descriptor.inputs.keys().cloned().collect();
        (name.clone(), ports)
      })
      .collect();
    PortSchemaIndex::new(input_ports)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::executor::{ExecutorError, Inputs, Outputs};
  use async_trait::async_trait;
  use indexmap::IndexMap;
  use loomflow_config::WorkflowDocument;

  struct Noop;

  #[async_trait]
  impl NodeExecutor for Noop {
    async fn invoke(&self, _inputs: Inputs) -> Result<Outputs, ExecutorError> {
      Ok(Outputs::new())
    }
  }

  fn descriptor(name: &str) -> NodeTypeDescriptor {
    NodeTypeDescriptor {
      name: name.to_string(),
      category: "test".to_string(),
      description: String::new(),
      inputs: IndexMap::new(),
      outputs: IndexMap::new(),
      provenance: crate::descriptor::Provenance::Builtin,
    }
  }

  #[tokio::test]
  async fn validate_workflow_reports_missing_types() {
    let registry = NodeRegistry::new();
    registry
      .register(descriptor("known"), Arc::new(Noop))
      .await
      .unwrap();

    let doc = WorkflowDocument::from_json(
      r#"{"nodes": {"a": {"type": "known", "inputs": {}}, "b": {"type": "unknown", "inputs": {}}}, "edges": {}}"#,
    )
    .unwrap();
    let graph = Graph::from_document(&doc, None).unwrap();

    let report = registry.validate_workflow(&graph).await;
    assert_eq!(report.missing_node_types, HashSet::from(["unknown".to_string()]));
    assert!(report.port_mismatches.is_empty());
  }

  #[tokio::test]
  async fn validate_workflow_reports_incompatible_port_types() {
    let registry = NodeRegistry::new();
    let mut number_out = IndexMap::new();
    number_out.insert(
      "v".to_string(),
      crate::descriptor::OutputPortSpec {
        port_type: loomflow_config::PortType::Number,
      },
    );
    let mut text_in = IndexMap::new();
    text_in.insert(
      "x".to_string(),
      crate::descriptor::InputPortSpec {
        port_type: loomflow_config::PortType::Text,
        default: None,
        constraints: None,
        widget_hint: None,
        display_mode: crate::descriptor::DisplayMode::Auto,
        connection_only: true,
      },
    );
    registry
      .register(
        NodeTypeDescriptor {
          name: "number_source".to_string(),
          category: "test".to_string(),
          description: String::new(),
          inputs: IndexMap::new(),
          outputs: number_out,
          provenance: crate::descriptor::Provenance::Builtin,
        },
        Arc::new(Noop),
      )
      .await
      .unwrap();
    registry
      .register(
        NodeTypeDescriptor {
          name: "text_sink".to_string(),
          category: "test".to_string(),
          description: String::new(),
          inputs: text_in,
          outputs: IndexMap::new(),
          provenance: crate::descriptor::Provenance::Builtin,
        },
        Arc::new(Noop),
      )
      .await
      .unwrap();

    let doc = WorkflowDocument::from_json(
      r#"{
        "nodes": {
          "a": {"type": "number_source", "inputs": {}},
          "b": {"type": "text_sink", "inputs": {"x": {"$ref": "a.outputs.v"}}}
        },
        "edges": {"e1": {"source": "a", "source_output": "v", "target": "b", "target_input": "x"}}
      }"#,
    )
    .unwrap();
    let graph = Graph::from_document(&doc, None).unwrap();

    let report = registry.validate_workflow(&graph).await;
    assert!(report.missing_node_types.is_empty());
    assert_eq!(report.port_mismatches.len(), 1);
    assert_eq!(report.port_mismatches[0].edge_id, "e1");
    assert!(!report.is_valid());
  }

  #[tokio::test]
  async fn duplicate_registration_rejected() {
    let registry = NodeRegistry::new();
    registry
      .register(descriptor("a"), Arc::new(Noop))
      .await
      .unwrap();
    let err = registry.register(descriptor("a"), Arc::new(Noop)).await;
    assert!(matches!(err, Err(RegistryError::AlreadyRegistered(_))));
  }
}
