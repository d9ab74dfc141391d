use std::collections::{HashMap, HashSet};

use loomflow_config::{InputBinding, WorkflowDocument};

use crate::edge::Edge;
use crate::error::GraphError;
use crate::node::{InputSource, Node};
use crate::schema::PortSchemaIndex;

/// A locked, structurally-validated workflow graph.
#[derive(Debug, Clone)]
pub struct Graph {
  workflow_id: String,
  name: String,
  nodes: HashMap<String, Node>,
  edges: HashMap<String, Edge>,
  /// node_id -> outgoing edge ids
  adjacency: HashMap<String, Vec<String>>,
  /// node_id -> incoming edge ids
  reverse_adjacency: HashMap<String, Vec<String>>,
  entry_points: Vec<String>,
  join_points: HashSet<String>,
}

impl Graph {
  /// Build a locked graph from a parsed workflow document.
  ///
  /// Checks invariants (i) and (ii) from the data model: every edge's
  /// source/target exist, and every `$ref` input binding matches a
  /// recorded edge. Acyclicity (invariant iii) is checked later, at
  /// execution start, by the topological sorter.
  ///
  /// `schema`, when given, additionally rejects an input binding that
  /// names a port absent from its node type's declared schema. Pass
  /// `None` when no registry is available yet (e.g. parsing ahead of
  /// plugin discovery); the check is skipped, not assumed to pass.
  pub fn from_document(
    doc: &WorkflowDocument,
    schema: Option<&PortSchemaIndex>,
  ) -> Result<Self, GraphError> {
    let mut nodes = HashMap::with_capacity(doc.nodes.len());

    for (id, raw) in &doc.nodes {
      if id.is_empty() {
        return Err(GraphError::Malformed(
          "node is missing a required 'id'".to_string(),
        ));
      }
      if nodes.contains_key(id) {
        return Err(GraphError::DuplicateNodeId(id.clone()));
      }

      let mut inputs = HashMap::with_capacity(raw.inputs.len());
      for (input_name, binding) in &raw.inputs {
        if let Some(schema) = schema {
          if !schema.has_input_port(&raw.node_type, input_name) {
            return Err(GraphError::UnknownInputPort {
              node_id: id.clone(),
              node_type: raw.node_type.clone(),
              input: input_name.clone(),
            });
          }
        }
        let source = match binding {
          InputBinding::Literal(value) => InputSource::Literal {
            value: value.clone(),
          },
          InputBinding::Ref { reference } => {
            let (source_node_id, source_output) = InputBinding::parse_reference(reference)
              .map_err(|e| GraphError::Malformed(e.to_string()))?;
            InputSource::Ref {
              source_node_id,
              source_output,
            }
          }
        };
        inputs.insert(input_name.clone(), source);
      }

      nodes.insert(
        id.clone(),
        Node {
          id: id.clone(),
          node_type: raw.node_type.clone(),
          inputs,
          priority: raw.priority,
          outputs: HashMap::new(),
        },
      );
    }

    let mut edges = HashMap::with_capacity(doc.edges.len());
    let mut adjacency: HashMap<String, Vec<String>> = HashMap::new();
    let mut reverse_adjacency: HashMap<String, Vec<String>> = HashMap::new();
    for id in nodes.keys() {
      adjacency.entry(id.clone()).or_default();
      reverse_adjacency.entry(id.clone()).or_default();
    }

    for (edge_id, raw) in &doc.edges {
      if !nodes.contains_key(&raw.source) || !nodes.contains_key(&raw.target) {
        return Err(GraphError::InvalidEdge {
          edge_id: edge_id.clone(),
          from: raw.source.clone(),
          to: raw.target.clone(),
        });
      }
      adjacency
        .entry(raw.source.clone())
        .or_default()
        .push(edge_id.clone());
      reverse_adjacency
        .entry(raw.target.clone())
        .or_default()
        .push(edge_id.clone());
      edges.insert(
        edge_id.clone(),
        Edge {
          id: edge_id.clone(),
          source: raw.source.clone(),
          source_output: raw.source_output.clone(),
          target: raw.target.clone(),
          target_input: raw.target_input.clone(),
        },
      );
    }

    // Invariant (ii): every $ref input binding must correspond to a recorded
    // edge between the same two nodes.
    for node in nodes.values() {
      for (input_name, source) in &node.inputs {
        if let InputSource::Ref {
          source_node_id,
          source_output,
        } = source
        {
          if !nodes.contains_key(source_node_id) {
            return Err(GraphError::DanglingReference {
              node_id: node.id.clone(),
              input: input_name.clone(),
              reference: format!("{source_node_id}.outputs.{source_output}"),
            });
          }
          let has_matching_edge = reverse_adjacency[&node.id].iter().any(|edge_id| {
            let e = &edges[edge_id];
            e.source == *source_node_id
              && e.source_output == *source_output
              && e.target_input == *input_name
          });
          if !has_matching_edge {
            return Err(GraphError::DanglingReference {
              node_id: node.id.clone(),
              input: input_name.clone(),
              reference: format!("{source_node_id}.outputs.{source_output}"),
            });
          }
        }
      }
    }

    let entry_points: Vec<String> = nodes
      .keys()
      .filter(|id| reverse_adjacency.get(*id).is_none_or(Vec::is_empty))
      .cloned()
      .collect();

    let join_points: HashSet<String> = reverse_adjacency
      .iter()
      .filter(|(_, incoming)| incoming.len() > 1)
      .map(|(id, _)| id.clone())
      .collect();

    Ok(Self {
      workflow_id: doc.workflow_id.clone().unwrap_or_default(),
      name: doc.name.clone().unwrap_or_default(),
      nodes,
      edges,
      adjacency,
      reverse_adjacency,
      entry_points,
      join_points,
    })
  }

  pub fn workflow_id(&self) -> &str {
    &self.workflow_id
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn get_node(&self, node_id: &str) -> Option<&Node> {
    self.nodes.get(node_id)
  }

  pub fn get_node_mut(&mut self, node_id: &str) -> Option<&mut Node> {
    self.nodes.get_mut(node_id)
  }

  pub fn nodes(&self) -> impl Iterator<Item = &Node> {
    self.nodes.values()
  }

  pub fn node_count(&self) -> usize {
    self.nodes.len()
  }

  pub fn edges(&self) -> impl Iterator<Item = &Edge> {
    self.edges.values()
  }

  pub fn entry_points(&self) -> &[String] {
    &self.entry_points
  }

  /// Outgoing edges from a node.
  pub fn edges_from(&self, node_id: &str) -> impl Iterator<Item = &Edge> {
    self
      .adjacency
      .get(node_id)
      .into_iter()
      .flatten()
      .map(move |edge_id| &self.edges[edge_id])
  }

  /// Incoming edges to a node.
  pub fn edges_to(&self, node_id: &str) -> impl Iterator<Item = &Edge> {
    self
      .reverse_adjacency
      .get(node_id)
      .into_iter()
      .flatten()
      .map(move |edge_id| &self.edges[edge_id])
  }

  /// Downstream node ids reachable by one hop.
  pub fn downstream(&self, node_id: &str) -> Vec<String> {
    self.edges_from(node_id).map(|e| e.target.clone()).collect()
  }

  /// Upstream node ids reachable by one hop (this node's dependency set).
  pub fn upstream(&self, node_id: &str) -> Vec<String> {
    self.edges_to(node_id).map(|e| e.source.clone()).collect()
  }

  pub fn is_join_point(&self, node_id: &str) -> bool {
    self.join_points.contains(node_id)
  }

  /// Record a node's outputs after its task has completed.
  pub fn record_outputs(&mut self, node_id: &str, outputs: HashMap<String, serde_json::Value>) {
    if let Some(node) = self.nodes.get_mut(node_id) {
      node.set_outputs(outputs);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

    fn doc(json: &str) -> WorkflowDocument {
    WorkflowDocument::from_json(json).unwrap()
  }

  #[test]
  fn builds_linear_chain() {
    let d = doc(
      r#"{
        "nodes": {
          "a": {"type": "literal", "inputs": {}},
          "b": {"type": "incr", "inputs": {"x": {"$ref": "a.outputs.v"}}}
        },
        "edges": {
          "e1": {"source": "a", "source_output": "v", "target": "b", "target_input": "x"}
        }
      }"#,
    );
    let g = Graph::from_document(&d, None).unwrap();
    assert_eq!(g.entry_points(), &["a".to_string()]);
    assert_eq!(g.upstream("b"), vec!["a".to_string()]);
  }

  #[test]
  fn rejects_edge_to_unknown_node() {
    let d = doc(
      r#"{
        "nodes": {"a": {"type": "literal", "inputs": {}}},
        "edges": {"e1": {"source": "a", "source_output": "v", "target": "missing", "target_input": "x"}}
      }"#,
    );
    assert!(matches!(
      Graph::from_document(&d, None),
      Err(GraphError::InvalidEdge { .. })
    ));
  }

  #[test]
  fn rejects_ref_without_matching_edge() {
    let d = doc(
      r#"{
        "nodes": {
          "a": {"type": "literal", "inputs": {}},
          "b": {"type": "incr", "inputs": {"x": {"$ref": "a.outputs.v"}}}
        },
        "edges": {}
      }"#,
    );
    assert!(matches!(
      Graph::from_document(&d, None),
      Err(GraphError::DanglingReference { .. })
    ));
  }

  #[test]
  fn diamond_has_join_point() {
    let d = doc(
      r#"{
        "nodes": {
          "a": {"type": "t", "inputs": {}},
          "b": {"type": "t", "inputs": {}},
          "c": {"type": "t", "inputs": {}},
          "d": {"type": "t", "inputs": {}}
        },
        "edges": {
          "e1": {"source": "a", "source_output": "v", "target": "b", "target_input": "x"},
          "e2": {"source": "a", "source_output": "v", "target": "c", "target_input": "x"},
          "e3": {"source": "b", "source_output": "v", "target": "d", "target_input": "x"},
          "e4": {"source": "c", "source_output": "v", "target": "d", "target_input": "y"}
        }
      }"#,
    );
    let g = Graph::from_document(&d, None).unwrap();
    assert!(g.is_join_point("d"));
    assert!(!g.is_join_point("b"));
  }

  #[test]
  fn rejects_input_binding_to_undeclared_port() {
    let d = doc(
      r#"{
        "nodes": {"a": {"type": "core.add", "inputs": {"not_a_port": {"value": 1}}}},
        "edges": {}
      }"#,
    );
    let schema = PortSchemaIndex::new(HashMap::from([(
      "core.add".to_string(),
      HashSet::from(["a".to_string(), "b".to_string()]),
    )]));
    assert!(matches!(
      Graph::from_document(&d, Some(&schema)),
      Err(GraphError::UnknownInputPort { .. })
    ));
  }

  #[test]
  fn allows_undeclared_port_when_node_type_is_unregistered() {
    let d = doc(
      r#"{
        "nodes": {"a": {"type": "plugin.unknown", "inputs": {"anything": {"value": 1}}}},
        "edges": {}
      }"#,
    );
    let schema = PortSchemaIndex::new(HashMap::from([(
      "core.add".to_string(),
      HashSet::from(["a".to_string()]),
    )]));
    assert!(Graph::from_document(&d, Some(&schema)).is_ok());
  }
}
