use thiserror::Error;

#[derive(Debug, Error)]
pub enum GraphError {
  #[error("node not found: {0}")]
  NodeNotFound(String),

  #[error("duplicate node id: {0}")]
  DuplicateNodeId(String),

  #[error("edge '{edge_id}' references unknown node: from={from}, to={to}")]
  InvalidEdge {
    edge_id: String,
    from: String,
    to: String,
  },

  #[error("node '{node_id}' input '{input}' references unknown edge: {reference}")]
  DanglingReference {
    node_id: String,
    input: String,
    reference: String,
  },

  #[error("malformed graph: {0}")]
  Malformed(String),

  #[error("node '{node_id}' input '{input}' is not a declared port of node type '{node_type}'")]
  UnknownInputPort {
    node_id: String,
    node_type: String,
    input: String,
  },

  #[error("no entry points found (every node has an incoming edge)")]
  NoEntryPoints,
}
