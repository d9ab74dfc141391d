use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchedulerError {
  #[error("graph contains a cycle, topological sort is not possible")]
  CyclicGraph,

  #[error("node '{node_id}' input '{input}' references an unresolved output: {reference}")]
  UnresolvedReference {
    node_id: String,
    input: String,
    reference: String,
  },

  #[error("node '{node_id}' ({node_type}) failed: {message}")]
  ExecutorFailure {
    node_id: String,
    node_type: String,
    message: String,
  },
}
