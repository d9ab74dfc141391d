use std::collections::HashSet;

use loomflow_registry::Outputs;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
  Pending,
  Running,
  Completed,
  Failed,
}

/// The scheduler's internal unit of work: a node plus its dependency set
/// and mutable execution state. Dependents are recorded only as id lists
/// in the queue's forward graph, never as back-pointers, so tasks never
/// form ownership cycles.
#[derive(Debug, Clone)]
pub struct Task {
  pub task_id: String,
  pub node_id: String,
  pub node_type: String,
  pub dependencies: HashSet<String>,
  pub priority: i32,
  pub state: TaskState,
  pub result: Option<Outputs>,
  pub error: Option<String>,
  pub elapsed_ms: Option<u64>,
}

impl Task {
  pub fn new(
    task_id: impl Into<String>,
    node_id: impl Into<String>,
    node_type: impl Into<String>,
    dependencies: HashSet<String>,
    priority: i32,
  ) -> Self {
    Self {
      task_id: task_id.into(),
      node_id: node_id.into(),
      node_type: node_type.into(),
      dependencies,
      priority,
      state: TaskState::Pending,
      result: None,
      error: None,
      elapsed_ms: None,
    }
  }
}
