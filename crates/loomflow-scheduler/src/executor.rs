use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use loomflow_graph::{Graph, InputSource};
use loomflow_registry::{NodeRegistry, Outputs};
use tokio::sync::{RwLock, mpsc};
use tracing::{error, instrument};

use crate::error::SchedulerError;
use crate::queue::{ExecutionQueue, QueueEvent, TaskFn};
use crate::task::Task;
use crate::topo::TopologicalSorter;

fn task_id_for(node_id: &str) -> String {
  format!("task-{node_id}")
}

/// The outcome of one execution: per-node outputs, keyed by node id.
#[derive(Debug, Clone, Default)]
pub struct ExecutionOutcome {
  pub results: HashMap<String, Outputs>,
}

/// Binds a [`Graph`] and [`NodeRegistry`] to an [`ExecutionQueue`], resolves
/// cross-node references at dispatch time, and orchestrates rollback on
/// failure.
pub struct GraphExecutor {
  registry: NodeRegistry,
  workers: usize,
}

impl GraphExecutor {
  pub fn new(registry: NodeRegistry, workers: usize) -> Self {
    Self { registry, workers }
  }

  /// Run the graph to completion. Conditional-branch and loop-marker node
  /// types are registered and dispatched as ordinary node types (see the
  /// design notes in DESIGN.md for why this repo doesn't give the executor
  /// a separate control-flow dispatch path).
  #[instrument(skip(self, graph))]
  pub async fn execute(
    &self,
    graph: Arc<RwLock<Graph>>,
  ) -> Result<(ExecutionOutcome, mpsc::UnboundedReceiver<QueueEvent>), SchedulerError> {
    let order = {
      let g = graph.read().await;
      TopologicalSorter::kahn_sort(&g)?
    };

    let results: Arc<std::sync::Mutex<HashMap<String, Outputs>>> =
      Arc::new(std::sync::Mutex::new(HashMap::new()));

    let registry = self.registry.clone();
    let graph_for_run = graph.clone();
    let results_for_run = results.clone();
    let run_task: TaskFn = Arc::new(move |task: Task| {
      let registry = registry.clone();
      let graph = graph_for_run.clone();
      let results = results_for_run.clone();
      Box::pin(async move { run_node_task(registry, graph, results, task).await })
    });

    let (queue, events) = ExecutionQueue::new(self.workers, run_task);
    queue.start().await;

    {
      let g = graph.read().await;
      for node_id in &order {
        let node = g.get_node(node_id).expect("node in topo order exists");
        let dependencies: HashSet<String> =
          g.upstream(node_id).into_iter().map(|id| task_id_for(&id)).collect();
        let task = Task::new(
          task_id_for(node_id),
          node_id.clone(),
          node.node_type.clone(),
          dependencies,
          node.priority,
        );
        queue.add_task(task).await;
      }
    }

    queue.wait_until_complete().await;
    let stats = queue.stats().await;
    queue.stop().await;

    if stats.failed > 0 {
      let reversed = queue.completion_order_reversed().await;
      self.rollback(&graph, &results, &reversed).await;

      let mut first_failure = "<unknown>".to_string();
      for node_id in &order {
        if queue.task_state(&task_id_for(node_id)).await == Some(crate::task::TaskState::Failed) {
          first_failure = node_id.clone();
          break;
        }
      }
      let node_type = graph
        .read()
        .await
        .get_node(&first_failure)
        .map(|n| n.node_type.clone())
        .unwrap_or_default();
      return Err(SchedulerError::ExecutorFailure {
        node_id: first_failure,
        node_type,
        message: "one or more nodes failed; see task_fail events for detail".to_string(),
      });
    }

    let results = results.lock().expect("results mutex poisoned").clone();
    Ok((ExecutionOutcome { results }, events))
  }

  /// In reverse completion order, invoke each completed node's rollback
  /// callable (if declared). Rollback failures are logged and do not abort
  /// the cascade; the caller always sees the original failure afterwards.
  async fn rollback(
    &self,
    graph: &Arc<RwLock<Graph>>,
    results: &Arc<std::sync::Mutex<HashMap<String, Outputs>>>,
    completed_node_ids_reversed: &[String],
  ) {
    for node_id in completed_node_ids_reversed {
      let (node_type, resolved_inputs) = {
        let g = graph.read().await;
        let Some(node) = g.get_node(node_id) else { continue };
        let resolved = resolve_inputs(&g, node_id, &results.lock().unwrap());
        (node.node_type.clone(), resolved)
      };
      let Ok(resolved_inputs) = resolved_inputs else {
        continue;
      };
      let Some(executor) = self.registry.executor(&node_type).await else {
        continue;
      };
      if !executor.has_rollback() {
        continue;
      }
      let outputs = results
        .lock()
        .expect("results mutex poisoned")
        .get(node_id)
        .cloned()
        .unwrap_or_default();
      if let Err(e) = executor.rollback(&resolved_inputs, &outputs).await {
        error!(node_id, error = %e, "rollback failed; continuing cascade");
      }
    }
  }
}

fn resolve_inputs(
  graph: &Graph,
  node_id: &str,
  results: &HashMap<String, Outputs>,
) -> Result<HashMap<String, serde_json::Value>, SchedulerError> {
  let node = graph
    .get_node(node_id)
    .expect("node_id originates from this graph");
  let mut resolved = HashMap::with_capacity(node.inputs.len());
  for (input_name, source) in &node.inputs {
    let value = match source {
      InputSource::Literal { value } => value.clone(),
      InputSource::Ref {
        source_node_id,
        source_output,
      } => results
        .get(source_node_id)
        .and_then(|outputs| outputs.get(source_output))
        .cloned()
        .ok_or_else(|| SchedulerError::UnresolvedReference {
          node_id: node_id.to_string(),
          input: input_name.clone(),
          reference: format!("{source_node_id}.outputs.{source_output}"),
        })?,
    };
    resolved.insert(input_name.clone(), value);
  }
  Ok(resolved)
}

async fn run_node_task(
  registry: NodeRegistry,
  graph: Arc<RwLock<Graph>>,
  results: Arc<std::sync::Mutex<HashMap<String, Outputs>>>,
  task: Task,
) -> Result<Outputs, String> {
  let resolved_inputs = {
    let g = graph.read().await;
    let snapshot = results.lock().expect("results mutex poisoned").clone();
    resolve_inputs(&g, &task.node_id, &snapshot).map_err(|e| e.to_string())?
  };

  let Some(executor) = registry.executor(&task.node_type).await else {
    return Err(format!(
      "node type '{}' is not registered (should have been caught by the validator)",
      task.node_type
    ));
  };

  let outputs = executor
    .invoke(resolved_inputs)
    .await
    .map_err(|e| e.to_string())?;

  {
    let mut g = graph.write().await;
    g.record_outputs(&task.node_id, outputs.clone());
  }
  results
    .lock()
    .expect("results mutex poisoned")
    .insert(task.node_id.clone(), outputs.clone());

  Ok(outputs)
}

#[cfg(test)]
mod tests {
  use super::*;

  use async_trait::async_trait;
  use indexmap::IndexMap;
  use loomflow_config::{PortType, WorkflowDocument};
  use loomflow_registry::{
    DisplayMode, ExecutorError, Inputs, InputPortSpec, NodeExecutor, NodeTypeDescriptor, OutputPortSpec, Provenance,
  };
  use std::sync::atomic::{AtomicBool, Ordering};

  fn port(port_type: PortType) -> InputPortSpec {
    InputPortSpec {
      port_type,
      default: None,
      constraints: None,
      widget_hint: None,
      display_mode: DisplayMode::Auto,
      connection_only: true,
    }
  }

  fn descriptor(
    name: &str,
    inputs: impl IntoIterator<Item = (&'static str, PortType)>,
    outputs: impl IntoIterator<Item = (&'static str, PortType)>,
  ) -> NodeTypeDescriptor {
    NodeTypeDescriptor {
      name: name.to_string(),
      category: "test".to_string(),
      description: String::new(),
      inputs: inputs.into_iter().map(|(n, t)| (n.to_string(), port(t))).collect::<IndexMap<_, _>>(),
      outputs: outputs.into_iter().map(|(n, t)| (n.to_string(), OutputPortSpec { port_type: t })).collect::<IndexMap<_, _>>(),
      provenance: Provenance::Builtin,
    }
  }

  /// Emits a fixed numeric constant on its "value" output. Records
  /// whether it was rolled back, for the cascade test.
  struct Literal {
    value: f64,
    rolled_back: Arc<AtomicBool>,
  }

  #[async_trait]
  impl NodeExecutor for Literal {
    async fn invoke(&self, _inputs: Inputs) -> Result<Outputs, ExecutorError> {
      Ok(Outputs::from([("value".to_string(), serde_json::json!(self.value))]))
    }

    fn has_rollback(&self) -> bool {
      true
    }

    async fn rollback(&self, _inputs: &Inputs, _outputs: &Outputs) -> Result<(), ExecutorError> {
      self.rolled_back.store(true, Ordering::SeqCst);
      Ok(())
    }
  }

  struct Incr;

  #[async_trait]
  impl NodeExecutor for Incr {
    async fn invoke(&self, inputs: Inputs) -> Result<Outputs, ExecutorError> {
      let x = inputs.get("x").and_then(|v| v.as_f64()).unwrap_or(0.0);
      Ok(Outputs::from([("y".to_string(), serde_json::json!(x + 1.0))]))
    }
  }

  struct Double;

  #[async_trait]
  impl NodeExecutor for Double {
    async fn invoke(&self, inputs: Inputs) -> Result<Outputs, ExecutorError> {
      let y = inputs.get("y").and_then(|v| v.as_f64()).unwrap_or(0.0);
      Ok(Outputs::from([("out".to_string(), serde_json::json!(y * 2.0))]))
    }
  }

  struct Sum;

  #[async_trait]
  impl NodeExecutor for Sum {
    async fn invoke(&self, inputs: Inputs) -> Result<Outputs, ExecutorError> {
      let a = inputs.get("a").and_then(|v| v.as_f64()).unwrap_or(0.0);
      let b = inputs.get("b").and_then(|v| v.as_f64()).unwrap_or(0.0);
      Ok(Outputs::from([("total".to_string(), serde_json::json!(a + b))]))
    }
  }

  /// Always fails. Used to trigger the rollback/cascade path.
  struct Failing;

  #[async_trait]
  impl NodeExecutor for Failing {
    async fn invoke(&self, _inputs: Inputs) -> Result<Outputs, ExecutorError> {
      Err(ExecutorError::Failed("boom".to_string()))
    }
  }

  /// Records every call it receives; used to assert a node downstream of a
  /// failure was never invoked.
  struct Recording(Arc<std::sync::Mutex<Vec<String>>>);

  #[async_trait]
  impl NodeExecutor for Recording {
    async fn invoke(&self, _inputs: Inputs) -> Result<Outputs, ExecutorError> {
      self.0.lock().unwrap().push("invoked".to_string());
      Ok(Outputs::new())
    }
  }

  fn doc(json: &str) -> WorkflowDocument {
    WorkflowDocument::from_json(json).unwrap()
  }

  #[tokio::test]
  async fn linear_chain_propagates_through_each_transform() {
    let registry = NodeRegistry::new();
    registry
      .register(
        descriptor("literal", [], [("value", PortType::Number)]),
        Arc::new(Literal { value: 7.0, rolled_back: Arc::new(AtomicBool::new(false)) }),
      )
      .await
      .unwrap();
    registry
      .register(descriptor("incr", [("x", PortType::Number)], [("y", PortType::Number)]), Arc::new(Incr))
      .await
      .unwrap();
    registry
      .register(descriptor("double", [("y", PortType::Number)], [("out", PortType::Number)]), Arc::new(Double))
      .await
      .unwrap();

    let d = doc(
      r#"{
        "nodes": {
          "a": {"type": "literal", "inputs": {}},
          "b": {"type": "incr", "inputs": {"x": {"$ref": "a.outputs.value"}}},
          "c": {"type": "double", "inputs": {"y": {"$ref": "b.outputs.y"}}}
        },
        "edges": {
          "e1": {"source": "a", "source_output": "value", "target": "b", "target_input": "x"},
          "e2": {"source": "b", "source_output": "y", "target": "c", "target_input": "y"}
        }
      }"#,
    );
    let graph = Graph::from_document(&d, None).unwrap();

    let executor = GraphExecutor::new(registry, 2);
    let (outcome, _events) = executor.execute(Arc::new(RwLock::new(graph))).await.unwrap();

    assert_eq!(outcome.results["c"]["out"], serde_json::json!(16.0));
  }

  #[tokio::test]
  async fn diamond_join_sees_both_branches() {
    let registry = NodeRegistry::new();
    registry
      .register(
        descriptor("literal", [], [("value", PortType::Number)]),
        Arc::new(Literal { value: 3.0, rolled_back: Arc::new(AtomicBool::new(false)) }),
      )
      .await
      .unwrap();
    registry
      .register(descriptor("incr", [("x", PortType::Number)], [("y", PortType::Number)]), Arc::new(Incr))
      .await
      .unwrap();
    registry
      .register(descriptor("double", [("y", PortType::Number)], [("out", PortType::Number)]), Arc::new(Double))
      .await
      .unwrap();
    registry
      .register(
        descriptor("sum", [("a", PortType::Number), ("b", PortType::Number)], [("total", PortType::Number)]),
        Arc::new(Sum),
      )
      .await
      .unwrap();

    let d = doc(
      r#"{
        "nodes": {
          "a": {"type": "literal", "inputs": {}},
          "b": {"type": "incr", "inputs": {"x": {"$ref": "a.outputs.value"}}},
          "c": {"type": "double", "inputs": {"y": {"$ref": "a.outputs.value"}}},
          "d": {"type": "sum", "inputs": {"a": {"$ref": "b.outputs.y"}, "b": {"$ref": "c.outputs.out"}}}
        },
        "edges": {
          "e1": {"source": "a", "source_output": "value", "target": "b", "target_input": "x"},
          "e2": {"source": "a", "source_output": "value", "target": "c", "target_input": "y"},
          "e3": {"source": "b", "source_output": "y", "target": "d", "target_input": "a"},
          "e4": {"source": "c", "source_output": "out", "target": "d", "target_input": "b"}
        }
      }"#,
    );
    let graph = Graph::from_document(&d, None).unwrap();

    let executor = GraphExecutor::new(registry, 4);
    let (outcome, _events) = executor.execute(Arc::new(RwLock::new(graph))).await.unwrap();

    // b = a+1 = 4, c = a*2 = 6, d = b+c = 10. Only reachable if the join
    // waited for both upstream branches before dispatching.
    assert_eq!(outcome.results["d"]["total"], serde_json::json!(10.0));
  }

  #[tokio::test]
  async fn failure_rolls_back_and_skips_downstream() {
    let registry = NodeRegistry::new();
    let rolled_back = Arc::new(AtomicBool::new(false));
    registry
      .register(
        descriptor("literal", [], [("value", PortType::Number)]),
        Arc::new(Literal { value: 1.0, rolled_back: rolled_back.clone() }),
      )
      .await
      .unwrap();
    registry
      .register(descriptor("failing", [("x", PortType::Number)], [("y", PortType::Number)]), Arc::new(Failing))
      .await
      .unwrap();

    let downstream_calls = Arc::new(std::sync::Mutex::new(Vec::new()));
    registry
      .register(
        descriptor("recording", [("x", PortType::Number)], [("y", PortType::Number)]),
        Arc::new(Recording(downstream_calls.clone())),
      )
      .await
      .unwrap();

    let d = doc(
      r#"{
        "nodes": {
          "a": {"type": "literal", "inputs": {}},
          "b": {"type": "failing", "inputs": {"x": {"$ref": "a.outputs.value"}}},
          "c": {"type": "recording", "inputs": {"x": {"$ref": "b.outputs.y"}}},
          "d": {"type": "recording", "inputs": {"x": {"$ref": "c.outputs.y"}}}
        },
        "edges": {
          "e1": {"source": "a", "source_output": "value", "target": "b", "target_input": "x"},
          "e2": {"source": "b", "source_output": "y", "target": "c", "target_input": "x"},
          "e3": {"source": "c", "source_output": "y", "target": "d", "target_input": "x"}
        }
      }"#,
    );
    let graph = Graph::from_document(&d, None).unwrap();

    let executor = GraphExecutor::new(registry, 1);
    let err = executor.execute(Arc::new(RwLock::new(graph))).await.unwrap_err();

    match err {
      SchedulerError::ExecutorFailure { node_id, .. } => assert_eq!(node_id, "b"),
      other => panic!("expected ExecutorFailure, got {other:?}"),
    }
    assert!(downstream_calls.lock().unwrap().is_empty());
    assert!(rolled_back.load(Ordering::SeqCst));
  }
}
