use std::collections::{BinaryHeap, HashMap};

use loomflow_graph::Graph;

use crate::error::SchedulerError;

/// Deterministic tie-break key: priority ascending, then node id ascending.
fn sort_key(graph: &Graph, node_id: &str) -> (i32, String) {
  let priority = graph.get_node(node_id).map(|n| n.priority).unwrap_or(50);
  (priority, node_id.to_string())
}

pub struct TopologicalSorter;

impl TopologicalSorter {
  /// Kahn's algorithm: repeatedly emit nodes with zero remaining
  /// in-degree. Ties among ready nodes are broken deterministically so
  /// identical inputs always produce the same order.
  pub fn kahn_sort(graph: &Graph) -> Result<Vec<String>, SchedulerError> {
    let mut in_degree: HashMap<String, usize> = graph
      .nodes()
      .map(|n| (n.id.clone(), graph.upstream(&n.id).len()))
      .collect();

    let mut ready: BinaryHeap<std::cmp::Reverse<(i32, String)>> = in_degree
      .iter()
      .filter(|(_, deg)| **deg == 0)
      .map(|(id, _)| std::cmp::Reverse(sort_key(graph, id)))
      .collect();

    let mut order = Vec::with_capacity(in_degree.len());
    while let Some(std::cmp::Reverse((_, node_id))) = ready.pop() {
      order.push(node_id.clone());
      for dep_id in graph.downstream(&node_id) {
        if let Some(deg) = in_degree.get_mut(&dep_id) {
          *deg -= 1;
          if *deg == 0 {
            ready.push(std::cmp::Reverse(sort_key(graph, &dep_id)));
          }
        }
      }
    }

    if order.len() != graph.node_count() {
      return Err(SchedulerError::CyclicGraph);
    }
    Ok(order)
  }

  /// DFS post-order reversed, with 3-color cycle detection. Children are
  /// visited in the same deterministic order as [`Self::kahn_sort`] so
  /// both algorithms agree on acyclic graphs.
  pub fn dfs_sort(graph: &Graph) -> Result<Vec<String>, SchedulerError> {
    #[derive(Clone, Copy, PartialEq)]
    enum Color {
      White,
      Gray,
      Black,
    }

    let mut color: HashMap<String, Color> =
      graph.nodes().map(|n| (n.id.clone(), Color::White)).collect();
    let mut order = Vec::with_capacity(color.len());

    let mut start_ids: Vec<String> = graph.nodes().map(|n| n.id.clone()).collect();
    start_ids.sort_by_key(|id| sort_key(graph, id));

    fn visit(
      graph: &Graph,
      node_id: &str,
      color: &mut HashMap<String, Color>,
      order: &mut Vec<String>,
    ) -> Result<(), SchedulerError> {
      color.insert(node_id.to_string(), Color::Gray);

      let mut children = graph.downstream(node_id);
      children.sort_by_key(|id| sort_key(graph, id));
      for child in children {
        match color.get(&child) {
          Some(Color::Gray) => return Err(SchedulerError::CyclicGraph),
          Some(Color::White) | None => visit(graph, &child, color, order)?,
          Some(Color::Black) => {}
        }
      }

      color.insert(node_id.to_string(), Color::Black);
      order.push(node_id.to_string());
      Ok(())
    }

    for node_id in &start_ids {
      if color.get(node_id) == Some(&Color::White) {
        visit(graph, node_id, &mut color, &mut order)?;
      }
    }

    order.reverse();
    Ok(order)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use loomflow_config::WorkflowDocument;

  fn graph(json: &str) -> Graph {
    Graph::from_document(&WorkflowDocument::from_json(json).unwrap(), None).unwrap()
  }

  #[test]
  fn linear_chain_orders_a_b_c() {
    let g = graph(
      r#"{
        "nodes": {
          "a": {"type": "t", "inputs": {}},
          "b": {"type": "t", "inputs": {"x": {"$ref": "a.outputs.v"}}},
          "c": {"type": "t", "inputs": {"y": {"$ref": "b.outputs.v"}}}
        },
        "edges": {
          "e1": {"source": "a", "source_output": "v", "target": "b", "target_input": "x"},
          "e2": {"source": "b", "source_output": "v", "target": "c", "target_input": "y"}
        }
      }"#,
    );
    let order = TopologicalSorter::kahn_sort(&g).unwrap();
    assert_eq!(order, vec!["a", "b", "c"]);
    assert_eq!(order, TopologicalSorter::dfs_sort(&g).unwrap());
  }

  #[test]
  fn two_cycle_is_detected() {
    let g = graph(
      r#"{
        "nodes": {
          "a": {"type": "t", "inputs": {"x": {"$ref": "b.outputs.v"}}},
          "b": {"type": "t", "inputs": {"x": {"$ref": "a.outputs.v"}}}
        },
        "edges": {
          "e1": {"source": "a", "source_output": "v", "target": "b", "target_input": "x"},
          "e2": {"source": "b", "source_output": "v", "target": "a", "target_input": "x"}
        }
      }"#,
    );
    assert!(matches!(
      TopologicalSorter::kahn_sort(&g),
      Err(SchedulerError::CyclicGraph)
    ));
    assert!(matches!(
      TopologicalSorter::dfs_sort(&g),
      Err(SchedulerError::CyclicGraph)
    ));
  }

  #[test]
  fn empty_graph_sorts_to_empty_order() {
    let g = graph(r#"{"nodes": {}, "edges": {}}"#);
    assert!(TopologicalSorter::kahn_sort(&g).unwrap().is_empty());
  }
}
