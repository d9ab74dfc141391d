//! loomflow-scheduler
//!
//! The DAG scheduler: topological analysis, a priority-dispatched worker
//! pool, and the graph executor that ties a [`loomflow_graph::Graph`] and a
//! [`loomflow_registry::NodeRegistry`] together and drives one execution
//! from submission to completion or rollback.

mod error;
mod executor;
mod queue;
mod task;
mod topo;

pub use error::SchedulerError;
pub use executor::{ExecutionOutcome, GraphExecutor};
pub use queue::{ExecutionQueue, QueueEvent, QueueStats, TaskFn, TaskResult};
pub use task::{Task, TaskState};
pub use topo::TopologicalSorter;
