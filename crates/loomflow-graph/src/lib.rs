//! loomflow-graph
//!
//! The locked, structurally-validated form of a workflow: nodes and edges
//! that are internally consistent (every edge's endpoints exist, every
//! input binding's reference matches a recorded edge). Acyclicity is
//! **not** checked here — that is the topological sorter's job, run once
//! at execution start, per the module's own invariant.

mod edge;
mod error;
mod graph;
mod node;
mod schema;

pub use edge::Edge;
pub use error::GraphError;
pub use graph::Graph;
pub use node::{InputSource, Node};
pub use schema::PortSchemaIndex;
