//! loomflow-config
//!
//! The wire schema for a submitted workflow document: the untrusted JSON or
//! YAML shape a client posts to the engine, before it has been checked
//! against the node registry and locked into a [`loomflow_graph::Graph`].
//!
//! Key differences from `loomflow-graph`:
//! - node/edge collections may be map-keyed or list-with-id; both are
//!   accepted here and normalized to the map form
//! - input bindings are still either literals or unresolved `$ref` strings
//! - nothing here has been cross-checked against a registry

mod document;
mod error;
mod port;

pub use document::{InputBinding, RawEdge, RawNode, WorkflowDocument};
pub use error::ConfigError;
pub use port::{PortType, WidgetHint};
