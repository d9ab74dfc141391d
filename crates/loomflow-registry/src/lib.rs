//! loomflow-registry
//!
//! The authoritative catalog of executable node types: their typed
//! input/output schemas, their executor handles, and the validator that
//! cross-references a workflow against what's installed.

mod descriptor;
mod error;
mod executor;
mod registry;

pub use descriptor::{
  DisplayMode, InputPortSpec, NodeTypeDescriptor, OutputPortSpec, Provenance, RenderAs,
};
pub use error::RegistryError;
pub use executor::{ExecutorError, Inputs, NodeExecutor, Outputs};
pub use registry::{NodeRegistry, PortMismatch, ValidationReport};
