use std::collections::{HashMap, HashSet};

/// A snapshot of each registered node type's declared input port names.
///
/// The registry owns the actual schemas (this crate deliberately does not
/// depend on it, to keep the dependency edge one-directional); the caller
/// builds one of these from the registry's catalog and passes it into
/// [`crate::Graph::from_document`] so parsing can reject an input binding
/// that names a port absent from its node type's schema.
#[derive(Debug, Clone, Default)]
pub struct PortSchemaIndex {
  input_ports: HashMap<String, HashSet<String>>,
}

impl PortSchemaIndex {
  pub fn new(input_ports: HashMap<String, HashSet<String>>) -> Self {
    Self { input_ports }
  }

  /// `true` when `node_type` isn't in this index (an unregistered type is
  /// the validator's concern, not parsing's) or when it is and declares
  /// `port` among its inputs.
  pub fn has_input_port(&self, node_type: &str, port: &str) -> bool {
    self
      .input_ports
      .get(node_type)
      .map(|ports| ports.contains(port))
      .unwrap_or(true)
  }
}
