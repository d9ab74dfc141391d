//! loomflow-plugin
//!
//! Filesystem discovery and remote-index-backed git install for plugins,
//! built on `loomflow_module::ModuleManager`. A plugin is registered as an
//! ordinary [`loomflow_module::Module`]; this crate only adds where the
//! module came from (`plugin.json` on disk) and how a missing one gets
//! fetched (the community extension index, then `git clone`).

mod error;
mod index;
mod manager;
mod manifest;
mod plugin_module;

pub use error::PluginError;
pub use manager::{PluginManager, RemediationReport};
pub use manifest::PluginManifest;
pub use plugin_module::FilesystemPluginModule;
