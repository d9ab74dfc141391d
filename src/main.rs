mod builtins;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::RwLock;

use loomflow_config::WorkflowDocument;
use loomflow_graph::Graph;
use loomflow_plugin::PluginManager;
use loomflow_registry::NodeRegistry;
use loomflow_scheduler::GraphExecutor;

/// loomflow - a DAG workflow execution engine
#[derive(Parser)]
#[command(name = "loomflow")]
#[command(version, about, long_about = None)]
struct Cli {
  /// Path to the data directory (default: ~/.loomflow)
  #[arg(long, global = true)]
  data_dir: Option<PathBuf>,

  /// Explicit proxy for the plugin index fetch (overrides HTTP_PROXY/HTTPS_PROXY)
  #[arg(long, global = true)]
  proxy: Option<String>,

  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
  /// Validate a workflow document against the registry without running it
  Validate { workflow_file: PathBuf },

  /// Submit a workflow document for execution
  Submit {
    workflow_file: PathBuf,
    #[arg(long, default_value_t = 4)]
    workers: usize,
  },

  /// Plugin discovery, remote index lookup, and install
  Plugin {
    #[command(subcommand)]
    action: PluginAction,
  },
}

#[derive(Subcommand)]
enum PluginAction {
  /// List node types available from the remote plugin index
  ListAvailable {
    #[arg(long)]
    refresh: bool,
  },
  /// Find which git repository provides a node type
  FindByNode { node_type: String },
  /// Install a plugin by git url
  Install { git_url: String },
  /// Remove an installed plugin
  Uninstall { plugin_id: String },
  /// Deactivate, unregister, and re-discover a plugin from its directory
  Reload { plugin_id: String },
  /// Resolve and install plugins covering a set of missing node types
  InstallMissing { node_types: Vec<String> },
  /// Add a custom index repository
  AddRepository { url: String },
  /// Disable a repository (built-in, custom, or secondary)
  DisableRepository { url: String },
  /// Re-enable a previously disabled repository
  EnableRepository { url: String },
  /// Whether a restart is needed to pick up node-type changes
  RestartRequired,
}

const DEFAULT_PLUGIN_INDEX_URL: &str = "https://raw.githubusercontent.com/loomflow/plugin-index/main/extension-node-map.json";

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();
  let cli = Cli::parse();

  let data_dir = cli.data_dir.unwrap_or_else(|| {
    dirs::home_dir().expect("could not determine home directory").join(".loomflow")
  });

  let proxy = cli.proxy;
  let rt = tokio::runtime::Runtime::new()?;
  match cli.command {
    Some(Commands::Validate { workflow_file }) => rt.block_on(validate(workflow_file, data_dir, proxy)),
    Some(Commands::Submit { workflow_file, workers }) => rt.block_on(submit(workflow_file, workers, data_dir, proxy)),
    Some(Commands::Plugin { action }) => rt.block_on(plugin_command(action, data_dir, proxy)),
    None => {
      println!("loomflow - use --help to see available commands");
      Ok(())
    }
  }
}

async fn load_graph(workflow_file: &PathBuf, registry: &NodeRegistry) -> Result<Graph> {
  let content = tokio::fs::read_to_string(workflow_file)
    .await
    .with_context(|| format!("failed to read workflow file: {}", workflow_file.display()))?;

  let doc = if workflow_file.extension().is_some_and(|ext| ext == "yaml" || ext == "yml") {
    WorkflowDocument::from_yaml(&content)
  } else {
    WorkflowDocument::from_json(&content)
  }
  .with_context(|| format!("failed to parse workflow file: {}", workflow_file.display()))?;

  let schema = registry.port_schema_index().await;
  Graph::from_document(&doc, Some(&schema)).context("workflow failed structural validation")
}

async fn builtin_registry() -> Result<NodeRegistry> {
  let registry = NodeRegistry::new();
  builtins::register_builtins(&registry).await.context("failed to register builtin node types")?;
  Ok(registry)
}

async fn plugin_manager_for(data_dir: &std::path::Path, proxy: Option<String>) -> PluginManager {
  PluginManager::new(
    data_dir.join("plugins"),
    DEFAULT_PLUGIN_INDEX_URL,
    data_dir.join("config").join("repositories.json"),
    proxy,
  )
  .await
}

async fn validate(workflow_file: PathBuf, data_dir: PathBuf, proxy: Option<String>) -> Result<()> {
  let registry = builtin_registry().await?;
  let graph = load_graph(&workflow_file, &registry).await?;

  let plugins = plugin_manager_for(&data_dir, proxy).await;
  plugins.discover().await.context("plugin discovery failed")?;

  let report = registry.validate_workflow(&graph).await;
  if report.is_valid() {
    println!("workflow is valid: {} node types all registered", graph.node_count());
    return Ok(());
  }

  if !report.missing_node_types.is_empty() {
    eprintln!("{} node type(s) are not registered:", report.missing_node_types.len());
    for node_type in &report.missing_node_types {
      match plugins.find_by_node(node_type).await {
        Some(git_url) => eprintln!("  - {node_type} (available from {git_url})"),
        None => eprintln!("  - {node_type} (no known plugin provides this)"),
      }
    }
  }
  for mismatch in &report.port_mismatches {
    eprintln!(
      "  - edge '{}' connects incompatible port types: {:?} -> {:?}",
      mismatch.edge_id, mismatch.source_type, mismatch.target_type
    );
  }
  std::process::exit(1);
}

async fn submit(workflow_file: PathBuf, workers: usize, data_dir: PathBuf, proxy: Option<String>) -> Result<()> {
  let registry = builtin_registry().await?;
  let graph = load_graph(&workflow_file, &registry).await?;

  let plugins = plugin_manager_for(&data_dir, proxy).await;
  plugins.discover().await.context("plugin discovery failed")?;

  let report = registry.validate_workflow(&graph).await;
  if !report.is_valid() {
    anyhow::bail!(
      "workflow failed validation: {} missing node type(s), {} incompatible edge(s)",
      report.missing_node_types.len(),
      report.port_mismatches.len()
    );
  }

  eprintln!("executing {} node(s) with {workers} worker(s)", graph.node_count());
  let executor = GraphExecutor::new(registry, workers);
  let (outcome, mut events) = executor.execute(Arc::new(RwLock::new(graph))).await.context("workflow execution failed")?;

  // Drain progress events without blocking completion; this CLI only
  // reports the final result, a server front-end would fan these out.
  while events.try_recv().is_ok() {}

  println!("{}", serde_json::to_string_pretty(&outcome.results)?);
  Ok(())
}

async fn plugin_command(action: PluginAction, data_dir: PathBuf, proxy: Option<String>) -> Result<()> {
  let plugins = plugin_manager_for(&data_dir, proxy).await;
  plugins.discover().await.context("plugin discovery failed")?;

  match action {
    PluginAction::ListAvailable { refresh } => {
      plugins.refresh_index(refresh).await.context("failed to refresh plugin index")?;

      let registry = builtin_registry().await?;
      let builtins: Vec<String> = registry.list().await.into_iter().map(|d| d.name).collect();
      if !builtins.is_empty() {
        println!("builtin: {}", builtins.join(", "));
      }

      let available = plugins.available().await;
      for (git_url, node_types) in &available {
        println!("{git_url}: {}", node_types.join(", "));
      }
    }
    PluginAction::FindByNode { node_type } => {
      plugins.refresh_index(false).await.context("failed to refresh plugin index")?;
      match plugins.find_by_node(&node_type).await {
        Some(git_url) => println!("{git_url}"),
        None => anyhow::bail!("no plugin known to provide node type '{node_type}'"),
      }
    }
    PluginAction::Install { git_url } => {
      let id = plugins.install(&git_url).await.context("plugin install failed")?;
      println!("installed: {id}");
    }
    PluginAction::Uninstall { plugin_id } => {
      plugins.uninstall(&plugin_id).await.context("plugin uninstall failed")?;
      println!("uninstalled: {plugin_id}");
    }
    PluginAction::Reload { plugin_id } => {
      let id = plugins.reload(&plugin_id).await.context("plugin reload failed")?;
      println!("reloaded: {id}");
    }
    PluginAction::InstallMissing { node_types } => {
      plugins.refresh_index(false).await.context("failed to refresh plugin index")?;
      let report = plugins.install_missing_nodes(&node_types).await;
      println!("{}", serde_json::to_string_pretty(&serde_json::json!({
        "installed": report.installed,
        "unresolved": report.unresolved,
        "failed": report.failed,
      }))?);
    }
    PluginAction::AddRepository { url } => {
      plugins.add_custom_repository(url.clone()).await.context("failed to add repository")?;
      println!("added custom repository: {url}");
    }
    PluginAction::DisableRepository { url } => {
      plugins.disable_repository(url.clone()).await.context("failed to disable repository")?;
      println!("disabled repository: {url}");
    }
    PluginAction::EnableRepository { url } => {
      plugins.enable_repository(&url).await.context("failed to enable repository")?;
      println!("enabled repository: {url}");
    }
    PluginAction::RestartRequired => {
      println!("{}", plugins.restart_required());
    }
  }
  Ok(())
}
