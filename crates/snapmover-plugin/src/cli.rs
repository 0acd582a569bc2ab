//! Command-line harness
//!
//! Runs a single action against the live cluster with the item and the
//! Velero Backup or Restore read from JSON files, and prints the action's
//! output as JSON. Also lists the registered actions and the derived
//! restore order.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::info;

use snapmover_common::config::{ClientSettings, PluginConfig};
use snapmover_common::kube_utils::create_client;
use snapmover_common::telemetry::TelemetryError;

use crate::client::MoverClientImpl;
use crate::crd::{Backup, Restore};
use crate::registry::{backup_stages, restore_stages, Registry, StageGraphError};

/// CLI errors
#[derive(Debug, Error)]
pub enum CliError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON in {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to write output: {0}")]
    Output(#[from] serde_json::Error),

    #[error("no {kind} action applies to {resource}")]
    NoAction { kind: &'static str, resource: String },

    #[error(transparent)]
    Plugin(#[from] crate::Error),

    #[error(transparent)]
    Stages(#[from] StageGraphError),

    #[error(transparent)]
    Telemetry(#[from] TelemetryError),
}

/// Log output format
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// JSON lines
    #[default]
    Json,
    /// Compact human-readable lines
    Text,
}

/// Velero item actions for CSI snapshot data movers
#[derive(Parser, Debug)]
#[command(name = "snapmover")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Log output format
    #[arg(long, env = "SNAPMOVER_LOG_FORMAT", value_enum, default_value_t = LogFormat::Json, global = true)]
    pub log_format: LogFormat,

    #[command(flatten)]
    pub plugin: PluginConfig,

    #[command(flatten)]
    pub client: ClientSettings,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List registered actions and the resources they apply to
    Actions,
    /// Print the resource order derived from the stage graph
    Priorities(PrioritiesArgs),
    /// Run the backup action for one item
    BackupItem(BackupItemArgs),
    /// Run the restore action for one item
    RestoreItem(RestoreItemArgs),
    /// Run the delete action for one item
    DeleteItem(BackupItemArgs),
}

#[derive(Args, Debug)]
pub struct PrioritiesArgs {
    /// Print the backup stage order instead of the restore order
    #[arg(long)]
    pub backup: bool,
}

#[derive(Args, Debug)]
pub struct BackupItemArgs {
    /// `resource.group` of the item, e.g. volumesnapshotcontents.snapshot.storage.k8s.io
    #[arg(long)]
    pub resource: String,
    /// Item JSON file
    #[arg(long)]
    pub item: PathBuf,
    /// Velero Backup JSON file
    #[arg(long)]
    pub backup: PathBuf,
}

#[derive(Args, Debug)]
pub struct RestoreItemArgs {
    /// `resource.group` of the item
    #[arg(long)]
    pub resource: String,
    /// Item JSON file
    #[arg(long)]
    pub item: PathBuf,
    /// Velero Restore JSON file
    #[arg(long)]
    pub restore: PathBuf,
}

impl Cli {
    /// Run the selected command
    pub async fn run(self) -> Result<(), CliError> {
        match self.command {
            Commands::Actions => {
                let registry = self.registry().await?;
                print_json(&registry.descriptors())
            }
            Commands::Priorities(ref args) => {
                let graph = if args.backup {
                    backup_stages(&self.plugin)
                } else {
                    restore_stages(&self.plugin)
                };
                print_json(&graph.resource_priorities()?)
            }
            Commands::BackupItem(ref args) => {
                let item: Value = read_json(&args.item)?;
                let backup: Backup = read_json(&args.backup)?;
                let action = self
                    .registry()
                    .await?
                    .backup_action(&args.resource)
                    .ok_or_else(|| no_action("backup", &args.resource))?;
                info!(action = action.name(), backup = %backup.name(), "running backup item action");
                print_json(&action.execute(&item, &backup).await?)
            }
            Commands::RestoreItem(ref args) => {
                let item: Value = read_json(&args.item)?;
                let restore: Restore = read_json(&args.restore)?;
                let action = self
                    .registry()
                    .await?
                    .restore_action(&args.resource)
                    .ok_or_else(|| no_action("restore", &args.resource))?;
                info!(action = action.name(), restore = %restore.name(), "running restore item action");
                print_json(&action.execute(&item, &restore).await?)
            }
            Commands::DeleteItem(ref args) => {
                let item: Value = read_json(&args.item)?;
                let backup: Backup = read_json(&args.backup)?;
                let action = self
                    .registry()
                    .await?
                    .delete_action(&args.resource)
                    .ok_or_else(|| no_action("delete", &args.resource))?;
                info!(action = action.name(), backup = %backup.name(), "running delete item action");
                action.execute(&item, &backup).await?;
                print_json(&serde_json::json!({"deleted": true}))
            }
        }
    }

    async fn registry(&self) -> Result<Registry, CliError> {
        let client = create_client(&self.client).await?;
        let movers = MoverClientImpl::new(client, self.plugin.mover_api);
        Ok(Registry::new(Arc::new(movers), self.plugin.clone()))
    }
}

fn no_action(kind: &'static str, resource: &str) -> CliError {
    CliError::NoAction {
        kind,
        resource: resource.to_string(),
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, CliError> {
    let raw = std::fs::read_to_string(path).map_err(|source| CliError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| CliError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn print_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
