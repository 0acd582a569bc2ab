//! Action registry and pipeline stage graph
//!
//! Ordering between actions is not left to the runtime's invocation order.
//! Each action is a stage with declared dependencies on earlier stages, and
//! the order the runtime must process resources in is derived from that
//! graph. A cycle or a dependency on an undeclared stage is a build error of
//! the registry, not something discovered mid-restore.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use snapmover_common::config::PluginConfig;

use crate::action::{BackupItemAction, DeleteItemAction, ResourceSelector, RestoreItemAction};
use crate::backup::{MoverBackupStatusAction, SnapshotContentBackupAction, SNAPSHOT_CONTENT_RESOURCE};
use crate::client::MoverClient;
use crate::delete::SnapshotContentDeleteAction;
use crate::restore::{
    ClaimRestoreAction, MoverRestoreAction, SnapshotContentRestoreAction,
    VolumeSnapshotRestoreAction, CLAIM_RESOURCE, SNAPSHOT_RESOURCE,
};

/// Stage graph errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StageGraphError {
    /// Two stages share a name
    #[error("stage {stage} declared twice")]
    DuplicateStage {
        /// Stage name
        stage: String,
    },

    /// A stage depends on a stage that was never declared
    #[error("stage {stage} depends on unknown stage {dependency}")]
    UnknownDependency {
        /// Stage declaring the dependency
        stage: String,
        /// Missing stage
        dependency: String,
    },

    /// The dependencies form a cycle
    #[error("stage dependency cycle among: {}", stages.join(", "))]
    Cycle {
        /// Stages that could not be ordered
        stages: Vec<String>,
    },
}

/// A pipeline stage: one action and the resource it processes
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Stage {
    /// Stage name
    pub name: String,
    /// Resource the stage's action applies to
    pub resource: String,
    /// Stages that must complete first
    pub depends_on: Vec<String>,
}

/// Declared stages and their dependencies
#[derive(Clone, Debug, Default)]
pub struct StageGraph {
    stages: Vec<Stage>,
}

impl StageGraph {
    /// Create an empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a stage
    pub fn stage(mut self, name: &str, resource: impl Into<String>, depends_on: &[&str]) -> Self {
        self.stages.push(Stage {
            name: name.to_string(),
            resource: resource.into(),
            depends_on: depends_on.iter().map(|d| d.to_string()).collect(),
        });
        self
    }

    /// Stages in declaration order
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Topological order of the stages.
    ///
    /// Among stages that are ready at the same time the one declared first
    /// goes first, so the result is deterministic.
    pub fn order(&self) -> Result<Vec<&Stage>, StageGraphError> {
        let mut index = HashMap::with_capacity(self.stages.len());
        for (i, stage) in self.stages.iter().enumerate() {
            if index.insert(stage.name.as_str(), i).is_some() {
                return Err(StageGraphError::DuplicateStage {
                    stage: stage.name.clone(),
                });
            }
        }

        let mut in_degree = vec![0usize; self.stages.len()];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); self.stages.len()];
        for (i, stage) in self.stages.iter().enumerate() {
            for dep in &stage.depends_on {
                let &d = index
                    .get(dep.as_str())
                    .ok_or_else(|| StageGraphError::UnknownDependency {
                        stage: stage.name.clone(),
                        dependency: dep.clone(),
                    })?;
                in_degree[i] += 1;
                dependents[d].push(i);
            }
        }

        let mut done = vec![false; self.stages.len()];
        let mut ordered = Vec::with_capacity(self.stages.len());
        while let Some(next) = (0..self.stages.len()).find(|&i| !done[i] && in_degree[i] == 0) {
            done[next] = true;
            ordered.push(&self.stages[next]);
            for &dependent in &dependents[next] {
                in_degree[dependent] -= 1;
            }
        }

        if ordered.len() < self.stages.len() {
            return Err(StageGraphError::Cycle {
                stages: self
                    .stages
                    .iter()
                    .zip(&done)
                    .filter(|(_, done)| !**done)
                    .map(|(s, _)| s.name.clone())
                    .collect(),
            });
        }
        Ok(ordered)
    }

    /// Resources in the order the runtime must process them, each once
    pub fn resource_priorities(&self) -> Result<Vec<String>, StageGraphError> {
        let mut resources: Vec<String> = Vec::new();
        for stage in self.order()? {
            if !resources.contains(&stage.resource) {
                resources.push(stage.resource.clone());
            }
        }
        Ok(resources)
    }
}

/// Backup stages: the mover request is backed up after the content that
/// created it, which is where the wait for the mover happens
pub fn backup_stages(config: &PluginConfig) -> StageGraph {
    StageGraph::new()
        .stage("content-backup", SNAPSHOT_CONTENT_RESOURCE, &[])
        .stage(
            "mover-backup-status",
            config.mover_api.backup_resource_selector(),
            &["content-backup"],
        )
}

/// Restore stages: the mover restore completes before snapshots are rebound,
/// and snapshots are rebound before claims point at them
pub fn restore_stages(config: &PluginConfig) -> StageGraph {
    StageGraph::new()
        .stage("mover-restore", config.mover_api.backup_resource_selector(), &[])
        .stage("content-restore", SNAPSHOT_CONTENT_RESOURCE, &[])
        .stage("snapshot-rebind", SNAPSHOT_RESOURCE, &["mover-restore"])
        .stage("claim-rebind", CLAIM_RESOURCE, &["snapshot-rebind"])
}

/// What an action is and which items it runs for
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionDescriptor {
    /// `backup`, `restore` or `delete`
    pub kind: &'static str,
    /// Registered action name
    pub name: &'static str,
    /// Items the action applies to
    pub applies_to: ResourceSelector,
}

/// Every action the plugin serves
pub struct Registry {
    config: PluginConfig,
    backup: Vec<Arc<dyn BackupItemAction>>,
    restore: Vec<Arc<dyn RestoreItemAction>>,
    delete: Vec<Arc<dyn DeleteItemAction>>,
}

impl Registry {
    /// Build all actions over one client
    pub fn new(client: Arc<dyn MoverClient>, config: PluginConfig) -> Self {
        Self {
            backup: vec![
                Arc::new(SnapshotContentBackupAction::new(client.clone(), config.clone())),
                Arc::new(MoverBackupStatusAction::new(client.clone(), config.clone())),
            ],
            restore: vec![
                Arc::new(MoverRestoreAction::new(client.clone(), config.clone())),
                Arc::new(SnapshotContentRestoreAction::new(config.clone())),
                Arc::new(VolumeSnapshotRestoreAction::new(client.clone(), config.clone())),
                Arc::new(ClaimRestoreAction::new(client.clone(), config.clone())),
            ],
            delete: vec![Arc::new(SnapshotContentDeleteAction::new(client))],
            config,
        }
    }

    /// Resource order the runtime must restore in
    pub fn restore_priorities(&self) -> Result<Vec<String>, StageGraphError> {
        restore_stages(&self.config).resource_priorities()
    }

    /// Descriptors of every registered action
    pub fn descriptors(&self) -> Vec<ActionDescriptor> {
        let backup = self.backup.iter().map(|a| ActionDescriptor {
            kind: "backup",
            name: a.name(),
            applies_to: a.applies_to(),
        });
        let restore = self.restore.iter().map(|a| ActionDescriptor {
            kind: "restore",
            name: a.name(),
            applies_to: a.applies_to(),
        });
        let delete = self.delete.iter().map(|a| ActionDescriptor {
            kind: "delete",
            name: a.name(),
            applies_to: a.applies_to(),
        });
        backup.chain(restore).chain(delete).collect()
    }

    /// Backup action for a resource
    pub fn backup_action(&self, resource: &str) -> Option<Arc<dyn BackupItemAction>> {
        self.backup
            .iter()
            .find(|a| a.applies_to().includes(resource))
            .cloned()
    }

    /// Restore action for a resource
    pub fn restore_action(&self, resource: &str) -> Option<Arc<dyn RestoreItemAction>> {
        self.restore
            .iter()
            .find(|a| a.applies_to().includes(resource))
            .cloned()
    }

    /// Delete action for a resource
    pub fn delete_action(&self, resource: &str) -> Option<Arc<dyn DeleteItemAction>> {
        self.delete
            .iter()
            .find(|a| a.applies_to().includes(resource))
            .cloned()
    }
}
