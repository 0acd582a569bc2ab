//! Backup of the mover backup request itself
//!
//! The runtime backs the request up right after the snapshot content that
//! created it. This action blocks until the mover reports completion, then
//! writes the completion data into annotations: the archive drops the status
//! subresource of custom resources, and the restore side needs those values.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{info, warn};

use snapmover_common::config::PluginConfig;
use snapmover_common::kube_utils::{from_item, item_name, item_namespace, to_item, with_annotations};
use snapmover_common::poll::{poll_until, Condition};

use crate::action::{BackupItemAction, BackupItemOutput, ResourceSelector};
use crate::client::MoverClient;
use crate::crd::{Backup, MoverBackup, MoverBackupResult, MoverPhase};
use crate::{Error, Result};

/// Waits for a mover backup request and records its result
pub struct MoverBackupStatusAction {
    client: Arc<dyn MoverClient>,
    config: PluginConfig,
}

impl MoverBackupStatusAction {
    /// Create the action
    pub fn new(client: Arc<dyn MoverClient>, config: PluginConfig) -> Self {
        Self { client, config }
    }

    /// Poll the live request until the mover reports `Completed`.
    ///
    /// A request that reaches a failed phase stops the wait at once; one that
    /// is still running at the deadline is reported as incomplete with the
    /// last phase seen.
    async fn wait_for_completion(&self, namespace: &str, name: &str) -> Result<MoverBackup> {
        let kind = self.config.mover_api.backup_kind();
        let description = format!("{kind} {namespace}/{name}");
        let client = self.client.as_ref();

        let outcome = poll_until(&description, self.config.mover_poll(), || async move {
            let Some(request) = client.get_mover_backup(namespace, name).await? else {
                return Ok(Condition::waiting("request not found"));
            };
            match request.phase() {
                MoverPhase::Completed => Ok(Condition::Done(request)),
                phase if phase.is_failed() => Err(Error::IncompleteMover {
                    name: name.to_string(),
                    phase: phase.to_string(),
                }),
                phase => Ok(Condition::waiting(format!("phase {phase}"))),
            }
        })
        .await;

        match outcome {
            Err(Error::Timeout {
                elapsed,
                last_state,
                ..
            }) => {
                warn!(
                    request = %name,
                    namespace = %namespace,
                    elapsed_secs = elapsed.as_secs(),
                    last_state = %last_state,
                    "mover backup request did not complete in time"
                );
                Err(Error::IncompleteMover {
                    name: name.to_string(),
                    phase: last_state,
                })
            }
            other => other,
        }
    }
}

#[async_trait]
impl BackupItemAction for MoverBackupStatusAction {
    fn name(&self) -> &'static str {
        "snapmover/mover-backup-status"
    }

    fn applies_to(&self) -> ResourceSelector {
        ResourceSelector::resource(self.config.mover_api.backup_resource_selector())
    }

    async fn execute(&self, item: &Value, backup: &Backup) -> Result<BackupItemOutput> {
        // Validate the item shape before waiting on it
        let _: MoverBackup = from_item(item, self.config.mover_api.backup_kind())?;
        let namespace = item_namespace(item);
        let name = item_name(item);
        info!(request = %name, namespace = %namespace, backup = %backup.name(), "waiting for mover backup");

        let completed = self.wait_for_completion(namespace, name).await?;
        let result = MoverBackupResult::resolve(&completed)?;

        let item = record_result(item, &completed, &result)?;
        info!(
            request = %name,
            repository = %result.repository,
            source_claim = %result.source_claim_name,
            "mover backup completed"
        );
        Ok(BackupItemOutput {
            item,
            additional_items: Vec::new(),
        })
    }
}

/// Copy the live status and the completion annotations onto a raw item.
///
/// Works on the raw JSON so fields unknown to this plugin survive.
fn record_result(
    item: &Value,
    completed: &MoverBackup,
    result: &MoverBackupResult,
) -> Result<Value> {
    let mut out = with_annotations(item, &result.to_annotations())?;
    if let (Some(status), Some(obj)) = (&completed.status, out.as_object_mut()) {
        obj.insert("status".to_string(), to_item(status, "mover backup status")?);
    }
    Ok(out)
}
