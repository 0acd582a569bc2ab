//! Backup of VolumeSnapshotContent
//!
//! In data-mover mode every snapshot content gets exactly one mover backup
//! request, named after the VolumeSnapshot that owns the content. The request
//! is handed back as an additional item so the runtime backs it up next,
//! which is where the wait for the mover happens.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info};

use snapmover_common::config::PluginConfig;
use snapmover_common::kube_utils::from_item;
use snapmover_common::naming::backup_request_name;

use crate::action::{BackupItemAction, BackupItemOutput, ResourceIdentifier, ResourceSelector};
use crate::client::MoverClient;
use crate::crd::{Backup, MoverBackup, MoverFlavor, VolumeSnapshotContent};
use crate::{Error, Result};

/// Selector for snapshot content items
pub const SNAPSHOT_CONTENT_RESOURCE: &str = "volumesnapshotcontents.snapshot.storage.k8s.io";

/// Creates the mover backup request for a snapshot content
pub struct SnapshotContentBackupAction {
    client: Arc<dyn MoverClient>,
    config: PluginConfig,
}

impl SnapshotContentBackupAction {
    /// Create the action
    pub fn new(client: Arc<dyn MoverClient>, config: PluginConfig) -> Self {
        Self { client, config }
    }
}

#[async_trait]
impl BackupItemAction for SnapshotContentBackupAction {
    fn name(&self) -> &'static str {
        "snapmover/volumesnapshotcontent-backup"
    }

    fn applies_to(&self) -> ResourceSelector {
        ResourceSelector::resource(SNAPSHOT_CONTENT_RESOURCE)
    }

    async fn execute(&self, item: &Value, backup: &Backup) -> Result<BackupItemOutput> {
        let content: VolumeSnapshotContent = from_item(item, "VolumeSnapshotContent")?;
        let content_name = content.metadata.name.clone().unwrap_or_default();
        info!(content = %content_name, backup = %backup.name(), "backing up VolumeSnapshotContent");

        let mut additional_items = Vec::new();
        if let Some((namespace, name)) = content.delete_secret() {
            additional_items.push(ResourceIdentifier::secret(namespace, name));
        }

        if !self.config.data_mover_enabled {
            debug!(content = %content_name, "data mover disabled, no mover request");
            return Ok(BackupItemOutput {
                item: item.clone(),
                additional_items,
            });
        }

        let request = ensure_mover_backup(
            self.client.as_ref(),
            self.config.mover_api,
            &content,
            backup.namespace(),
        )
        .await?;

        additional_items.push(mover_backup_identifier(self.config.mover_api, &request));

        info!(
            content = %content_name,
            additional_items = additional_items.len(),
            "VolumeSnapshotContent backed up"
        );
        Ok(BackupItemOutput {
            item: item.clone(),
            additional_items,
        })
    }
}

/// Identifier of a mover backup request for the runtime
pub fn mover_backup_identifier(flavor: MoverFlavor, request: &MoverBackup) -> ResourceIdentifier {
    ResourceIdentifier {
        group: flavor.group().to_string(),
        resource: flavor.backup_plural().to_string(),
        namespace: request.namespace().to_string(),
        name: request.name().to_string(),
    }
}

/// Find or create the mover backup request for a snapshot content.
///
/// The request name is derived from the owning VolumeSnapshot, so repeated or
/// concurrent invocations for the same content converge on one object. An
/// existing request with that name that moves a different content is a
/// conflict, never silently reused.
pub async fn ensure_mover_backup(
    client: &dyn MoverClient,
    flavor: MoverFlavor,
    content: &VolumeSnapshotContent,
    protected_namespace: &str,
) -> Result<MoverBackup> {
    let content_name = content.metadata.name.as_deref().unwrap_or_default();
    let snapshot_ref = &content.spec.volume_snapshot_ref;
    let resource = format!("VolumeSnapshotContent {content_name}");

    if content_name.is_empty() {
        return Err(Error::validation(resource, "content has no name"));
    }
    let namespace = snapshot_ref
        .namespace
        .as_deref()
        .filter(|ns| !ns.is_empty())
        .ok_or_else(|| Error::validation(&resource, "volumeSnapshotRef has no namespace"))?;
    if snapshot_ref.name.is_empty() {
        return Err(Error::validation(&resource, "volumeSnapshotRef has no name"));
    }

    let name = backup_request_name(flavor, &snapshot_ref.name);

    if let Some(existing) = client.get_mover_backup(namespace, &name).await? {
        debug!(request = %name, namespace = %namespace, "mover backup request already exists");
        return verify_same_content(existing, flavor, content_name);
    }

    let desired = MoverBackup::new(&name, namespace, content_name, protected_namespace);
    match client.create_mover_backup(&desired).await {
        Ok(created) => {
            info!(
                request = %name,
                namespace = %namespace,
                content = %content_name,
                kind = %flavor.backup_kind(),
                "created mover backup request"
            );
            Ok(created)
        }
        Err(e) if e.is_already_exists() => {
            debug!(request = %name, "lost create race, re-reading mover backup request");
            match client.get_mover_backup(namespace, &name).await? {
                Some(existing) => verify_same_content(existing, flavor, content_name),
                None => Err(e),
            }
        }
        Err(e) => Err(e),
    }
}

fn verify_same_content(
    existing: MoverBackup,
    flavor: MoverFlavor,
    content_name: &str,
) -> Result<MoverBackup> {
    if existing.references_content(content_name) {
        return Ok(existing);
    }
    Err(Error::conflict(
        format!(
            "{} {}/{}",
            flavor.backup_kind(),
            existing.namespace(),
            existing.name()
        ),
        format!(
            "moves VolumeSnapshotContent {:?}, expected {}",
            existing.spec.volume_snapshot_content.name, content_name
        ),
    ))
}
