//! Restore of backed-up VolumeSnapshotContent
//!
//! In data-mover mode the archived content points at a provider snapshot the
//! mover has already copied away, so it is never restored; the snapshot
//! rebind creates a fresh static content instead.

use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

use snapmover_common::config::PluginConfig;
use snapmover_common::kube_utils::from_item;

use crate::action::{ResourceIdentifier, ResourceSelector, RestoreItemAction, RestoreItemOutput};
use crate::backup::SNAPSHOT_CONTENT_RESOURCE;
use crate::crd::{Restore, VolumeSnapshotContent};
use crate::Result;

/// Restores snapshot content as-is, or skips it when the mover owns the data
pub struct SnapshotContentRestoreAction {
    config: PluginConfig,
}

impl SnapshotContentRestoreAction {
    /// Create the action
    pub fn new(config: PluginConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl RestoreItemAction for SnapshotContentRestoreAction {
    fn name(&self) -> &'static str {
        "snapmover/volumesnapshotcontent-restore"
    }

    fn applies_to(&self) -> ResourceSelector {
        ResourceSelector::resource(SNAPSHOT_CONTENT_RESOURCE)
    }

    async fn execute(&self, item: &Value, restore: &Restore) -> Result<RestoreItemOutput> {
        if self.config.data_mover_enabled {
            info!(restore = %restore.name(), "data mover enabled, skipping VolumeSnapshotContent");
            return Ok(RestoreItemOutput::skip());
        }
        if !restore.restores_volumes() {
            info!(
                restore = %restore.name(),
                namespace = %restore.namespace(),
                "restore excludes volumes, skipping VolumeSnapshotContent"
            );
            return Ok(RestoreItemOutput::skip());
        }

        let content: VolumeSnapshotContent = from_item(item, "VolumeSnapshotContent")?;
        let additional_items: Vec<_> = content
            .delete_secret()
            .map(|(namespace, name)| ResourceIdentifier::secret(namespace, name))
            .into_iter()
            .collect();

        info!(
            content = %content.metadata.name.as_deref().unwrap_or_default(),
            additional_items = additional_items.len(),
            "restoring VolumeSnapshotContent unchanged"
        );
        Ok(RestoreItemOutput {
            updated_item: Some(item.clone()),
            additional_items,
            skip_restore: false,
        })
    }
}
