//! Deletion of snapshot content when its backup is deleted

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{info, warn};

use snapmover_common::error::UNKNOWN_CONTEXT;
use snapmover_common::kube_utils::from_item;

use super::has_backup_label;
use crate::action::{DeleteItemAction, ResourceSelector};
use crate::backup::SNAPSHOT_CONTENT_RESOURCE;
use crate::client::MoverClient;
use crate::crd::{Backup, DeletionPolicy, VolumeSnapshotContent};
use crate::Result;

/// Reclaims snapshot content, and the provider snapshot behind it, for a
/// deleted backup
pub struct SnapshotContentDeleteAction {
    client: Arc<dyn MoverClient>,
}

impl SnapshotContentDeleteAction {
    /// Create the action
    pub fn new(client: Arc<dyn MoverClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DeleteItemAction for SnapshotContentDeleteAction {
    fn name(&self) -> &'static str {
        "snapmover/volumesnapshotcontent-delete"
    }

    fn applies_to(&self) -> ResourceSelector {
        ResourceSelector::resource(SNAPSHOT_CONTENT_RESOURCE)
    }

    async fn execute(&self, item: &Value, backup: &Backup) -> Result<()> {
        let content: VolumeSnapshotContent = from_item(item, "VolumeSnapshotContent")?;
        let name = content.metadata.name.as_deref().unwrap_or_default();

        if !has_backup_label(&content.metadata, backup.name()) {
            info!(content = %name, backup = %backup.name(), "content not taken by this backup, leaving it");
            return Ok(());
        }

        // Contents are kept at Retain until here; Delete lets the snapshot
        // controller reclaim the provider snapshot.
        match self
            .client
            .patch_content_deletion_policy(name, DeletionPolicy::Delete)
            .await
        {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                warn!(
                    content = %name,
                    backup = %backup.name(),
                    snapshot_handle = %content.snapshot_handle().unwrap_or(UNKNOWN_CONTEXT),
                    "VolumeSnapshotContent not found, provider snapshot may be orphaned"
                );
                return Ok(());
            }
            Err(e) => return Err(e),
        }

        match self.client.delete_volume_snapshot_content(name).await {
            Err(e) if e.is_not_found() => {
                info!(content = %name, "VolumeSnapshotContent already gone");
                Ok(())
            }
            Err(e) => Err(e),
            Ok(()) => {
                info!(content = %name, backup = %backup.name(), "deleted VolumeSnapshotContent");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MockMoverClient;
    use crate::test_support::{api_error, backup, not_found};
    use crate::Error;
    use mockall::Sequence;
    use serde_json::json;
    use snapmover_common::BACKUP_NAME_LABEL;

    fn content_item(label: Option<&str>) -> Value {
        let mut item = json!({
            "apiVersion": "snapshot.storage.k8s.io/v1",
            "kind": "VolumeSnapshotContent",
            "metadata": {"name": "snapcontent-1"},
            "spec": {
                "volumeSnapshotRef": {"namespace": "app", "name": "snap-db"},
                "deletionPolicy": "Retain",
                "driver": "rbd.csi.ceph.com",
                "source": {"volumeHandle": "vol-1"}
            },
            "status": {"snapshotHandle": "0001-abc"}
        });
        if let Some(label) = label {
            item["metadata"]["labels"] = json!({ BACKUP_NAME_LABEL: label });
        }
        item
    }

    /// Story: deleting backup "nightly" flips its content to Delete and then
    /// removes it, in that order.
    #[tokio::test]
    async fn patches_policy_before_delete() {
        let mut mock = MockMoverClient::new();
        let mut seq = Sequence::new();
        mock.expect_patch_content_deletion_policy()
            .withf(|name, policy| name == "snapcontent-1" && *policy == DeletionPolicy::Delete)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));
        mock.expect_delete_volume_snapshot_content()
            .withf(|name| name == "snapcontent-1")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));

        SnapshotContentDeleteAction::new(Arc::new(mock))
            .execute(&content_item(Some("nightly")), &backup("nightly"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn foreign_content_is_never_touched() {
        for (label, backup_name) in [
            (None, "nightly"),
            (Some("weekly"), "nightly"),
            (Some(""), ""),
            (Some("nightly"), " "),
        ] {
            let mut mock = MockMoverClient::new();
            mock.expect_patch_content_deletion_policy().never();
            mock.expect_delete_volume_snapshot_content().never();

            SnapshotContentDeleteAction::new(Arc::new(mock))
                .execute(&content_item(label), &backup(backup_name))
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn missing_content_on_patch_skips_delete() {
        let mut mock = MockMoverClient::new();
        mock.expect_patch_content_deletion_policy()
            .times(1)
            .returning(|_, _| Err(not_found("VolumeSnapshotContent snapcontent-1")));
        mock.expect_delete_volume_snapshot_content().never();

        SnapshotContentDeleteAction::new(Arc::new(mock))
            .execute(&content_item(Some("nightly")), &backup("nightly"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn missing_content_on_delete_is_success() {
        let mut mock = MockMoverClient::new();
        mock.expect_patch_content_deletion_policy()
            .returning(|_, _| Ok(()));
        mock.expect_delete_volume_snapshot_content()
            .times(1)
            .returning(|_| Err(not_found("VolumeSnapshotContent snapcontent-1")));

        SnapshotContentDeleteAction::new(Arc::new(mock))
            .execute(&content_item(Some("nightly")), &backup("nightly"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn other_patch_errors_surface() {
        let mut mock = MockMoverClient::new();
        mock.expect_patch_content_deletion_policy().returning(|_, _| {
            Err(Error::client(
                "patch",
                "VolumeSnapshotContent snapcontent-1",
                api_error(403, "Forbidden"),
            ))
        });
        mock.expect_delete_volume_snapshot_content().never();

        let err = SnapshotContentDeleteAction::new(Arc::new(mock))
            .execute(&content_item(Some("nightly")), &backup("nightly"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Client { .. }));
    }

    #[tokio::test]
    async fn other_delete_errors_surface() {
        let mut mock = MockMoverClient::new();
        mock.expect_patch_content_deletion_policy()
            .returning(|_, _| Ok(()));
        mock.expect_delete_volume_snapshot_content().returning(|_| {
            Err(Error::client(
                "delete",
                "VolumeSnapshotContent snapcontent-1",
                api_error(500, "InternalError"),
            ))
        });

        let err = SnapshotContentDeleteAction::new(Arc::new(mock))
            .execute(&content_item(Some("nightly")), &backup("nightly"))
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }
}
