//! Restore of a mover backup request
//!
//! The backed-up request is never recreated. Its recorded completion data
//! becomes a mover restore request, and the action blocks until the mover's
//! replication destination reports that the manual sync it triggered is done.
//! Later restore stages find the restored data through that destination.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info};

use snapmover_common::config::PluginConfig;
use snapmover_common::kube_utils::from_item;
use snapmover_common::naming::{replication_destination_name, restore_request_name};
use snapmover_common::poll::{poll_until, Condition};

use crate::action::{ResourceSelector, RestoreItemAction, RestoreItemOutput};
use crate::client::MoverClient;
use crate::crd::{MoverBackup, MoverBackupResult, MoverFlavor, MoverRestore, Restore};
use crate::{Error, Result};

/// Turns a backed-up mover backup request into a completed mover restore
pub struct MoverRestoreAction {
    client: Arc<dyn MoverClient>,
    config: PluginConfig,
}

impl MoverRestoreAction {
    /// Create the action
    pub fn new(client: Arc<dyn MoverClient>, config: PluginConfig) -> Self {
        Self { client, config }
    }

    /// Poll until the request is visible and its replication destination
    /// finished the sync round the request triggered
    async fn wait_for_sync(&self, namespace: &str, name: &str, protected: &str) -> Result<()> {
        let kind = self.config.mover_api.restore_kind();
        let description = format!("{kind} {namespace}/{name}");
        let rd_name = replication_destination_name(name);
        let client = self.client.as_ref();
        let rd_name = rd_name.as_str();

        poll_until(&description, self.config.mover_poll(), || async move {
            if client.get_mover_restore(namespace, name).await?.is_none() {
                return Ok(Condition::waiting("restore request not visible yet"));
            }
            let Some(rd) = client.get_replication_destination(protected, rd_name).await? else {
                return Ok(Condition::waiting(format!(
                    "ReplicationDestination {protected}/{rd_name} not created yet"
                )));
            };
            if rd.is_sync_complete() {
                return Ok(Condition::Done(()));
            }
            let last_sync = rd
                .status
                .as_ref()
                .and_then(|s| s.last_sync_time.clone())
                .unwrap_or_else(|| "never".to_string());
            Ok(Condition::waiting(format!(
                "ReplicationDestination {protected}/{rd_name} sync pending (last sync: {last_sync})"
            )))
        })
        .await
    }
}

#[async_trait]
impl RestoreItemAction for MoverRestoreAction {
    fn name(&self) -> &'static str {
        "snapmover/mover-restore"
    }

    fn applies_to(&self) -> ResourceSelector {
        ResourceSelector::resource(self.config.mover_api.backup_resource_selector())
    }

    async fn execute(&self, item: &Value, restore: &Restore) -> Result<RestoreItemOutput> {
        let backed_up: MoverBackup = from_item(item, self.config.mover_api.backup_kind())?;

        // Resolve everything before creating anything, so a request is never
        // created with a missing repository
        let result = MoverBackupResult::resolve(&backed_up)?;
        let namespace = restore.map_namespace(backed_up.namespace()).to_string();
        let protected = match backed_up.spec.protected_namespace.as_str() {
            "" => restore.namespace().to_string(),
            ns => ns.to_string(),
        };
        let name = restore_request_name(self.config.mover_api, &result.source_claim_name);

        let desired = MoverRestore::new(
            &name,
            &namespace,
            &result,
            &self.config.restic_secret_name,
            &protected,
        );
        ensure_mover_restore(self.client.as_ref(), self.config.mover_api, &desired).await?;

        info!(
            request = %name,
            namespace = %namespace,
            protected_namespace = %protected,
            "waiting for mover restore sync"
        );
        self.wait_for_sync(&namespace, &name, &protected).await?;
        info!(request = %name, namespace = %namespace, restore = %restore.name(), "mover restore synced");

        Ok(RestoreItemOutput::skip())
    }
}

/// Find or create a mover restore request.
///
/// An existing request with the same name is accepted only if it restores
/// the same backup data.
pub async fn ensure_mover_restore(
    client: &dyn MoverClient,
    flavor: MoverFlavor,
    desired: &MoverRestore,
) -> Result<MoverRestore> {
    let namespace = desired.metadata.namespace.as_deref().unwrap_or_default();
    let name = desired.name();

    if let Some(existing) = client.get_mover_restore(namespace, name).await? {
        debug!(request = %name, namespace = %namespace, "mover restore request already exists");
        return verify_same_data(existing, desired, flavor);
    }

    match client.create_mover_restore(desired).await {
        Ok(created) => {
            info!(request = %name, namespace = %namespace, kind = %flavor.restore_kind(), "created mover restore request");
            Ok(created)
        }
        Err(e) if e.is_already_exists() => {
            debug!(request = %name, "lost create race, re-reading mover restore request");
            match client.get_mover_restore(namespace, name).await? {
                Some(existing) => verify_same_data(existing, desired, flavor),
                None => Err(e),
            }
        }
        Err(e) => Err(e),
    }
}

fn verify_same_data(
    existing: MoverRestore,
    desired: &MoverRestore,
    flavor: MoverFlavor,
) -> Result<MoverRestore> {
    if existing.restores_same_data(desired) {
        return Ok(existing);
    }
    Err(Error::conflict(
        format!(
            "{} {}/{}",
            flavor.restore_kind(),
            existing.metadata.namespace.as_deref().unwrap_or_default(),
            existing.name()
        ),
        format!(
            "restores repository {:?}, expected {:?}",
            existing.spec.backup_ref.repository, desired.spec.backup_ref.repository
        ),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::client::MockMoverClient;
    use crate::crd::{
        ReplicationDestination, ReplicationDestinationSpec, ReplicationDestinationStatus,
        ReplicationDestinationTrigger,
    };
    use crate::test_support::restore;
    use serde_json::json;
    use snapmover_common::{
        MOVER_REPOSITORY_ANNOTATION, MOVER_SOURCE_PVC_NAME_ANNOTATION,
        MOVER_SOURCE_PVC_SIZE_ANNOTATION,
    };

    fn archived_request(with_repository: bool) -> Value {
        let mut annotations = json!({
            MOVER_SOURCE_PVC_NAME_ANNOTATION: "data-db-0",
            MOVER_SOURCE_PVC_SIZE_ANNOTATION: "8Gi"
        });
        if with_repository {
            annotations[MOVER_REPOSITORY_ANNOTATION] = json!("s3:bucket/app");
        }
        json!({
            "apiVersion": "datamover.oadp.openshift.io/v1alpha1",
            "kind": "VolumeSnapshotBackup",
            "metadata": {"name": "vsb-snap-db", "namespace": "app", "annotations": annotations},
            "spec": {
                "volumeSnapshotContent": {"name": "sc-a"},
                "protectedNamespace": "openshift-adp"
            }
        })
    }

    fn destination(synced: bool) -> ReplicationDestination {
        let mut rd = ReplicationDestination::new(
            "vsr-data-db-0-rep-dest",
            ReplicationDestinationSpec {
                trigger: Some(ReplicationDestinationTrigger {
                    manual: Some("vsr-data-db-0-trigger".to_string()),
                    schedule: None,
                }),
            },
        );
        rd.status = Some(ReplicationDestinationStatus {
            last_sync_time: synced.then(|| "2026-01-01T00:00:00Z".to_string()),
            last_manual_sync: synced.then(|| "vsr-data-db-0-trigger".to_string()),
            latest_image: None,
        });
        rd
    }

    fn live_request(namespace: &str, name: &str) -> MoverRestore {
        MoverRestore::new(
            name,
            namespace,
            &MoverBackupResult {
                repository: "s3:bucket/app".to_string(),
                source_claim_name: "data-db-0".to_string(),
                source_claim_size: "8Gi".to_string(),
            },
            "my-restic",
            "openshift-adp",
        )
    }

    fn action(mock: MockMoverClient) -> MoverRestoreAction {
        let config = PluginConfig {
            data_mover_enabled: true,
            mover_timeout_secs: 60,
            restic_secret_name: "my-restic".to_string(),
            ..Default::default()
        };
        MoverRestoreAction::new(Arc::new(mock), config)
    }

    /// Story: the archived request yields one restore request and the action
    /// returns once the destination finished its sync.
    #[tokio::test(start_paused = true)]
    async fn creates_request_and_waits_for_sync() {
        let mut mock = MockMoverClient::new();
        let mut seq = mockall::Sequence::new();
        mock.expect_get_mover_restore()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(None));
        mock.expect_create_mover_restore()
            .withf(|r| {
                r.name() == "vsr-data-db-0"
                    && r.metadata.namespace.as_deref() == Some("app")
                    && r.spec.restic_secret_ref.name == "my-restic"
                    && r.spec.backup_ref.repository == "s3:bucket/app"
                    && r.spec.backup_ref.source_pvc_data.size == "8Gi"
                    && r.spec.protected_namespace == "openshift-adp"
            })
            .times(1)
            .in_sequence(&mut seq)
            .returning(|r| Ok(r.clone()));
        mock.expect_get_mover_restore()
            .returning(|ns, name| Ok(Some(live_request(ns, name))));
        let mut rd_seq = mockall::Sequence::new();
        mock.expect_get_replication_destination()
            .withf(|ns, name| ns == "openshift-adp" && name == "vsr-data-db-0-rep-dest")
            .times(1)
            .in_sequence(&mut rd_seq)
            .returning(|_, _| Ok(None));
        mock.expect_get_replication_destination()
            .times(1)
            .in_sequence(&mut rd_seq)
            .returning(|_, _| Ok(Some(destination(false))));
        mock.expect_get_replication_destination()
            .times(1)
            .in_sequence(&mut rd_seq)
            .returning(|_, _| Ok(Some(destination(true))));

        let out = action(mock)
            .execute(&archived_request(true), &restore("r1"))
            .await
            .unwrap();

        assert!(out.skip_restore);
        assert!(out.updated_item.is_none());
        assert!(out.additional_items.is_empty());
    }

    /// Story: the mover never finishes; the restore step fails with a
    /// timeout carrying how long it waited.
    #[tokio::test(start_paused = true)]
    async fn never_synced_times_out() {
        let mut mock = MockMoverClient::new();
        mock.expect_get_mover_restore()
            .times(1)
            .returning(|_, _| Ok(None));
        mock.expect_create_mover_restore()
            .times(1)
            .returning(|r| Ok(r.clone()));
        mock.expect_get_mover_restore()
            .returning(|_, _| Ok(None));
        mock.expect_get_replication_destination().never();

        let err = action(mock)
            .execute(&archived_request(true), &restore("r1"))
            .await
            .unwrap_err();

        match err {
            Error::Timeout { elapsed, .. } => assert!(elapsed >= Duration::from_secs(60)),
            other => panic!("expected Timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_repository_creates_nothing() {
        let mut mock = MockMoverClient::new();
        mock.expect_get_mover_restore().never();
        mock.expect_create_mover_restore().never();

        let err = action(mock)
            .execute(&archived_request(false), &restore("r1"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MissingMoverResult { .. }));
    }

    #[tokio::test]
    async fn existing_request_for_other_repository_conflicts() {
        let mut mock = MockMoverClient::new();
        mock.expect_get_mover_restore().returning(|ns, name| {
            let mut other = live_request(ns, name);
            other.spec.backup_ref.repository = "s3:bucket/elsewhere".to_string();
            Ok(Some(other))
        });
        mock.expect_create_mover_restore().never();

        let err = action(mock)
            .execute(&archived_request(true), &restore("r1"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Conflict { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn namespace_mapping_moves_request() {
        let mut mock = MockMoverClient::new();
        mock.expect_get_mover_restore()
            .withf(|ns, _| ns == "app-restored")
            .times(1)
            .returning(|_, _| Ok(None));
        mock.expect_create_mover_restore()
            .withf(|r| r.metadata.namespace.as_deref() == Some("app-restored"))
            .times(1)
            .returning(|r| Ok(r.clone()));
        mock.expect_get_mover_restore()
            .returning(|ns, name| Ok(Some(live_request(ns, name))));
        mock.expect_get_replication_destination()
            .returning(|_, _| Ok(Some(destination(true))));

        let mut restore = restore("r1");
        restore
            .spec
            .namespace_mapping
            .insert("app".to_string(), "app-restored".to_string());

        let out = action(mock)
            .execute(&archived_request(true), &restore)
            .await
            .unwrap();
        assert!(out.skip_restore);
    }
}
