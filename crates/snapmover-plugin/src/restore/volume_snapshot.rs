//! Restore of a VolumeSnapshot onto data-mover output
//!
//! The archived snapshot was cut from a claim in the source cluster. On
//! restore it is rebound to a new, statically bound content object whose
//! handle is the snapshot the mover produced. A content object cannot change
//! from dynamic to static, so the binding is always a fresh object.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info};

use snapmover_common::config::PluginConfig;
use snapmover_common::kube_utils::{from_item, to_item};
use snapmover_common::naming::{static_content_name, valid_label_value};
use snapmover_common::poll::{poll_until, Condition};
use snapmover_common::{
    CSI_DELETE_SNAPSHOT_SECRET_NAME, CSI_DELETE_SNAPSHOT_SECRET_NAMESPACE,
    CSI_DRIVER_NAME_ANNOTATION, CSI_VSC_DELETION_POLICY_ANNOTATION, RESTORE_NAME_LABEL,
    SNAPSHOTTER_SECRET_NAME, SNAPSHOTTER_SECRET_NAMESPACE,
};

use super::RestoreChain;
use crate::action::{ResourceSelector, RestoreItemAction, RestoreItemOutput};
use crate::client::MoverClient;
use crate::crd::{
    DeletionPolicy, Restore, VolumeSnapshot, VolumeSnapshotContent, VolumeSnapshotSource,
};
use crate::{Error, Result};

/// Selector for VolumeSnapshot items
pub const SNAPSHOT_RESOURCE: &str = "volumesnapshots.snapshot.storage.k8s.io";

/// Rebinds restored VolumeSnapshots to the data the mover restored
pub struct VolumeSnapshotRestoreAction {
    client: Arc<dyn MoverClient>,
    config: PluginConfig,
}

impl VolumeSnapshotRestoreAction {
    /// Create the action
    pub fn new(client: Arc<dyn MoverClient>, config: PluginConfig) -> Self {
        Self { client, config }
    }

    /// Follow the destination's latest image to the content the mover
    /// produced, waiting for the snapshot controller to bind it and for the
    /// content to report a handle
    async fn mover_content(
        &self,
        namespace: &str,
        snapshot: &str,
    ) -> Result<(VolumeSnapshotContent, String)> {
        let description = format!("VolumeSnapshot {namespace}/{snapshot} content handle");
        let client = self.client.as_ref();

        poll_until(&description, self.config.content_poll(), || async move {
            let Some(vs) = client.get_volume_snapshot(namespace, snapshot).await? else {
                return Ok(Condition::waiting("snapshot not found"));
            };
            let Some(bound) = vs.bound_content() else {
                return Ok(Condition::waiting("snapshot not bound to content yet"));
            };
            let Some(content) = client.get_volume_snapshot_content(bound).await? else {
                return Ok(Condition::waiting(format!("content {bound} not found")));
            };
            match content.snapshot_handle() {
                Some(handle) if !handle.is_empty() => {
                    let handle = handle.to_string();
                    Ok(Condition::Done((content, handle)))
                }
                _ => Ok(Condition::waiting(format!("content {bound} has no snapshot handle"))),
            }
        })
        .await
    }
}

#[async_trait]
impl RestoreItemAction for VolumeSnapshotRestoreAction {
    fn name(&self) -> &'static str {
        "snapmover/volumesnapshot-restore"
    }

    fn applies_to(&self) -> ResourceSelector {
        ResourceSelector::resource(SNAPSHOT_RESOURCE)
    }

    async fn execute(&self, item: &Value, restore: &Restore) -> Result<RestoreItemOutput> {
        if !self.config.data_mover_enabled {
            debug!("data mover disabled, restoring VolumeSnapshot unchanged");
            return Ok(RestoreItemOutput::item(item.clone()));
        }

        let vs: VolumeSnapshot = from_item(item, "VolumeSnapshot")?;
        let vs_name = vs.metadata.name.clone().unwrap_or_default();
        let source_namespace = vs.metadata.namespace.clone().unwrap_or_default();
        let namespace = restore.map_namespace(&source_namespace).to_string();
        let claim = vs.source_claim().ok_or_else(|| {
            Error::validation(
                format!("VolumeSnapshot {source_namespace}/{vs_name}"),
                "source is not a persistentVolumeClaimName",
            )
        })?;

        let chain = RestoreChain::lookup(
            self.client.as_ref(),
            self.config.mover_api,
            &namespace,
            claim,
            restore.namespace(),
        )
        .await?;

        if self
            .client
            .get_volume_snapshot(&namespace, &vs_name)
            .await?
            .is_some()
        {
            info!(snapshot = %vs_name, namespace = %namespace, "VolumeSnapshot already exists, not rebinding");
            return Ok(RestoreItemOutput::item(item.clone()));
        }

        let image = chain.latest_image()?;
        let (mover_content, handle) = self.mover_content(&chain.protected_namespace, image).await?;

        let driver = vs
            .annotation(CSI_DRIVER_NAME_ANNOTATION)
            .map(str::to_string)
            .unwrap_or_else(|| mover_content.spec.driver.clone());

        let desired = static_content_for(&vs, claim, &namespace, &driver, &handle, restore.name());
        let content = ensure_static_content(self.client.as_ref(), &desired).await?;
        let content_name = content.metadata.name.clone().unwrap_or_default();

        let rebound = rebind_snapshot(&vs, &content_name);
        info!(
            snapshot = %vs_name,
            namespace = %namespace,
            content = %content_name,
            "VolumeSnapshot rebound to restored data"
        );
        Ok(RestoreItemOutput::item(to_item(&rebound, "VolumeSnapshot")?))
    }
}

/// Build the statically bound content for a restored snapshot
fn static_content_for(
    vs: &VolumeSnapshot,
    claim: &str,
    namespace: &str,
    driver: &str,
    handle: &str,
    restore_name: &str,
) -> VolumeSnapshotContent {
    let vs_name = vs.metadata.name.as_deref().unwrap_or_default();
    let mut content = VolumeSnapshotContent::statically_bound(
        &static_content_name(claim),
        driver,
        handle,
        namespace,
        vs_name,
    );

    content.metadata.labels = Some(BTreeMap::from([(
        RESTORE_NAME_LABEL.to_string(),
        valid_label_value(restore_name),
    )]));

    if let (Some(secret), Some(secret_ns)) = (
        vs.annotation(CSI_DELETE_SNAPSHOT_SECRET_NAME),
        vs.annotation(CSI_DELETE_SNAPSHOT_SECRET_NAMESPACE),
    ) {
        content.metadata.annotations = Some(BTreeMap::from([
            (SNAPSHOTTER_SECRET_NAME.to_string(), secret.to_string()),
            (SNAPSHOTTER_SECRET_NAMESPACE.to_string(), secret_ns.to_string()),
        ]));
    }
    content
}

/// Create the static content, accepting one left by an earlier attempt only
/// if it binds the same handle to the same snapshot
async fn ensure_static_content(
    client: &dyn MoverClient,
    desired: &VolumeSnapshotContent,
) -> Result<VolumeSnapshotContent> {
    let name = desired.metadata.name.as_deref().unwrap_or_default();
    match client.create_volume_snapshot_content(desired).await {
        Ok(created) => {
            info!(content = %name, "created statically bound VolumeSnapshotContent");
            Ok(created)
        }
        Err(e) if e.is_already_exists() => match client.get_volume_snapshot_content(name).await? {
            Some(existing)
                if existing.is_static()
                    && existing.snapshot_handle() == desired.snapshot_handle()
                    && existing.spec.volume_snapshot_ref.namespace
                        == desired.spec.volume_snapshot_ref.namespace
                    && existing.spec.volume_snapshot_ref.name
                        == desired.spec.volume_snapshot_ref.name =>
            {
                debug!(content = %name, "reusing statically bound VolumeSnapshotContent");
                Ok(existing)
            }
            Some(_) => Err(Error::conflict(
                format!("VolumeSnapshotContent {name}"),
                "exists with a different snapshot handle or snapshot reference",
            )),
            None => Err(e),
        },
        Err(e) => Err(e),
    }
}

/// Point a snapshot at a statically bound content and pin its deletion
/// policy to `Retain`. Returns a new value; the input is untouched.
pub fn rebind_snapshot(vs: &VolumeSnapshot, content_name: &str) -> VolumeSnapshot {
    let mut rebound = vs.clone();
    rebound.spec.source = VolumeSnapshotSource::VolumeSnapshotContentName(content_name.to_string());
    rebound
        .metadata
        .annotations
        .get_or_insert_with(BTreeMap::new)
        .insert(
            CSI_VSC_DELETION_POLICY_ANNOTATION.to_string(),
            DeletionPolicy::Retain.to_string(),
        );
    rebound
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MockMoverClient;
    use crate::crd::{
        MoverBackupResult, MoverRestore, ReplicationDestination, ReplicationDestinationSpec,
        ReplicationDestinationStatus, ReplicationDestinationTrigger, TypedLocalObjectReference,
        VolumeSnapshotContentSource, VolumeSnapshotStatus,
    };
    use crate::test_support::{already_exists, restore};
    use serde_json::json;

    fn snapshot_item(with_driver: bool) -> Value {
        let mut annotations = json!({
            CSI_DELETE_SNAPSHOT_SECRET_NAME: "csi-secret",
            CSI_DELETE_SNAPSHOT_SECRET_NAMESPACE: "kube-system"
        });
        if with_driver {
            annotations[CSI_DRIVER_NAME_ANNOTATION] = json!("rbd.csi.ceph.com");
        }
        json!({
            "apiVersion": "snapshot.storage.k8s.io/v1",
            "kind": "VolumeSnapshot",
            "metadata": {"name": "snap-db", "namespace": "app", "annotations": annotations},
            "spec": {
                "source": {"persistentVolumeClaimName": "data-db-0"},
                "volumeSnapshotClassName": "csi-rbd"
            }
        })
    }

    fn mover_restore() -> MoverRestore {
        MoverRestore::new(
            "vsr-data-db-0",
            "app",
            &MoverBackupResult {
                repository: "s3:bucket/app".to_string(),
                source_claim_name: "data-db-0".to_string(),
                source_claim_size: "8Gi".to_string(),
            },
            "restic-secret",
            "openshift-adp",
        )
    }

    fn destination() -> ReplicationDestination {
        let mut rd = ReplicationDestination::new(
            "vsr-data-db-0-rep-dest",
            ReplicationDestinationSpec {
                trigger: Some(ReplicationDestinationTrigger {
                    manual: Some("t1".to_string()),
                    schedule: None,
                }),
            },
        );
        rd.status = Some(ReplicationDestinationStatus {
            last_sync_time: Some("2026-01-01T00:00:00Z".to_string()),
            last_manual_sync: Some("t1".to_string()),
            latest_image: Some(TypedLocalObjectReference {
                api_group: Some("snapshot.storage.k8s.io".to_string()),
                kind: "VolumeSnapshot".to_string(),
                name: "volsync-snap-1".to_string(),
            }),
        });
        rd
    }

    fn volsync_snapshot(bound: Option<&str>) -> VolumeSnapshot {
        let mut vs = VolumeSnapshot::new(
            "volsync-snap-1",
            crate::crd::VolumeSnapshotSpec {
                source: VolumeSnapshotSource::PersistentVolumeClaimName("volsync-dst".to_string()),
                volume_snapshot_class_name: None,
            },
        );
        vs.status = Some(VolumeSnapshotStatus {
            bound_volume_snapshot_content_name: bound.map(str::to_string),
            ..Default::default()
        });
        vs
    }

    fn mover_content() -> VolumeSnapshotContent {
        let mut content = VolumeSnapshotContent::statically_bound(
            "snapcontent-volsync",
            "ebs.csi.aws.com",
            "snap-0abc",
            "openshift-adp",
            "volsync-snap-1",
        );
        content.spec.source = VolumeSnapshotContentSource::VolumeHandle("vol-1".to_string());
        content.status = Some(crate::crd::VolumeSnapshotContentStatus {
            snapshot_handle: Some("snap-0abc".to_string()),
            ..Default::default()
        });
        content
    }

    fn chain_mock() -> MockMoverClient {
        let mut mock = MockMoverClient::new();
        mock.expect_get_mover_restore()
            .withf(|ns, name| ns == "app" && name == "vsr-data-db-0")
            .returning(|_, _| Ok(Some(mover_restore())));
        mock.expect_get_replication_destination()
            .withf(|ns, name| ns == "openshift-adp" && name == "vsr-data-db-0-rep-dest")
            .returning(|_, _| Ok(Some(destination())));
        mock
    }

    fn action(mock: MockMoverClient) -> VolumeSnapshotRestoreAction {
        VolumeSnapshotRestoreAction::new(
            Arc::new(mock),
            PluginConfig {
                data_mover_enabled: true,
                ..Default::default()
            },
        )
    }

    /// Story: the mover restored the data; the snapshot is rebound to a new
    /// static content carrying the mover's handle, with Retain everywhere.
    #[tokio::test(start_paused = true)]
    async fn rebinds_snapshot_to_static_content() {
        let mut mock = chain_mock();
        mock.expect_get_volume_snapshot()
            .withf(|ns, name| ns == "app" && name == "snap-db")
            .times(1)
            .returning(|_, _| Ok(None));
        let mut seq = mockall::Sequence::new();
        mock.expect_get_volume_snapshot()
            .withf(|ns, name| ns == "openshift-adp" && name == "volsync-snap-1")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(Some(volsync_snapshot(None))));
        mock.expect_get_volume_snapshot()
            .withf(|ns, name| ns == "openshift-adp" && name == "volsync-snap-1")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(Some(volsync_snapshot(Some("snapcontent-volsync")))));
        mock.expect_get_volume_snapshot_content()
            .withf(|name| name == "snapcontent-volsync")
            .returning(|_| Ok(Some(mover_content())));
        mock.expect_create_volume_snapshot_content()
            .withf(|c| {
                c.metadata.name.as_deref() == Some("vsr-vsc-data-db-0")
                    && c.spec.deletion_policy == DeletionPolicy::Retain
                    && c.spec.driver == "rbd.csi.ceph.com"
                    && c.spec.source
                        == VolumeSnapshotContentSource::SnapshotHandle("snap-0abc".to_string())
                    && c.spec.volume_snapshot_ref.namespace.as_deref() == Some("app")
                    && c.spec.volume_snapshot_ref.name == "snap-db"
            })
            .times(1)
            .returning(|c| Ok(c.clone()));

        let out = action(mock)
            .execute(&snapshot_item(true), &restore("r1"))
            .await
            .unwrap();

        let item = out.updated_item.unwrap();
        assert_eq!(
            item["spec"]["source"],
            json!({"volumeSnapshotContentName": "vsr-vsc-data-db-0"})
        );
        assert_eq!(
            item["metadata"]["annotations"][CSI_VSC_DELETION_POLICY_ANNOTATION],
            "Retain"
        );
        assert!(!out.skip_restore);
    }

    #[tokio::test(start_paused = true)]
    async fn static_content_carries_restore_label_and_secret() {
        let mut mock = chain_mock();
        mock.expect_get_volume_snapshot()
            .withf(|ns, _| ns == "app")
            .returning(|_, _| Ok(None));
        mock.expect_get_volume_snapshot()
            .withf(|ns, _| ns == "openshift-adp")
            .returning(|_, _| Ok(Some(volsync_snapshot(Some("snapcontent-volsync")))));
        mock.expect_get_volume_snapshot_content()
            .returning(|_| Ok(Some(mover_content())));
        mock.expect_create_volume_snapshot_content()
            .withf(|c| {
                let labels = c.metadata.labels.clone().unwrap_or_default();
                let annotations = c.metadata.annotations.clone().unwrap_or_default();
                labels.get(RESTORE_NAME_LABEL).map(String::as_str) == Some("r1")
                    && annotations.get(SNAPSHOTTER_SECRET_NAME).map(String::as_str)
                        == Some("csi-secret")
                    && annotations.get(SNAPSHOTTER_SECRET_NAMESPACE).map(String::as_str)
                        == Some("kube-system")
                    // driver falls back to the mover's content
                    && c.spec.driver == "ebs.csi.aws.com"
            })
            .times(1)
            .returning(|c| Ok(c.clone()));

        action(mock)
            .execute(&snapshot_item(false), &restore("r1"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn existing_snapshot_is_left_alone() {
        let mut mock = chain_mock();
        mock.expect_get_volume_snapshot()
            .withf(|ns, name| ns == "app" && name == "snap-db")
            .returning(|_, _| Ok(Some(volsync_snapshot(None))));
        mock.expect_create_volume_snapshot_content().never();

        let item = snapshot_item(true);
        let out = action(mock).execute(&item, &restore("r1")).await.unwrap();
        assert_eq!(out.updated_item, Some(item));
    }

    #[tokio::test]
    async fn missing_restore_request_is_dependency_error() {
        let mut mock = MockMoverClient::new();
        mock.expect_get_mover_restore().returning(|_, _| Ok(None));
        mock.expect_get_replication_destination().never();
        mock.expect_create_volume_snapshot_content().never();

        let err = action(mock)
            .execute(&snapshot_item(true), &restore("r1"))
            .await
            .unwrap_err();
        match err {
            Error::DependencyNotFound { kind, namespace, name } => {
                assert_eq!(kind, "VolumeSnapshotRestore");
                assert_eq!(namespace, "app");
                assert_eq!(name, "vsr-data-db-0");
            }
            other => panic!("expected DependencyNotFound, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_destination_is_dependency_error() {
        let mut mock = MockMoverClient::new();
        mock.expect_get_mover_restore()
            .returning(|_, _| Ok(Some(mover_restore())));
        mock.expect_get_replication_destination()
            .returning(|_, _| Ok(None));

        let err = action(mock)
            .execute(&snapshot_item(true), &restore("r1"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DependencyNotFound { kind, .. } if kind == "ReplicationDestination"));
    }

    #[tokio::test(start_paused = true)]
    async fn leftover_static_content_for_same_handle_is_reused() {
        let mut mock = chain_mock();
        mock.expect_get_volume_snapshot()
            .withf(|ns, _| ns == "app")
            .returning(|_, _| Ok(None));
        mock.expect_get_volume_snapshot()
            .withf(|ns, _| ns == "openshift-adp")
            .returning(|_, _| Ok(Some(volsync_snapshot(Some("snapcontent-volsync")))));
        mock.expect_get_volume_snapshot_content()
            .withf(|name| name == "snapcontent-volsync")
            .returning(|_| Ok(Some(mover_content())));
        mock.expect_create_volume_snapshot_content()
            .returning(|_| Err(already_exists("VolumeSnapshotContent vsr-vsc-data-db-0")));
        mock.expect_get_volume_snapshot_content()
            .withf(|name| name == "vsr-vsc-data-db-0")
            .returning(|_| {
                Ok(Some(VolumeSnapshotContent::statically_bound(
                    "vsr-vsc-data-db-0",
                    "rbd.csi.ceph.com",
                    "snap-0abc",
                    "app",
                    "snap-db",
                )))
            });

        let out = action(mock)
            .execute(&snapshot_item(true), &restore("r1"))
            .await
            .unwrap();
        assert_eq!(
            out.updated_item.unwrap()["spec"]["source"]["volumeSnapshotContentName"],
            "vsr-vsc-data-db-0"
        );
    }

    #[tokio::test]
    async fn snapshot_of_content_is_rejected() {
        let mut item = snapshot_item(true);
        item["spec"]["source"] = json!({"volumeSnapshotContentName": "pre-existing"});

        let err = action(MockMoverClient::new())
            .execute(&item, &restore("r1"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
    }

    #[tokio::test]
    async fn data_mover_disabled_passes_through() {
        let item = snapshot_item(true);
        let out = VolumeSnapshotRestoreAction::new(Arc::new(MockMoverClient::new()), PluginConfig::default())
            .execute(&item, &restore("r1"))
            .await
            .unwrap();
        assert_eq!(out.updated_item, Some(item));
    }

    #[test]
    fn rebind_does_not_touch_input() {
        let vs: VolumeSnapshot = serde_json::from_value(snapshot_item(true)).unwrap();
        let rebound = rebind_snapshot(&vs, "vsr-vsc-data-db-0");

        assert_eq!(vs.source_claim(), Some("data-db-0"));
        assert_eq!(rebound.source_claim(), None);
        assert_eq!(
            rebound.annotation(CSI_VSC_DELETION_POLICY_ANNOTATION),
            Some("Retain")
        );
        assert_eq!(vs.annotation(CSI_VSC_DELETION_POLICY_ANNOTATION), None);
    }
}
