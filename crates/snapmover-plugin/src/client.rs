//! Cluster access for the data-mover actions
//!
//! Provides a trait-based abstraction over every read and write the actions
//! issue, so tests mock the cluster while production uses kube-rs. Gets map
//! 404 to `None`; every other failure is wrapped with the operation and the
//! resource it was aimed at. Nothing here retries.

use async_trait::async_trait;
use kube::api::{Api, DeleteParams, DynamicObject, Patch, PatchParams, PostParams};
use kube::Client;
use serde_json::json;
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use crate::crd::{
    DeletionPolicy, MoverBackup, MoverFlavor, MoverRestore, ReplicationDestination,
    VolumeSnapshot, VolumeSnapshotContent,
};
use crate::{Error, Result};
use snapmover_common::FIELD_MANAGER;

/// Trait abstracting the cluster operations of the data-mover actions
#[cfg_attr(test, automock)]
#[async_trait]
pub trait MoverClient: Send + Sync {
    /// Get a VolumeSnapshot
    async fn get_volume_snapshot(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<VolumeSnapshot>>;

    /// Get a VolumeSnapshotContent
    async fn get_volume_snapshot_content(&self, name: &str)
        -> Result<Option<VolumeSnapshotContent>>;

    /// Create a VolumeSnapshotContent
    async fn create_volume_snapshot_content(
        &self,
        content: &VolumeSnapshotContent,
    ) -> Result<VolumeSnapshotContent>;

    /// Merge-patch the deletion policy of a VolumeSnapshotContent
    async fn patch_content_deletion_policy(
        &self,
        name: &str,
        policy: DeletionPolicy,
    ) -> Result<()>;

    /// Delete a VolumeSnapshotContent
    async fn delete_volume_snapshot_content(&self, name: &str) -> Result<()>;

    /// Get a mover backup request
    async fn get_mover_backup(&self, namespace: &str, name: &str) -> Result<Option<MoverBackup>>;

    /// Create a mover backup request
    async fn create_mover_backup(&self, backup: &MoverBackup) -> Result<MoverBackup>;

    /// Get a mover restore request
    async fn get_mover_restore(&self, namespace: &str, name: &str)
        -> Result<Option<MoverRestore>>;

    /// Create a mover restore request
    async fn create_mover_restore(&self, restore: &MoverRestore) -> Result<MoverRestore>;

    /// Get a VolSync ReplicationDestination
    async fn get_replication_destination(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ReplicationDestination>>;
}

/// Real Kubernetes client implementation
pub struct MoverClientImpl {
    client: Client,
    flavor: MoverFlavor,
}

impl MoverClientImpl {
    /// Create a client speaking the given mover CRD family
    pub fn new(client: Client, flavor: MoverFlavor) -> Self {
        Self { client, flavor }
    }

    fn mover_backups(&self, namespace: &str) -> Api<DynamicObject> {
        Api::namespaced_with(
            self.client.clone(),
            namespace,
            &self.flavor.backup_api_resource(),
        )
    }

    fn mover_restores(&self, namespace: &str) -> Api<DynamicObject> {
        Api::namespaced_with(
            self.client.clone(),
            namespace,
            &self.flavor.restore_api_resource(),
        )
    }
}

fn namespaced(kind: &str, namespace: &str, name: &str) -> String {
    format!("{kind} {namespace}/{name}")
}

fn cluster_scoped(kind: &str, name: &str) -> String {
    format!("{kind} {name}")
}

#[async_trait]
impl MoverClient for MoverClientImpl {
    async fn get_volume_snapshot(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<VolumeSnapshot>> {
        let api: Api<VolumeSnapshot> = Api::namespaced(self.client.clone(), namespace);
        match api.get(name).await {
            Ok(vs) => Ok(Some(vs)),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(None),
            Err(e) => Err(Error::client(
                "get",
                namespaced("VolumeSnapshot", namespace, name),
                e,
            )),
        }
    }

    async fn get_volume_snapshot_content(
        &self,
        name: &str,
    ) -> Result<Option<VolumeSnapshotContent>> {
        let api: Api<VolumeSnapshotContent> = Api::all(self.client.clone());
        match api.get(name).await {
            Ok(vsc) => Ok(Some(vsc)),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(None),
            Err(e) => Err(Error::client(
                "get",
                cluster_scoped("VolumeSnapshotContent", name),
                e,
            )),
        }
    }

    async fn create_volume_snapshot_content(
        &self,
        content: &VolumeSnapshotContent,
    ) -> Result<VolumeSnapshotContent> {
        let name = content.metadata.name.as_deref().unwrap_or_default();
        let api: Api<VolumeSnapshotContent> = Api::all(self.client.clone());
        let params = PostParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..Default::default()
        };
        debug!(name = %name, "creating VolumeSnapshotContent");
        api.create(&params, content)
            .await
            .map_err(|e| Error::client("create", cluster_scoped("VolumeSnapshotContent", name), e))
    }

    async fn patch_content_deletion_policy(
        &self,
        name: &str,
        policy: DeletionPolicy,
    ) -> Result<()> {
        let api: Api<VolumeSnapshotContent> = Api::all(self.client.clone());
        let patch = json!({"spec": {"deletionPolicy": policy.to_string()}});
        let params = PatchParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..Default::default()
        };
        debug!(name = %name, policy = %policy, "patching VolumeSnapshotContent deletion policy");
        api.patch(name, &params, &Patch::Merge(&patch))
            .await
            .map_err(|e| Error::client("patch", cluster_scoped("VolumeSnapshotContent", name), e))?;
        Ok(())
    }

    async fn delete_volume_snapshot_content(&self, name: &str) -> Result<()> {
        let api: Api<VolumeSnapshotContent> = Api::all(self.client.clone());
        api.delete(name, &DeleteParams::default())
            .await
            .map_err(|e| {
                Error::client("delete", cluster_scoped("VolumeSnapshotContent", name), e)
            })?;
        Ok(())
    }

    async fn get_mover_backup(&self, namespace: &str, name: &str) -> Result<Option<MoverBackup>> {
        match self.mover_backups(namespace).get(name).await {
            Ok(obj) => MoverBackup::from_dynamic(&obj).map(Some),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(None),
            Err(e) => Err(Error::client(
                "get",
                namespaced(self.flavor.backup_kind(), namespace, name),
                e,
            )),
        }
    }

    async fn create_mover_backup(&self, backup: &MoverBackup) -> Result<MoverBackup> {
        let obj = backup.to_dynamic(self.flavor)?;
        let params = PostParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..Default::default()
        };
        let created = self
            .mover_backups(backup.namespace())
            .create(&params, &obj)
            .await
            .map_err(|e| {
                Error::client(
                    "create",
                    namespaced(self.flavor.backup_kind(), backup.namespace(), backup.name()),
                    e,
                )
            })?;
        MoverBackup::from_dynamic(&created)
    }

    async fn get_mover_restore(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<MoverRestore>> {
        match self.mover_restores(namespace).get(name).await {
            Ok(obj) => MoverRestore::from_dynamic(&obj).map(Some),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(None),
            Err(e) => Err(Error::client(
                "get",
                namespaced(self.flavor.restore_kind(), namespace, name),
                e,
            )),
        }
    }

    async fn create_mover_restore(&self, restore: &MoverRestore) -> Result<MoverRestore> {
        let obj = restore.to_dynamic(self.flavor)?;
        let namespace = restore.metadata.namespace.as_deref().unwrap_or_default();
        let params = PostParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..Default::default()
        };
        let created = self
            .mover_restores(namespace)
            .create(&params, &obj)
            .await
            .map_err(|e| {
                Error::client(
                    "create",
                    namespaced(self.flavor.restore_kind(), namespace, restore.name()),
                    e,
                )
            })?;
        MoverRestore::from_dynamic(&created)
    }

    async fn get_replication_destination(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ReplicationDestination>> {
        let api: Api<ReplicationDestination> = Api::namespaced(self.client.clone(), namespace);
        match api.get(name).await {
            Ok(rd) => Ok(Some(rd)),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(None),
            Err(e) => Err(Error::client(
                "get",
                namespaced("ReplicationDestination", namespace, name),
                e,
            )),
        }
    }
}
