//! CSI snapshot resources (snapshot.storage.k8s.io/v1)
//!
//! VolumeSnapshot is the namespaced user-facing handle; VolumeSnapshotContent
//! is the cluster-scoped record of the provider-side snapshot. Both are
//! reconciled by the external snapshot controller, never by this plugin.

use std::collections::BTreeMap;
use std::fmt;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// API group of the CSI snapshot resources
pub const SNAPSHOT_GROUP: &str = "snapshot.storage.k8s.io";

/// Where a VolumeSnapshot takes its data from.
///
/// Exactly one source is set, so this is an enum rather than two optional
/// fields. It serializes to the wire shape `{"persistentVolumeClaimName": ..}`
/// or `{"volumeSnapshotContentName": ..}`.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum VolumeSnapshotSource {
    /// Dynamically snapshot this claim
    PersistentVolumeClaimName(String),
    /// Statically bind to this pre-existing content
    VolumeSnapshotContentName(String),
}

/// Specification of a VolumeSnapshot
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "snapshot.storage.k8s.io",
    version = "v1",
    kind = "VolumeSnapshot",
    plural = "volumesnapshots",
    shortname = "vs",
    namespaced,
    status = "VolumeSnapshotStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct VolumeSnapshotSpec {
    /// Data source of the snapshot
    pub source: VolumeSnapshotSource,

    /// Snapshot class used for dynamic provisioning
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_snapshot_class_name: Option<String>,
}

/// Error reported by the snapshot controller
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotError {
    /// Error message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// When the error occurred
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
}

/// Status of a VolumeSnapshot
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VolumeSnapshotStatus {
    /// Content this snapshot is bound to, set once reconciled
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bound_volume_snapshot_content_name: Option<String>,

    /// When the provider took the snapshot
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_time: Option<String>,

    /// Whether the snapshot can be used to provision a volume
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ready_to_use: Option<bool>,

    /// Minimum size of a volume restored from this snapshot
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restore_size: Option<String>,

    /// Last error
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<SnapshotError>,
}

impl VolumeSnapshot {
    /// Claim this snapshot was dynamically taken from, if any
    pub fn source_claim(&self) -> Option<&str> {
        match &self.spec.source {
            VolumeSnapshotSource::PersistentVolumeClaimName(name) => Some(name),
            VolumeSnapshotSource::VolumeSnapshotContentName(_) => None,
        }
    }

    /// Content the snapshot controller bound this snapshot to
    pub fn bound_content(&self) -> Option<&str> {
        self.status
            .as_ref()
            .and_then(|s| s.bound_volume_snapshot_content_name.as_deref())
    }

    /// Annotation value, if present
    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.metadata
            .annotations
            .as_ref()
            .and_then(|a| a.get(key))
            .map(String::as_str)
    }
}

/// Deletion policy of a VolumeSnapshotContent
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum DeletionPolicy {
    /// Deleting the content deletes the provider-side snapshot
    Delete,
    /// The provider-side snapshot outlives the content object
    #[default]
    Retain,
}

impl fmt::Display for DeletionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Delete => write!(f, "Delete"),
            Self::Retain => write!(f, "Retain"),
        }
    }
}

/// Where a VolumeSnapshotContent's snapshot comes from.
///
/// A content object is dynamic (cut from a volume) or static (pointing at an
/// existing provider snapshot) for its whole lifetime. The enum makes the two
/// mutually exclusive in one object.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum VolumeSnapshotContentSource {
    /// Dynamic: the CSI volume handle to snapshot
    VolumeHandle(String),
    /// Static: the handle of an existing provider-side snapshot
    SnapshotHandle(String),
}

/// Reference from a content object back to its VolumeSnapshot
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotReference {
    /// API version of the referent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
    /// Kind of the referent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Namespace of the referent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Name of the referent
    #[serde(default)]
    pub name: String,
    /// UID of the referent, set once bound
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    /// Resource version of the referent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_version: Option<String>,
}

impl SnapshotReference {
    /// Reference to a VolumeSnapshot by namespace and name
    pub fn volume_snapshot(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: Some("VolumeSnapshot".to_string()),
            namespace: Some(namespace.into()),
            name: name.into(),
            ..Default::default()
        }
    }
}

/// Specification of a VolumeSnapshotContent
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "snapshot.storage.k8s.io",
    version = "v1",
    kind = "VolumeSnapshotContent",
    plural = "volumesnapshotcontents",
    shortname = "vsc",
    status = "VolumeSnapshotContentStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct VolumeSnapshotContentSpec {
    /// Back-reference to the owning VolumeSnapshot
    pub volume_snapshot_ref: SnapshotReference,

    /// What happens to the provider snapshot when this object is deleted
    pub deletion_policy: DeletionPolicy,

    /// CSI driver that owns the snapshot
    pub driver: String,

    /// Dynamic or static source
    pub source: VolumeSnapshotContentSource,

    /// Snapshot class used for dynamic provisioning
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_snapshot_class_name: Option<String>,

    /// Volume mode of the source volume
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_volume_mode: Option<String>,
}

/// Status of a VolumeSnapshotContent
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VolumeSnapshotContentStatus {
    /// Provider-side handle of the snapshot
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_handle: Option<String>,

    /// Creation time in nanoseconds since the epoch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_time: Option<i64>,

    /// Whether the snapshot can be used to provision a volume
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ready_to_use: Option<bool>,

    /// Restore size in bytes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restore_size: Option<i64>,

    /// Last error
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<SnapshotError>,
}

impl VolumeSnapshotContent {
    /// Build a content object statically bound to a VolumeSnapshot.
    ///
    /// The deletion policy is always `Retain`: the snapshot handle belongs to
    /// data owned by the mover, and deleting this object must never reach the
    /// provider.
    pub fn statically_bound(
        name: &str,
        driver: impl Into<String>,
        snapshot_handle: impl Into<String>,
        snapshot_namespace: &str,
        snapshot_name: &str,
    ) -> Self {
        Self::new(
            name,
            VolumeSnapshotContentSpec {
                volume_snapshot_ref: SnapshotReference::volume_snapshot(
                    snapshot_namespace,
                    snapshot_name,
                ),
                deletion_policy: DeletionPolicy::Retain,
                driver: driver.into(),
                source: VolumeSnapshotContentSource::SnapshotHandle(snapshot_handle.into()),
                volume_snapshot_class_name: None,
                source_volume_mode: None,
            },
        )
    }

    /// Provider-side snapshot handle, from status or a static source
    pub fn snapshot_handle(&self) -> Option<&str> {
        self.status
            .as_ref()
            .and_then(|s| s.snapshot_handle.as_deref())
            .or(match &self.spec.source {
                VolumeSnapshotContentSource::SnapshotHandle(h) => Some(h.as_str()),
                VolumeSnapshotContentSource::VolumeHandle(_) => None,
            })
    }

    /// Whether the content points at an existing provider snapshot
    pub fn is_static(&self) -> bool {
        matches!(
            self.spec.source,
            VolumeSnapshotContentSource::SnapshotHandle(_)
        )
    }

    /// Annotations, or an empty map
    pub fn annotations(&self) -> BTreeMap<String, String> {
        self.metadata.annotations.clone().unwrap_or_default()
    }

    /// Snapshot deletion secret referenced by the snapshotter annotations,
    /// as `(namespace, name)`. Both annotations must be present.
    pub fn delete_secret(&self) -> Option<(String, String)> {
        let annotations = self.metadata.annotations.as_ref()?;
        let name = annotations.get(crate::SNAPSHOTTER_SECRET_NAME)?;
        let namespace = annotations.get(crate::SNAPSHOTTER_SECRET_NAMESPACE)?;
        Some((namespace.clone(), name.clone()))
    }
}
