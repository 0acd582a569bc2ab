//! Data-mover request resources
//!
//! Two generations of the mover CRDs exist with the same shape but different
//! groups, kinds and naming prefixes:
//!
//! | flavor                | group                         | backup kind            | restore kind            |
//! |-----------------------|-------------------------------|------------------------|-------------------------|
//! | `DataMover`           | `pvc.oadp.openshift.io`       | `DataMoverBackup`      | `DataMoverRestore`      |
//! | `VolumeSnapshotMover` | `datamover.oadp.openshift.io` | `VolumeSnapshotBackup` | `VolumeSnapshotRestore` |
//!
//! Requests are handled through `DynamicObject` with an `ApiResource` picked
//! by flavor, and converted into the flavor-agnostic structs below.

use std::collections::BTreeMap;
use std::fmt;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::DynamicObject;
use kube::discovery::ApiResource;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::kube_utils::{build_api_resource, from_dynamic, to_dynamic};
use crate::{
    Error, Result, MOVER_REPOSITORY_ANNOTATION, MOVER_SOURCE_PVC_NAME_ANNOTATION,
    MOVER_SOURCE_PVC_SIZE_ANNOTATION,
};

/// Which mover CRD family is in use
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum MoverFlavor {
    /// `DataMoverBackup` / `DataMoverRestore` (`dmb-` / `dmr-`)
    DataMover,
    /// `VolumeSnapshotBackup` / `VolumeSnapshotRestore` (`vsb-` / `vsr-`)
    #[default]
    VolumeSnapshotMover,
}

impl fmt::Display for MoverFlavor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DataMover => write!(f, "data-mover"),
            Self::VolumeSnapshotMover => write!(f, "volume-snapshot-mover"),
        }
    }
}

impl MoverFlavor {
    /// API group of the request CRDs
    pub fn group(self) -> &'static str {
        match self {
            Self::DataMover => "pvc.oadp.openshift.io",
            Self::VolumeSnapshotMover => "datamover.oadp.openshift.io",
        }
    }

    /// Full API version of the request CRDs
    pub fn api_version(self) -> &'static str {
        match self {
            Self::DataMover => "pvc.oadp.openshift.io/v1alpha1",
            Self::VolumeSnapshotMover => "datamover.oadp.openshift.io/v1alpha1",
        }
    }

    /// Kind of the backup request
    pub fn backup_kind(self) -> &'static str {
        match self {
            Self::DataMover => "DataMoverBackup",
            Self::VolumeSnapshotMover => "VolumeSnapshotBackup",
        }
    }

    /// Kind of the restore request
    pub fn restore_kind(self) -> &'static str {
        match self {
            Self::DataMover => "DataMoverRestore",
            Self::VolumeSnapshotMover => "VolumeSnapshotRestore",
        }
    }

    /// Plural resource name of the backup request
    pub fn backup_plural(self) -> &'static str {
        match self {
            Self::DataMover => "datamoverbackups",
            Self::VolumeSnapshotMover => "volumesnapshotbackups",
        }
    }

    /// Name prefix of backup requests
    pub fn backup_prefix(self) -> &'static str {
        match self {
            Self::DataMover => "dmb-",
            Self::VolumeSnapshotMover => "vsb-",
        }
    }

    /// Name prefix of restore requests
    pub fn restore_prefix(self) -> &'static str {
        match self {
            Self::DataMover => "dmr-",
            Self::VolumeSnapshotMover => "vsr-",
        }
    }

    /// Spec key under which a restore request embeds the backup data
    fn backup_ref_key(self) -> &'static str {
        match self {
            Self::DataMover => "dataMoverBackupRef",
            Self::VolumeSnapshotMover => "volumeSnapshotMoverBackupRef",
        }
    }

    /// `plural.group` selector string for the backup request
    pub fn backup_resource_selector(self) -> String {
        format!("{}.{}", self.backup_plural(), self.group())
    }

    /// ApiResource of the backup request
    pub fn backup_api_resource(self) -> ApiResource {
        build_api_resource(self.api_version(), self.backup_kind())
    }

    /// ApiResource of the restore request
    pub fn restore_api_resource(self) -> ApiResource {
        build_api_resource(self.api_version(), self.restore_kind())
    }
}

// =============================================================================
// Shared shapes
// =============================================================================

/// Reference to an object by name
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct LocalRef {
    /// Referenced name
    #[serde(default)]
    pub name: String,
}

/// Name and size of the claim whose data was moved
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct PvcData {
    /// Claim name
    #[serde(default)]
    pub name: String,
    /// Claim size as a Kubernetes quantity
    #[serde(default)]
    pub size: String,
}

/// Lifecycle phase of a mover request
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MoverPhase {
    /// Not picked up yet (no phase reported)
    New,
    /// Being worked on
    InProgress,
    /// Data moved
    Completed,
    /// Gave up
    Failed,
    /// Gave up after moving part of the data
    PartiallyFailed,
    /// Any intermediate phase specific to a mover version
    Other(String),
}

impl MoverPhase {
    /// Parse a phase string as reported in status
    pub fn parse(phase: Option<&str>) -> Self {
        match phase {
            None | Some("") | Some("New") => Self::New,
            Some("InProgress") => Self::InProgress,
            Some("Completed") => Self::Completed,
            Some("Failed") => Self::Failed,
            Some("PartiallyFailed") => Self::PartiallyFailed,
            Some(other) => Self::Other(other.to_string()),
        }
    }

    /// Whether the mover stopped without completing
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed | Self::PartiallyFailed)
    }
}

impl fmt::Display for MoverPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::New => write!(f, "New"),
            Self::InProgress => write!(f, "InProgress"),
            Self::Completed => write!(f, "Completed"),
            Self::Failed => write!(f, "Failed"),
            Self::PartiallyFailed => write!(f, "PartiallyFailed"),
            Self::Other(p) => write!(f, "{p}"),
        }
    }
}

// =============================================================================
// Backup request
// =============================================================================

/// Spec of a mover backup request
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MoverBackupSpec {
    /// Snapshot content whose data is moved
    #[serde(default)]
    pub volume_snapshot_content: LocalRef,
    /// Namespace the mover does its work in
    #[serde(default)]
    pub protected_namespace: String,
    /// Fields this plugin does not interpret
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Status of a mover backup request
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MoverBackupStatus {
    /// Phase as reported by the mover
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    /// Repository the data was written to
    #[serde(
        default,
        rename = "resticrepository",
        skip_serializing_if = "Option::is_none"
    )]
    pub repository: Option<String>,
    /// Claim whose data was moved
    #[serde(
        default,
        rename = "sourcePVCData",
        skip_serializing_if = "Option::is_none"
    )]
    pub source_pvc_data: Option<PvcData>,
    /// Fields this plugin does not interpret
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A mover backup request of either flavor
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MoverBackup {
    /// Object metadata
    pub metadata: ObjectMeta,
    /// Request spec
    #[serde(default)]
    pub spec: MoverBackupSpec,
    /// Request status, filled in by the mover
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<MoverBackupStatus>,
}

impl MoverBackup {
    /// Build a new backup request for a snapshot content
    pub fn new(
        name: impl Into<String>,
        namespace: impl Into<String>,
        content_name: impl Into<String>,
        protected_namespace: impl Into<String>,
    ) -> Self {
        Self {
            metadata: ObjectMeta {
                name: Some(name.into()),
                namespace: Some(namespace.into()),
                ..Default::default()
            },
            spec: MoverBackupSpec {
                volume_snapshot_content: LocalRef {
                    name: content_name.into(),
                },
                protected_namespace: protected_namespace.into(),
                extra: Map::new(),
            },
            status: None,
        }
    }

    /// Request name
    pub fn name(&self) -> &str {
        self.metadata.name.as_deref().unwrap_or_default()
    }

    /// Request namespace
    pub fn namespace(&self) -> &str {
        self.metadata.namespace.as_deref().unwrap_or_default()
    }

    /// Current phase
    pub fn phase(&self) -> MoverPhase {
        MoverPhase::parse(self.status.as_ref().and_then(|s| s.phase.as_deref()))
    }

    /// Whether this request moves the given snapshot content
    pub fn references_content(&self, content_name: &str) -> bool {
        !self.spec.volume_snapshot_content.name.is_empty()
            && self.spec.volume_snapshot_content.name == content_name
    }

    /// Parse from a dynamic object of either flavor
    pub fn from_dynamic(obj: &DynamicObject) -> Result<Self> {
        from_dynamic(obj, "mover backup request")
    }

    /// Convert into a dynamic object of the given flavor
    pub fn to_dynamic(&self, flavor: MoverFlavor) -> Result<DynamicObject> {
        let mut value = serde_json::to_value(self)
            .map_err(|e| Error::serialization_for_kind(flavor.backup_kind(), e.to_string()))?;
        set_type_meta(&mut value, flavor.api_version(), flavor.backup_kind());
        to_dynamic(value, flavor.backup_kind())
    }
}

// =============================================================================
// Completion data
// =============================================================================

/// Completion data of a mover backup, however it was encoded.
///
/// A live request carries it in status. Once written into a backup archive
/// status is gone, so it is read back from annotations instead.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MoverBackupResult {
    /// Repository the data was written to
    pub repository: String,
    /// Claim whose data was moved
    pub source_claim_name: String,
    /// Size of that claim
    pub source_claim_size: String,
}

impl MoverBackupResult {
    /// Read completion data from status, falling back to annotations.
    ///
    /// Fails unless every field is present and non-empty in one of the two
    /// encodings, so a restore request is never built with a missing
    /// repository.
    pub fn resolve(backup: &MoverBackup) -> Result<Self> {
        if let Some(result) = backup.status.as_ref().and_then(Self::from_status) {
            return Ok(result);
        }
        if let Some(result) = backup
            .metadata
            .annotations
            .as_ref()
            .and_then(Self::from_annotations)
        {
            return Ok(result);
        }
        Err(Error::MissingMoverResult {
            name: backup.name().to_string(),
            message: "neither status nor annotations carry repository, claim name and size"
                .to_string(),
        })
    }

    fn from_status(status: &MoverBackupStatus) -> Option<Self> {
        let pvc = status.source_pvc_data.as_ref()?;
        Self::complete(
            status.repository.as_deref()?,
            &pvc.name,
            &pvc.size,
        )
    }

    fn from_annotations(annotations: &BTreeMap<String, String>) -> Option<Self> {
        Self::complete(
            annotations.get(MOVER_REPOSITORY_ANNOTATION)?,
            annotations.get(MOVER_SOURCE_PVC_NAME_ANNOTATION)?,
            annotations.get(MOVER_SOURCE_PVC_SIZE_ANNOTATION)?,
        )
    }

    fn complete(repository: &str, name: &str, size: &str) -> Option<Self> {
        if repository.is_empty() || name.is_empty() || size.is_empty() {
            return None;
        }
        Some(Self {
            repository: repository.to_string(),
            source_claim_name: name.to_string(),
            source_claim_size: size.to_string(),
        })
    }

    /// Encode as the annotations that survive the backup archive
    pub fn to_annotations(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            (
                MOVER_REPOSITORY_ANNOTATION.to_string(),
                self.repository.clone(),
            ),
            (
                MOVER_SOURCE_PVC_NAME_ANNOTATION.to_string(),
                self.source_claim_name.clone(),
            ),
            (
                MOVER_SOURCE_PVC_SIZE_ANNOTATION.to_string(),
                self.source_claim_size.clone(),
            ),
        ])
    }
}

// =============================================================================
// Restore request
// =============================================================================

/// Backup data embedded in a restore request
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct MoverBackupRef {
    /// Claim whose data was moved
    #[serde(default, rename = "sourcePVCData")]
    pub source_pvc_data: PvcData,
    /// Repository the data was written to
    #[serde(default, rename = "resticrepository")]
    pub repository: String,
}

/// Spec of a mover restore request
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MoverRestoreSpec {
    /// Secret holding the repository credentials
    #[serde(default)]
    pub restic_secret_ref: LocalRef,
    /// Backup data to restore. Serialized under the flavor's key.
    #[serde(default, rename = "volumeSnapshotMoverBackupRef", alias = "dataMoverBackupRef")]
    pub backup_ref: MoverBackupRef,
    /// Namespace the mover does its work in
    #[serde(default)]
    pub protected_namespace: String,
}

/// Status of a mover restore request
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MoverRestoreStatus {
    /// Phase as reported by the mover
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    /// Provider handle of the snapshot the mover produced
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_handle: Option<String>,
}

/// A mover restore request of either flavor
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct MoverRestore {
    /// Object metadata
    pub metadata: ObjectMeta,
    /// Request spec
    #[serde(default)]
    pub spec: MoverRestoreSpec,
    /// Request status, filled in by the mover
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<MoverRestoreStatus>,
}

impl MoverRestore {
    /// Build a restore request from a completed backup's data
    pub fn new(
        name: impl Into<String>,
        namespace: impl Into<String>,
        result: &MoverBackupResult,
        restic_secret: impl Into<String>,
        protected_namespace: impl Into<String>,
    ) -> Self {
        Self {
            metadata: ObjectMeta {
                name: Some(name.into()),
                namespace: Some(namespace.into()),
                ..Default::default()
            },
            spec: MoverRestoreSpec {
                restic_secret_ref: LocalRef {
                    name: restic_secret.into(),
                },
                backup_ref: MoverBackupRef {
                    source_pvc_data: PvcData {
                        name: result.source_claim_name.clone(),
                        size: result.source_claim_size.clone(),
                    },
                    repository: result.repository.clone(),
                },
                protected_namespace: protected_namespace.into(),
            },
            status: None,
        }
    }

    /// Request name
    pub fn name(&self) -> &str {
        self.metadata.name.as_deref().unwrap_or_default()
    }

    /// Recorded size of the source claim
    pub fn source_claim_size(&self) -> &str {
        &self.spec.backup_ref.source_pvc_data.size
    }

    /// Whether two requests restore the same data
    pub fn restores_same_data(&self, other: &MoverRestore) -> bool {
        self.spec.backup_ref == other.spec.backup_ref
    }

    /// Parse from a dynamic object of either flavor
    pub fn from_dynamic(obj: &DynamicObject) -> Result<Self> {
        from_dynamic(obj, "mover restore request")
    }

    /// Convert into a dynamic object of the given flavor
    pub fn to_dynamic(&self, flavor: MoverFlavor) -> Result<DynamicObject> {
        let mut value = serde_json::to_value(self)
            .map_err(|e| Error::serialization_for_kind(flavor.restore_kind(), e.to_string()))?;
        if let Some(spec) = value.get_mut("spec").and_then(Value::as_object_mut) {
            if let Some(backup_ref) = spec.remove("volumeSnapshotMoverBackupRef") {
                spec.insert(flavor.backup_ref_key().to_string(), backup_ref);
            }
        }
        set_type_meta(&mut value, flavor.api_version(), flavor.restore_kind());
        to_dynamic(value, flavor.restore_kind())
    }
}

fn set_type_meta(value: &mut Value, api_version: &str, kind: &str) {
    if let Some(obj) = value.as_object_mut() {
        obj.insert("apiVersion".to_string(), Value::from(api_version));
        obj.insert("kind".to_string(), Value::from(kind));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn completed_backup_json() -> Value {
        json!({
            "apiVersion": "datamover.oadp.openshift.io/v1alpha1",
            "kind": "VolumeSnapshotBackup",
            "metadata": {"name": "vsb-snap-db", "namespace": "app"},
            "spec": {
                "volumeSnapshotContent": {"name": "snapcontent-1"},
                "protectedNamespace": "openshift-adp",
                "resticSecretRef": {"name": "restic-secret"}
            },
            "status": {
                "phase": "Completed",
                "resticrepository": "s3:s3.amazonaws.com/bucket/app",
                "sourcePVCData": {"name": "data-db-0", "size": "8Gi"},
                "completionTimestamp": "2026-01-01T00:00:00Z"
            }
        })
    }

    #[test]
    fn backup_request_preserves_unknown_fields() {
        let backup: MoverBackup = serde_json::from_value(completed_backup_json()).unwrap();
        assert_eq!(backup.phase(), MoverPhase::Completed);
        assert!(backup.references_content("snapcontent-1"));
        assert!(!backup.references_content("snapcontent-2"));

        let out = serde_json::to_value(&backup).unwrap();
        assert_eq!(out["spec"]["resticSecretRef"]["name"], "restic-secret");
        assert_eq!(out["status"]["completionTimestamp"], "2026-01-01T00:00:00Z");
    }

    #[test]
    fn empty_content_reference_never_matches() {
        let backup = MoverBackup::new("vsb-x", "app", "", "openshift-adp");
        assert!(!backup.references_content(""));
    }

    #[test]
    fn result_prefers_status() {
        let mut backup: MoverBackup = serde_json::from_value(completed_backup_json()).unwrap();
        backup.metadata.annotations = Some(BTreeMap::from([(
            MOVER_REPOSITORY_ANNOTATION.to_string(),
            "stale".to_string(),
        )]));

        let result = MoverBackupResult::resolve(&backup).unwrap();
        assert_eq!(result.repository, "s3:s3.amazonaws.com/bucket/app");
        assert_eq!(result.source_claim_name, "data-db-0");
        assert_eq!(result.source_claim_size, "8Gi");
    }

    #[test]
    fn result_falls_back_to_annotations() {
        let mut backup = MoverBackup::new("vsb-snap-db", "app", "snapcontent-1", "openshift-adp");
        let expected = MoverBackupResult {
            repository: "s3:bucket/app".to_string(),
            source_claim_name: "data-db-0".to_string(),
            source_claim_size: "8Gi".to_string(),
        };
        backup.metadata.annotations = Some(expected.to_annotations());

        assert_eq!(MoverBackupResult::resolve(&backup).unwrap(), expected);
    }

    #[test]
    fn result_rejects_partial_data() {
        let mut backup = MoverBackup::new("vsb-snap-db", "app", "snapcontent-1", "openshift-adp");
        backup.status = Some(MoverBackupStatus {
            phase: Some("Completed".to_string()),
            repository: Some(String::new()),
            source_pvc_data: Some(PvcData {
                name: "data-db-0".to_string(),
                size: "8Gi".to_string(),
            }),
            extra: Map::new(),
        });

        assert!(matches!(
            MoverBackupResult::resolve(&backup),
            Err(Error::MissingMoverResult { .. })
        ));
    }

    #[test]
    fn restore_request_uses_flavor_key() {
        let result = MoverBackupResult {
            repository: "s3:bucket/app".to_string(),
            source_claim_name: "data-db-0".to_string(),
            source_claim_size: "8Gi".to_string(),
        };
        let restore = MoverRestore::new("dmr-data-db-0", "app", &result, "restic-secret", "openshift-adp");

        let dm = restore.to_dynamic(MoverFlavor::DataMover).unwrap();
        let dm = serde_json::to_value(&dm).unwrap();
        assert_eq!(dm["kind"], "DataMoverRestore");
        assert_eq!(dm["apiVersion"], "pvc.oadp.openshift.io/v1alpha1");
        assert_eq!(dm["spec"]["dataMoverBackupRef"]["resticrepository"], "s3:bucket/app");
        assert!(dm["spec"].get("volumeSnapshotMoverBackupRef").is_none());

        let vsm = restore.to_dynamic(MoverFlavor::VolumeSnapshotMover).unwrap();
        let vsm = serde_json::to_value(&vsm).unwrap();
        assert_eq!(vsm["kind"], "VolumeSnapshotRestore");
        assert_eq!(
            vsm["spec"]["volumeSnapshotMoverBackupRef"]["sourcePVCData"]["size"],
            "8Gi"
        );
    }

    #[test]
    fn restore_request_reads_either_key() {
        let dm: MoverRestore = serde_json::from_value(json!({
            "metadata": {"name": "dmr-data", "namespace": "app"},
            "spec": {
                "dataMoverBackupRef": {
                    "sourcePVCData": {"name": "data", "size": "5Gi"},
                    "resticrepository": "repo"
                },
                "protectedNamespace": "openshift-adp"
            }
        }))
        .unwrap();
        assert_eq!(dm.source_claim_size(), "5Gi");
        assert_eq!(dm.spec.backup_ref.repository, "repo");
    }

    #[test]
    fn phase_parsing() {
        assert_eq!(MoverPhase::parse(None), MoverPhase::New);
        assert_eq!(MoverPhase::parse(Some("Completed")), MoverPhase::Completed);
        assert!(MoverPhase::parse(Some("PartiallyFailed")).is_failed());
        assert_eq!(
            MoverPhase::parse(Some("SnapshotBackupDone")),
            MoverPhase::Other("SnapshotBackupDone".to_string())
        );
    }

    #[test]
    fn flavor_selectors() {
        assert_eq!(
            MoverFlavor::DataMover.backup_resource_selector(),
            "datamoverbackups.pvc.oadp.openshift.io"
        );
        assert_eq!(
            MoverFlavor::VolumeSnapshotMover.backup_resource_selector(),
            "volumesnapshotbackups.datamover.oadp.openshift.io"
        );
        let ar = MoverFlavor::VolumeSnapshotMover.restore_api_resource();
        assert_eq!(ar.plural, "volumesnapshotrestores");
        assert_eq!(ar.group, "datamover.oadp.openshift.io");
    }
}
