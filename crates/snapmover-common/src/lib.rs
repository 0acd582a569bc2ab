//! Common types for the snapshot data-mover plugin: CRDs, errors, polling and config

#![deny(missing_docs)]

pub mod config;
pub mod crd;
pub mod error;
pub mod kube_utils;
pub mod naming;
pub mod poll;
pub mod quantity;
pub mod telemetry;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Field manager used for every write this plugin issues
pub const FIELD_MANAGER: &str = "snapmover";

// =============================================================================
// Velero labels
// =============================================================================

/// Label Velero stamps on objects created while taking a backup
pub const BACKUP_NAME_LABEL: &str = "velero.io/backup-name";

/// Label Velero stamps on objects created while running a restore
pub const RESTORE_NAME_LABEL: &str = "velero.io/restore-name";

// =============================================================================
// CSI annotations
// =============================================================================

/// CSI driver name recorded on a backed-up VolumeSnapshot
pub const CSI_DRIVER_NAME_ANNOTATION: &str = "velero.io/csi-driver-name";

/// Deletion policy recorded on a restored VolumeSnapshot
pub const CSI_VSC_DELETION_POLICY_ANNOTATION: &str = "velero.io/csi-vsc-deletion-policy";

/// Name of the snapshot deletion secret recorded on a backed-up VolumeSnapshot
pub const CSI_DELETE_SNAPSHOT_SECRET_NAME: &str = "velero.io/csi-deletesnapshotsecret-name";

/// Namespace of the snapshot deletion secret recorded on a backed-up VolumeSnapshot
pub const CSI_DELETE_SNAPSHOT_SECRET_NAMESPACE: &str =
    "velero.io/csi-deletesnapshotsecret-namespace";

/// Snapshotter secret name annotation read by the external snapshotter
pub const SNAPSHOTTER_SECRET_NAME: &str = "csi.storage.k8s.io/snapshotter-secret-name";

/// Snapshotter secret namespace annotation read by the external snapshotter
pub const SNAPSHOTTER_SECRET_NAMESPACE: &str = "csi.storage.k8s.io/snapshotter-secret-namespace";

// =============================================================================
// Mover completion annotations
// =============================================================================
//
// Velero does not serialize the status subresource of custom resources, so
// the mover's completion data is copied into these annotations before the
// backup request is written into the backup archive.

/// Repository identifier the mover wrote the data into
pub const MOVER_REPOSITORY_ANNOTATION: &str = "datamover.io/restic-repository";

/// Name of the claim whose data was moved
pub const MOVER_SOURCE_PVC_NAME_ANNOTATION: &str = "datamover.io/source-pvc-name";

/// Size of the claim whose data was moved
pub const MOVER_SOURCE_PVC_SIZE_ANNOTATION: &str = "datamover.io/source-pvc-size";

// =============================================================================
// Claim provisioning annotations
// =============================================================================

/// Set by the PV controller once binding finished
pub const ANN_BIND_COMPLETED: &str = "pv.kubernetes.io/bind-completed";

/// Set by the PV controller when it bound the claim
pub const ANN_BOUND_BY_CONTROLLER: &str = "pv.kubernetes.io/bound-by-controller";

/// Provisioner chosen for the claim in the source cluster
pub const ANN_STORAGE_PROVISIONER: &str = "volume.beta.kubernetes.io/storage-provisioner";

/// Node chosen for a WaitForFirstConsumer claim in the source cluster
pub const ANN_SELECTED_NODE: &str = "volume.kubernetes.io/selected-node";

/// Provisioner-internal claim annotations that encode stale decisions from
/// the cluster the backup was taken in
pub const STALE_CLAIM_ANNOTATIONS: &[&str] = &[
    ANN_BIND_COMPLETED,
    ANN_BOUND_BY_CONTROLLER,
    ANN_STORAGE_PROVISIONER,
    ANN_SELECTED_NODE,
];
