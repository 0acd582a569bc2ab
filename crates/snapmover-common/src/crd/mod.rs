//! Custom resource types the data-mover plugin reads and writes

mod mover;
mod snapshot;
mod velero;
mod volsync;

pub use mover::{
    LocalRef, MoverBackup, MoverBackupRef, MoverBackupResult, MoverBackupSpec, MoverBackupStatus,
    MoverFlavor, MoverPhase, MoverRestore, MoverRestoreSpec, MoverRestoreStatus, PvcData,
};
pub use snapshot::{
    DeletionPolicy, SnapshotError, SnapshotReference, VolumeSnapshot, VolumeSnapshotContent,
    VolumeSnapshotContentSource, VolumeSnapshotContentSpec, VolumeSnapshotContentStatus,
    VolumeSnapshotSource, VolumeSnapshotSpec, VolumeSnapshotStatus, SNAPSHOT_GROUP,
};
pub use velero::{Backup, BackupSpec, Restore, RestoreSpec};
pub use volsync::{
    ReplicationDestination, ReplicationDestinationSpec, ReplicationDestinationStatus,
    ReplicationDestinationTrigger, TypedLocalObjectReference,
};
