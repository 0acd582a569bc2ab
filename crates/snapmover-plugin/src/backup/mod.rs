//! Backup item actions

mod mover_backup;
mod snapshot_content;

pub use mover_backup::MoverBackupStatusAction;
pub use snapshot_content::{
    ensure_mover_backup, mover_backup_identifier, SnapshotContentBackupAction,
    SNAPSHOT_CONTENT_RESOURCE,
};
