//! Delete item actions

mod snapshot_content;

pub use snapshot_content::SnapshotContentDeleteAction;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use snapmover_common::naming::valid_label_value;
use snapmover_common::BACKUP_NAME_LABEL;

/// Whether an object was created while taking the named backup.
///
/// A blank backup name never matches, so nothing is ever claimed by a backup
/// that cannot be identified.
pub fn has_backup_label(meta: &ObjectMeta, backup_name: &str) -> bool {
    if backup_name.trim().is_empty() {
        return false;
    }
    meta.labels
        .as_ref()
        .and_then(|labels| labels.get(BACKUP_NAME_LABEL))
        .is_some_and(|value| *value == valid_label_value(backup_name))
}
