//! VolSync ReplicationDestination (volsync.backube/v1alpha1)
//!
//! The mover controller creates one ReplicationDestination per restore
//! request, named `<request>-rep-dest`, in its protected namespace. When the
//! manual sync finishes, `status.latestImage` names the VolumeSnapshot that
//! holds the restored data.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// How a replication is triggered
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ReplicationDestinationTrigger {
    /// Manual trigger token; a sync runs whenever this changes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manual: Option<String>,
    /// Cron schedule
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<String>,
}

/// Specification of a ReplicationDestination.
///
/// Only the trigger matters here; the mover owns the rest.
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "volsync.backube",
    version = "v1alpha1",
    kind = "ReplicationDestination",
    plural = "replicationdestinations",
    namespaced,
    status = "ReplicationDestinationStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct ReplicationDestinationSpec {
    /// When to sync
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger: Option<ReplicationDestinationTrigger>,
}

/// Typed reference to the object a sync produced
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TypedLocalObjectReference {
    /// API group of the referent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_group: Option<String>,
    /// Kind of the referent
    #[serde(default)]
    pub kind: String,
    /// Name of the referent
    #[serde(default)]
    pub name: String,
}

/// Status of a ReplicationDestination
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReplicationDestinationStatus {
    /// When the last sync finished
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sync_time: Option<String>,
    /// Manual trigger token of the last completed sync
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_manual_sync: Option<String>,
    /// Snapshot produced by the last sync
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_image: Option<TypedLocalObjectReference>,
}

impl ReplicationDestination {
    /// Whether the manually triggered sync has completed.
    ///
    /// True once a sync time is recorded and the completed trigger token
    /// matches the requested one.
    pub fn is_sync_complete(&self) -> bool {
        let Some(status) = &self.status else {
            return false;
        };
        if status.last_sync_time.is_none() {
            return false;
        }
        let requested = self.spec.trigger.as_ref().and_then(|t| t.manual.as_deref());
        requested == status.last_manual_sync.as_deref()
    }

    /// Name of the VolumeSnapshot holding the restored data
    pub fn latest_image(&self) -> Option<&str> {
        self.status
            .as_ref()
            .and_then(|s| s.latest_image.as_ref())
            .map(|i| i.name.as_str())
            .filter(|n| !n.is_empty())
    }
}
