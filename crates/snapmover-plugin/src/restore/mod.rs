//! Restore item actions
//!
//! Restore runs in stages: the mover restore completes first, then snapshots
//! are rebound to the restored data, then claims are pointed at the
//! snapshots. The later stages look up what the earlier ones created and
//! fail hard when it is missing.

mod mover_backup;
mod pvc;
mod snapshot_content;
mod volume_snapshot;

pub use mover_backup::{ensure_mover_restore, MoverRestoreAction};
pub use pvc::{rebind_claim, ClaimRestoreAction, CLAIM_RESOURCE};
pub use snapshot_content::SnapshotContentRestoreAction;
pub use volume_snapshot::{rebind_snapshot, VolumeSnapshotRestoreAction, SNAPSHOT_RESOURCE};

use snapmover_common::naming::{replication_destination_name, restore_request_name};

use crate::client::MoverClient;
use crate::crd::{MoverFlavor, MoverRestore, ReplicationDestination};
use crate::{Error, Result};

/// A completed mover restore and the destination that holds its data
#[derive(Clone, Debug)]
pub struct RestoreChain {
    /// The mover restore request
    pub request: MoverRestore,
    /// Namespace the mover worked in
    pub protected_namespace: String,
    /// The replication destination the mover synced into
    pub destination: ReplicationDestination,
}

impl RestoreChain {
    /// Look up the mover restore request for a claim and its replication
    /// destination.
    ///
    /// Both are created by an earlier restore stage, so absence is an
    /// ordering failure and reported as `DependencyNotFound` with no retry.
    pub async fn lookup(
        client: &dyn MoverClient,
        flavor: MoverFlavor,
        namespace: &str,
        claim: &str,
        default_protected_namespace: &str,
    ) -> Result<Self> {
        let request_name = restore_request_name(flavor, claim);
        let request = client
            .get_mover_restore(namespace, &request_name)
            .await?
            .ok_or_else(|| {
                Error::dependency_not_found(flavor.restore_kind(), namespace, &request_name)
            })?;

        let protected_namespace = match request.spec.protected_namespace.as_str() {
            "" => default_protected_namespace.to_string(),
            ns => ns.to_string(),
        };

        let rd_name = replication_destination_name(&request_name);
        let destination = client
            .get_replication_destination(&protected_namespace, &rd_name)
            .await?
            .ok_or_else(|| {
                Error::dependency_not_found("ReplicationDestination", &protected_namespace, &rd_name)
            })?;

        Ok(Self {
            request,
            protected_namespace,
            destination,
        })
    }

    /// Name of the VolumeSnapshot the mover restored the data into
    pub fn latest_image(&self) -> Result<&str> {
        self.destination.latest_image().ok_or_else(|| {
            Error::validation(
                format!(
                    "ReplicationDestination {}/{}",
                    self.protected_namespace,
                    self.destination.metadata.name.as_deref().unwrap_or_default()
                ),
                "no latestImage recorded; sync has not completed",
            )
        })
    }
}
