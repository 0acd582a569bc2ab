//! Restore of PersistentVolumeClaims onto mover-restored snapshots

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{PersistentVolumeClaim, TypedLocalObjectReference};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use serde_json::Value;
use tracing::{debug, info};

use snapmover_common::config::PluginConfig;
use snapmover_common::kube_utils::{from_item, to_item};
use snapmover_common::quantity::compare_quantities;
use snapmover_common::STALE_CLAIM_ANNOTATIONS;

use super::RestoreChain;
use crate::action::{ResourceSelector, RestoreItemAction, RestoreItemOutput};
use crate::client::MoverClient;
use crate::crd::{Restore, SNAPSHOT_GROUP};
use crate::{Error, Result};

/// Selector for PersistentVolumeClaim items
pub const CLAIM_RESOURCE: &str = "persistentvolumeclaims";

const STORAGE: &str = "storage";

/// Points restored claims at the snapshot the mover restored their data into
pub struct ClaimRestoreAction {
    client: Arc<dyn MoverClient>,
    config: PluginConfig,
}

impl ClaimRestoreAction {
    /// Create the action
    pub fn new(client: Arc<dyn MoverClient>, config: PluginConfig) -> Self {
        Self { client, config }
    }
}

#[async_trait]
impl RestoreItemAction for ClaimRestoreAction {
    fn name(&self) -> &'static str {
        "snapmover/pvc-restore"
    }

    fn applies_to(&self) -> ResourceSelector {
        ResourceSelector::resource(CLAIM_RESOURCE)
    }

    async fn execute(&self, item: &Value, restore: &Restore) -> Result<RestoreItemOutput> {
        if !self.config.data_mover_enabled {
            debug!("data mover disabled, restoring claim unchanged");
            return Ok(RestoreItemOutput::item(item.clone()));
        }

        let mut pvc: PersistentVolumeClaim = from_item(item, "PersistentVolumeClaim")?;
        strip_stale_annotations(&mut pvc);

        let claim = pvc.metadata.name.clone().unwrap_or_default();
        let source_namespace = pvc.metadata.namespace.clone().unwrap_or_default();
        let namespace = restore.map_namespace(&source_namespace).to_string();
        pvc.metadata.namespace = Some(namespace.clone());
        info!(claim = %claim, namespace = %namespace, "restoring claim from mover data");

        let chain = RestoreChain::lookup(
            self.client.as_ref(),
            self.config.mover_api,
            &namespace,
            &claim,
            restore.namespace(),
        )
        .await?;
        let snapshot = chain.latest_image()?;

        let rebound = rebind_claim(&pvc, snapshot, chain.request.source_claim_size())?;
        info!(
            claim = %claim,
            namespace = %namespace,
            snapshot = %snapshot,
            "claim data source set to restored snapshot"
        );
        Ok(RestoreItemOutput::item(to_item(&rebound, "PersistentVolumeClaim")?))
    }
}

/// Drop provisioner decisions made in the cluster the backup came from
fn strip_stale_annotations(pvc: &mut PersistentVolumeClaim) {
    if let Some(annotations) = pvc.metadata.annotations.as_mut() {
        annotations.retain(|k, _| !STALE_CLAIM_ANNOTATIONS.contains(&k.as_str()));
    }
}

/// Point a claim at a snapshot as its data source.
///
/// The storage request becomes the larger of the claim's own request and the
/// size recorded when the data was moved: a provider may have allocated
/// more than was asked for, and a claim smaller than its snapshot never
/// binds. The bound volume name is cleared so a fresh volume is provisioned.
pub fn rebind_claim(
    pvc: &PersistentVolumeClaim,
    snapshot_name: &str,
    recorded_size: &str,
) -> Result<PersistentVolumeClaim> {
    let claim = pvc.metadata.name.as_deref().unwrap_or_default();
    let mut rebound = pvc.clone();
    let spec = rebound.spec.get_or_insert_with(Default::default);

    let requests = spec
        .resources
        .get_or_insert_with(Default::default)
        .requests
        .get_or_insert_with(BTreeMap::new);

    let grow = match requests.get(STORAGE) {
        _ if recorded_size.is_empty() => false,
        Some(Quantity(current)) => compare_quantities(current, recorded_size)
            .map_err(|e| Error::validation(format!("PersistentVolumeClaim {claim}"), e))?
            == Ordering::Less,
        None => true,
    };
    if grow {
        debug!(claim = %claim, size = %recorded_size, "raising storage request to recorded size");
        requests.insert(STORAGE.to_string(), Quantity(recorded_size.to_string()));
    }

    spec.volume_name = None;
    spec.data_source = Some(TypedLocalObjectReference {
        api_group: Some(SNAPSHOT_GROUP.to_string()),
        kind: "VolumeSnapshot".to_string(),
        name: snapshot_name.to_string(),
    });
    spec.data_source_ref = None;
    Ok(rebound)
}
