//! Velero resource types
//!
//! Typed views of the Velero Backup and Restore objects handed to every
//! action. Only the fields the actions read are typed; everything else is
//! carried through untouched.

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::kube_utils::HasApiResource;

// =============================================================================
// Backup
// =============================================================================

/// Velero Backup resource
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Backup {
    /// API version
    #[serde(default = "Backup::default_api_version")]
    pub api_version: String,
    /// Resource kind
    #[serde(default = "Backup::default_kind")]
    pub kind: String,
    /// Resource metadata
    #[serde(default)]
    pub metadata: ObjectMeta,
    /// Backup specification
    #[serde(default)]
    pub spec: BackupSpec,
}

impl HasApiResource for Backup {
    const API_VERSION: &'static str = "velero.io/v1";
    const KIND: &'static str = "Backup";
}

impl Backup {
    fn default_api_version() -> String {
        <Self as HasApiResource>::API_VERSION.to_string()
    }
    fn default_kind() -> String {
        <Self as HasApiResource>::KIND.to_string()
    }

    /// Create a new Backup
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            api_version: Self::default_api_version(),
            kind: Self::default_kind(),
            metadata: ObjectMeta {
                name: Some(name.into()),
                namespace: Some(namespace.into()),
                ..Default::default()
            },
            spec: BackupSpec::default(),
        }
    }

    /// Backup name
    pub fn name(&self) -> &str {
        self.metadata.name.as_deref().unwrap_or_default()
    }

    /// Namespace Velero runs in; also the mover's protected namespace
    pub fn namespace(&self) -> &str {
        self.metadata.namespace.as_deref().unwrap_or_default()
    }
}

/// Backup spec. Opaque to the actions.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct BackupSpec {
    /// All spec fields
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

// =============================================================================
// Restore
// =============================================================================

/// Velero Restore resource
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Restore {
    /// API version
    #[serde(default = "Restore::default_api_version")]
    pub api_version: String,
    /// Resource kind
    #[serde(default = "Restore::default_kind")]
    pub kind: String,
    /// Resource metadata
    #[serde(default)]
    pub metadata: ObjectMeta,
    /// Restore specification
    #[serde(default)]
    pub spec: RestoreSpec,
}

impl HasApiResource for Restore {
    const API_VERSION: &'static str = "velero.io/v1";
    const KIND: &'static str = "Restore";
}

impl Restore {
    fn default_api_version() -> String {
        <Self as HasApiResource>::API_VERSION.to_string()
    }
    fn default_kind() -> String {
        <Self as HasApiResource>::KIND.to_string()
    }

    /// Create a new Restore
    pub fn new(name: impl Into<String>, namespace: impl Into<String>, spec: RestoreSpec) -> Self {
        Self {
            api_version: Self::default_api_version(),
            kind: Self::default_kind(),
            metadata: ObjectMeta {
                name: Some(name.into()),
                namespace: Some(namespace.into()),
                ..Default::default()
            },
            spec,
        }
    }

    /// Restore name
    pub fn name(&self) -> &str {
        self.metadata.name.as_deref().unwrap_or_default()
    }

    /// Namespace Velero runs in; also the mover's protected namespace
    pub fn namespace(&self) -> &str {
        self.metadata.namespace.as_deref().unwrap_or_default()
    }

    /// Namespace an object from `source` lands in
    pub fn map_namespace<'a>(&'a self, source: &'a str) -> &'a str {
        self.spec
            .namespace_mapping
            .get(source)
            .map(String::as_str)
            .unwrap_or(source)
    }

    /// Whether volumes are restored. Unset means yes.
    pub fn restores_volumes(&self) -> bool {
        self.spec.restore_pvs != Some(false)
    }
}

/// Restore spec
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RestoreSpec {
    /// Name of the Velero Backup to restore from
    #[serde(default)]
    pub backup_name: String,
    /// Source namespace to target namespace
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub namespace_mapping: BTreeMap<String, String>,
    /// Restore PVs
    #[serde(default, rename = "restorePVs", skip_serializing_if = "Option::is_none")]
    pub restore_pvs: Option<bool>,
    /// Fields the actions do not interpret
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
