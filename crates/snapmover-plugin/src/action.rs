//! Item action interfaces
//!
//! The plugin runtime hands every action one item at a time as raw JSON,
//! together with the Velero Backup or Restore being processed. An action
//! declares which resources it applies to and returns the (possibly
//! rewritten) item plus further items the runtime should process next.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::crd::{Backup, Restore};
use crate::Result;

/// Which items an action is invoked for
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSelector {
    /// `resource.group` names, or bare names for the core group
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub included_resources: Vec<String>,
    /// Resources excluded even if included above
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub excluded_resources: Vec<String>,
    /// Namespaces to restrict to; empty means all
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub included_namespaces: Vec<String>,
    /// Label selector items must match
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label_selector: Option<String>,
}

impl ResourceSelector {
    /// Selector for a single resource
    pub fn resource(resource: impl Into<String>) -> Self {
        Self {
            included_resources: vec![resource.into()],
            ..Default::default()
        }
    }

    /// Whether the selector names this resource
    pub fn includes(&self, resource: &str) -> bool {
        self.included_resources.iter().any(|r| r == resource)
            && !self.excluded_resources.iter().any(|r| r == resource)
    }
}

/// Identity of an item the runtime should also process
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceIdentifier {
    /// API group; empty for the core group
    pub group: String,
    /// Plural resource name
    pub resource: String,
    /// Namespace; empty for cluster-scoped resources
    pub namespace: String,
    /// Name
    pub name: String,
}

impl ResourceIdentifier {
    /// Identifier of a core-group secret
    pub fn secret(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            group: String::new(),
            resource: "secrets".to_string(),
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ResourceIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.group.is_empty() {
            write!(f, "{} {}/{}", self.resource, self.namespace, self.name)
        } else {
            write!(
                f,
                "{}.{} {}/{}",
                self.resource, self.group, self.namespace, self.name
            )
        }
    }
}

/// Result of a backup item action
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupItemOutput {
    /// Item to write into the archive
    pub item: Value,
    /// Items to back up after this one
    #[serde(default)]
    pub additional_items: Vec<ResourceIdentifier>,
}

impl BackupItemOutput {
    /// Pass an item through unchanged
    pub fn unchanged(item: &Value) -> Self {
        Self {
            item: item.clone(),
            additional_items: Vec::new(),
        }
    }
}

/// Result of a restore item action
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreItemOutput {
    /// Item to create in the cluster; `None` creates nothing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_item: Option<Value>,
    /// Items to restore before this one
    #[serde(default)]
    pub additional_items: Vec<ResourceIdentifier>,
    /// Tell the runtime not to restore this item at all
    #[serde(default)]
    pub skip_restore: bool,
}

impl RestoreItemOutput {
    /// Restore the given item
    pub fn item(item: Value) -> Self {
        Self {
            updated_item: Some(item),
            ..Default::default()
        }
    }

    /// Do not restore the item
    pub fn skip() -> Self {
        Self {
            skip_restore: true,
            ..Default::default()
        }
    }
}

/// Action run on items as they are backed up
#[async_trait]
pub trait BackupItemAction: Send + Sync {
    /// Stable action name
    fn name(&self) -> &'static str;

    /// Resources this action runs for
    fn applies_to(&self) -> ResourceSelector;

    /// Process one item of `backup`
    async fn execute(&self, item: &Value, backup: &Backup) -> Result<BackupItemOutput>;
}

/// Action run on items as they are restored
#[async_trait]
pub trait RestoreItemAction: Send + Sync {
    /// Stable action name
    fn name(&self) -> &'static str;

    /// Resources this action runs for
    fn applies_to(&self) -> ResourceSelector;

    /// Process one item of `restore`
    async fn execute(&self, item: &Value, restore: &Restore) -> Result<RestoreItemOutput>;
}

/// Action run on items of a backup being deleted
#[async_trait]
pub trait DeleteItemAction: Send + Sync {
    /// Stable action name
    fn name(&self) -> &'static str;

    /// Resources this action runs for
    fn applies_to(&self) -> ResourceSelector;

    /// Clean up after one item of `backup`
    async fn execute(&self, item: &Value, backup: &Backup) -> Result<()>;
}
