//! Kubernetes helpers: client creation, ApiResource construction and
//! conversion between raw items and typed objects.
//!
//! Items arrive from the plugin runtime as untyped JSON. Actions convert
//! them into typed structs with `from_item`, work on the typed value, and
//! hand the result back through `to_item`. Fields the typed struct does not
//! know about are lost in that round trip unless the struct flattens them,
//! so only convert item kinds whose types preserve unknown fields or whose
//! full schema is modelled (k8s-openapi types).

use std::collections::BTreeMap;

use kube::api::DynamicObject;
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::discovery::ApiResource;
use kube::{Client, Config};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::config::ClientSettings;
use crate::{Error, Result};

// =============================================================================
// HasApiResource Trait
// =============================================================================

/// Trait for types that have a known API group, version, and kind.
///
/// Implement this for types that are not generated by `#[derive(CustomResource)]`
/// to derive their `ApiResource` from their constants.
pub trait HasApiResource {
    /// Full API version (e.g., "velero.io/v1", "v1")
    const API_VERSION: &'static str;
    /// Resource kind (e.g., "Restore")
    const KIND: &'static str;

    /// Build an ApiResource from the type's constants.
    fn api_resource() -> ApiResource {
        build_api_resource(Self::API_VERSION, Self::KIND)
    }
}

/// Build an ApiResource from an apiVersion string and kind.
///
/// The plural is derived from the kind; fine for every kind this plugin
/// touches.
pub fn build_api_resource(api_version: &str, kind: &str) -> ApiResource {
    let (group, version) = parse_api_version(api_version);
    ApiResource {
        group,
        version,
        kind: kind.to_string(),
        api_version: api_version.to_string(),
        plural: pluralize_kind(kind),
    }
}

/// Split an apiVersion into (group, version). Core resources have no group.
pub fn parse_api_version(api_version: &str) -> (String, String) {
    match api_version.split_once('/') {
        Some((group, version)) => (group.to_string(), version.to_string()),
        None => (String::new(), api_version.to_string()),
    }
}

/// Lowercase plural of a kind
pub fn pluralize_kind(kind: &str) -> String {
    let lower = kind.to_lowercase();
    if lower.ends_with('s') || lower.ends_with("ch") || lower.ends_with("sh") {
        format!("{}es", lower)
    } else if lower.ends_with('y') && !lower.ends_with("ay") && !lower.ends_with("ey") {
        format!("{}ies", &lower[..lower.len() - 1])
    } else {
        format!("{}s", lower)
    }
}

// =============================================================================
// Client creation
// =============================================================================

/// Create a kube client from the given settings.
///
/// Reads the kubeconfig file when one is configured, otherwise infers the
/// in-cluster or default config. Any failure is `Error::Config`.
pub async fn create_client(settings: &ClientSettings) -> Result<Client> {
    let mut config = match &settings.kubeconfig {
        Some(path) => {
            let kubeconfig = Kubeconfig::read_from(path).map_err(|e| {
                Error::config(format!(
                    "failed to read kubeconfig {}: {}",
                    path.display(),
                    e
                ))
            })?;
            Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                .await
                .map_err(|e| Error::config(format!("failed to load kubeconfig: {}", e)))?
        }
        None => Config::infer()
            .await
            .map_err(|e| Error::config(format!("failed to infer config: {}", e)))?,
    };

    config.connect_timeout = Some(settings.connect_timeout());
    config.read_timeout = Some(settings.read_timeout());

    Client::try_from(config)
        .map_err(|e| Error::config(format!("failed to create client: {}", e)))
}

// =============================================================================
// Item conversion
// =============================================================================

/// Parse a raw item into a typed object
pub fn from_item<T: DeserializeOwned>(item: &Value, kind: &str) -> Result<T> {
    serde_json::from_value(item.clone())
        .map_err(|e| Error::serialization_for_kind(kind, e.to_string()))
}

/// Serialize a typed object back into a raw item
pub fn to_item<T: Serialize>(obj: &T, kind: &str) -> Result<Value> {
    serde_json::to_value(obj).map_err(|e| Error::serialization_for_kind(kind, e.to_string()))
}

/// Parse a dynamic object into a typed struct
pub fn from_dynamic<T: DeserializeOwned>(obj: &DynamicObject, kind: &str) -> Result<T> {
    let value =
        serde_json::to_value(obj).map_err(|e| Error::serialization_for_kind(kind, e.to_string()))?;
    from_item(&value, kind)
}

/// Build a dynamic object from a JSON value that carries apiVersion and kind
pub fn to_dynamic(value: Value, kind: &str) -> Result<DynamicObject> {
    serde_json::from_value(value).map_err(|e| Error::serialization_for_kind(kind, e.to_string()))
}

/// `metadata.name` of a raw item
pub fn item_name(item: &Value) -> &str {
    item.pointer("/metadata/name")
        .and_then(Value::as_str)
        .unwrap_or_default()
}

/// `metadata.namespace` of a raw item
pub fn item_namespace(item: &Value) -> &str {
    item.pointer("/metadata/namespace")
        .and_then(Value::as_str)
        .unwrap_or_default()
}

/// `metadata.annotations` of a raw item, or an empty map
pub fn item_annotations(item: &Value) -> BTreeMap<String, String> {
    item.pointer("/metadata/annotations")
        .and_then(Value::as_object)
        .map(|m| {
            m.iter()
                .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                .collect()
        })
        .unwrap_or_default()
}

/// Return a copy of a raw item with the given annotations merged in
pub fn with_annotations(item: &Value, annotations: &BTreeMap<String, String>) -> Result<Value> {
    let mut out = item.clone();
    let metadata = out
        .as_object_mut()
        .ok_or_else(|| Error::serialization("item is not a JSON object"))?
        .entry("metadata")
        .or_insert_with(|| Value::Object(Default::default()));
    let existing = metadata
        .as_object_mut()
        .ok_or_else(|| Error::serialization("item metadata is not a JSON object"))?
        .entry("annotations")
        .or_insert_with(|| Value::Object(Default::default()));
    let existing = existing
        .as_object_mut()
        .ok_or_else(|| Error::serialization("item annotations are not a JSON object"))?;
    for (k, v) in annotations {
        existing.insert(k.clone(), Value::from(v.as_str()));
    }
    Ok(out)
}
