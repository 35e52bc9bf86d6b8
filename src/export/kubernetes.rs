//! Kubernetes ConfigMap and Secret manifests.

use super::ExportOptions;
use crate::format::format_value;
use crate::snapshot::ConfigSnapshot;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Manifest<'a> {
    api_version: &'static str,
    kind: &'static str,
    metadata: Metadata<'a>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    secret_type: Option<&'static str>,
    data: BTreeMap<&'a str, String>,
}

#[derive(Debug, Serialize)]
struct Metadata<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<&'a str>,
}

/// Non-secret keys as a ConfigMap.
pub fn export_configmap(snapshot: &ConfigSnapshot, options: &ExportOptions) -> serde_yaml::Result<String> {
    let data = snapshot
        .iter()
        .filter(|r| !r.masked)
        .map(|r| (r.key.as_str(), format_value(&r.value)))
        .collect();
    serde_yaml::to_string(&Manifest {
        api_version: "v1",
        kind: "ConfigMap",
        metadata: Metadata {
            name: &options.configmap_name,
            namespace: options.namespace.as_deref(),
        },
        secret_type: None,
        data,
    })
}

/// Secret keys as an Opaque Secret, base64-encoded.
///
/// Values are masked before encoding unless `options.unmask` is set.
pub fn export_secret(snapshot: &ConfigSnapshot, options: &ExportOptions) -> serde_yaml::Result<String> {
    let data = snapshot
        .iter()
        .filter(|r| r.masked)
        .map(|r| {
            let raw = format_value(&r.value);
            let shown = if options.unmask {
                raw
            } else {
                crate::mask::mask_value(&raw)
            };
            (r.key.as_str(), STANDARD.encode(shown.as_bytes()))
        })
        .collect();
    serde_yaml::to_string(&Manifest {
        api_version: "v1",
        kind: "Secret",
        metadata: Metadata {
            name: &options.secret_name,
            namespace: options.namespace.as_deref(),
        },
        secret_type: Some("Opaque"),
        data,
    })
}

/// Both manifests as one multi-document YAML stream.
pub fn export_kubernetes(snapshot: &ConfigSnapshot, options: &ExportOptions) -> serde_yaml::Result<String> {
    let configmap = export_configmap(snapshot, options)?;
    let secret = export_secret(snapshot, options)?;
    Ok(format!("{}---\n{}", configmap, secret))
}
