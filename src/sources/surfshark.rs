use crate::error::{ProbeError, Result};
use crate::types::{Provider, VpnServer};
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SurfsharkCluster {
    connection_name: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    pub_key: Option<String>,
    country: Option<String>,
    country_code: Option<String>,
    load: Option<u32>,
}

/// 解析 Surfshark API 返回的服务器列表
///
/// The API has no status field; everything it returns is online. Only
/// `wireguard` and `generic` clusters with a public key are kept, in API order.
pub fn parse_servers(data: &Value) -> Result<Vec<VpnServer>> {
    let entries = data.as_array().ok_or_else(|| {
        ProbeError::Custom("Surfshark response is not a JSON array".to_string())
    })?;

    let mut servers = Vec::new();
    for entry in entries {
        let raw = match SurfsharkCluster::deserialize(entry) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Failed to parse Surfshark server: {}", e);
                continue;
            }
        };

        let Some(name) = raw.connection_name.as_deref().filter(|n| !n.is_empty()) else {
            continue;
        };
        if !matches!(raw.kind.as_deref(), Some("wireguard") | Some("generic")) {
            continue;
        }
        let Some(public_key) = raw.pub_key.as_deref().filter(|k| !k.is_empty()) else {
            continue;
        };

        match VpnServer::new(
            Provider::Surfshark,
            raw.country.as_deref().unwrap_or("Unknown"),
            raw.country_code.as_deref().unwrap_or("XX"),
            name,
            public_key,
            raw.load,
        ) {
            Ok(server) => servers.push(server),
            Err(e) => warn!("Failed to parse Surfshark server {}: {}", name, e),
        }
    }

    Ok(servers)
}
