use crate::error::{ProbeError, Result};
use crate::types::{Provider, VpnServer};
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

const WIREGUARD_TECH: &str = "wireguard_udp";

#[derive(Debug, Deserialize)]
struct NordServer {
    hostname: Option<String>,
    status: Option<String>,
    load: Option<u32>,
    #[serde(default)]
    locations: Vec<NordLocation>,
    #[serde(default)]
    technologies: Vec<NordTechnology>,
}

#[derive(Debug, Deserialize)]
struct NordLocation {
    country: Option<NordCountry>,
}

#[derive(Debug, Deserialize)]
struct NordCountry {
    name: Option<String>,
    code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NordTechnology {
    identifier: Option<String>,
    pivot: Option<NordPivot>,
    #[serde(default)]
    metadata: Vec<NordMetadata>,
}

#[derive(Debug, Deserialize)]
struct NordPivot {
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NordMetadata {
    name: Option<String>,
    value: Option<String>,
}

/// Request URL: WireGuard servers only, `limit = 0` means all.
pub fn servers_url(base: &str, limit: u32) -> String {
    format!(
        "{}?filters[servers_technologies][identifier]={}&limit={}",
        base, WIREGUARD_TECH, limit
    )
}

/// 解析 NordVPN API 返回的服务器列表
///
/// Keeps servers that are online, have a hostname, and expose an online
/// WireGuard technology with a public key. Result is sorted by load, lowest
/// first, servers without load last.
pub fn parse_servers(data: &Value) -> Result<Vec<VpnServer>> {
    let entries = data.as_array().ok_or_else(|| {
        ProbeError::Custom("NordVPN response is not a JSON array".to_string())
    })?;

    let mut servers = Vec::new();
    for entry in entries {
        let raw = match NordServer::deserialize(entry) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Failed to parse NordVPN server: {}", e);
                continue;
            }
        };

        if raw.status.as_deref() != Some("online") {
            continue;
        }
        let Some(hostname) = raw.hostname.as_deref().filter(|h| !h.is_empty()) else {
            continue;
        };
        let Some(public_key) = wireguard_public_key(&raw.technologies) else {
            continue;
        };

        let country = raw.locations.first().and_then(|l| l.country.as_ref());
        let name = country.and_then(|c| c.name.as_deref()).unwrap_or("Unknown");
        let code = country.and_then(|c| c.code.as_deref()).unwrap_or("XX");

        match VpnServer::new(Provider::NordVpn, name, code, hostname, public_key, raw.load) {
            Ok(server) => servers.push(server),
            Err(e) => warn!("Failed to parse NordVPN server {}: {}", hostname, e),
        }
    }

    servers.sort_by_key(|s| s.load.unwrap_or(u32::MAX));
    Ok(servers)
}

fn wireguard_public_key(technologies: &[NordTechnology]) -> Option<&str> {
    let tech = technologies
        .iter()
        .find(|t| t.identifier.as_deref() == Some(WIREGUARD_TECH))?;

    if tech.pivot.as_ref().and_then(|p| p.status.as_deref()) != Some("online") {
        return None;
    }

    tech.metadata
        .iter()
        .find(|m| m.name.as_deref() == Some("public_key"))
        .and_then(|m| m.value.as_deref())
        .filter(|v| !v.is_empty())
}
