use crate::error::{ProbeError, Result};
use crate::sources::SUPPORTED_PROVIDERS;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 支持的 VPN 提供商
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[serde(rename = "nordvpn")]
    NordVpn,
    Surfshark,
}

impl Provider {
    pub const ALL: [Provider; 2] = [Provider::NordVpn, Provider::Surfshark];

    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::NordVpn => "nordvpn",
            Provider::Surfshark => "surfshark",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = ProbeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "nordvpn" => Ok(Provider::NordVpn),
            "surfshark" => Ok(Provider::Surfshark),
            other => Err(ProbeError::UnknownProvider(format!(
                "'{}'. Available: {}",
                other,
                SUPPORTED_PROVIDERS.join(", ")
            ))),
        }
    }
}

/// Canonical representation of a VPN server from any provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VpnServer {
    pub provider: Provider,
    pub country: String,
    pub country_code: String, // 两位大写国家代码, 例如 "US"
    pub identifier: String,   // hostname / IP / URL-like string
    pub public_key: String,
    pub load: Option<u32>,
    pub latency: Option<f64>, // 毫秒
}

impl VpnServer {
    pub fn new(
        provider: Provider,
        country: &str,
        country_code: &str,
        identifier: &str,
        public_key: &str,
        load: Option<u32>,
    ) -> Result<Self> {
        Ok(Self {
            provider,
            country: country.to_string(),
            country_code: normalize_country_code(country_code)?,
            identifier: identifier.to_string(),
            public_key: public_key.to_string(),
            load,
            latency: None,
        })
    }

    /// Returns a copy carrying the given latency (or none).
    pub fn with_latency(&self, latency: Option<f64>) -> Self {
        Self {
            latency,
            ..self.clone()
        }
    }
}

/// Validates a two-letter country code and returns it uppercased.
pub fn normalize_country_code(code: &str) -> Result<String> {
    let trimmed = code.trim();
    if trimmed.len() == 2 && trimmed.chars().all(|c| c.is_ascii_alphabetic()) {
        Ok(trimmed.to_ascii_uppercase())
    } else {
        Err(ProbeError::InvalidCountryCode(code.to_string()))
    }
}

/// Country entry for the `countries` listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CountryInfo {
    pub code: String,
    pub name: String,
    pub display: String, // "CODE - Name"
}

/// Which strategy produced a probe result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeMethod {
    Fping,
    /// TCP connect; carries the port that answered, `None` when every port failed.
    Tcp(Option<u16>),
}

impl fmt::Display for ProbeMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeMethod::Fping => f.write_str("fping"),
            ProbeMethod::Tcp(Some(port)) => write!(f, "tcp:{}", port),
            ProbeMethod::Tcp(None) => f.write_str("tcp"),
        }
    }
}

/// 单个主机的测速结果
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeResult {
    pub host: String,
    pub latency_ms: Option<f64>, // 仅在成功时存在
    pub method: ProbeMethod,
    pub success: bool,
}

impl ProbeResult {
    pub fn reachable(host: &str, latency_ms: f64, method: ProbeMethod) -> Self {
        Self {
            host: host.to_string(),
            latency_ms: Some(latency_ms),
            method,
            success: true,
        }
    }

    pub fn unreachable(host: &str, method: ProbeMethod) -> Self {
        Self {
            host: host.to_string(),
            latency_ms: None,
            method,
            success: false,
        }
    }
}

/// Requested measurement strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MeasureMethod {
    #[default]
    Auto,
    Fping,
    Tcp,
}

impl fmt::Display for MeasureMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MeasureMethod::Auto => f.write_str("auto"),
            MeasureMethod::Fping => f.write_str("fping"),
            MeasureMethod::Tcp => f.write_str("tcp"),
        }
    }
}

impl FromStr for MeasureMethod {
    type Err = ProbeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(MeasureMethod::Auto),
            "fping" | "bulk-ping" => Ok(MeasureMethod::Fping),
            "tcp" => Ok(MeasureMethod::Tcp),
            other => Err(ProbeError::UnknownMethod(format!(
                "'{}'. Available: auto, fping, tcp",
                other
            ))),
        }
    }
}
