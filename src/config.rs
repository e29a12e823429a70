use crate::error::{ProbeError, Result};
use directories::ProjectDirs;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

// 编译时内置的默认配置
const DEFAULT_CONFIG: &str = include_str!("../assets/default.toml");

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub nordvpn_api_url: String,
    pub surfshark_api_url: String,
    pub cache_ttl: u64,    // 秒
    pub http_timeout: f64, // 秒
    pub nordvpn_server_limit: u32, // 0 = 全部
    pub default_page_size: usize,
    pub max_page_size: usize,
    pub log_level: Option<String>,
    pub latency: LatencySettings,
    /// Files layered over the built-in defaults, in load order.
    #[serde(skip)]
    pub loaded_from: Vec<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            nordvpn_api_url: "https://api.nordvpn.com/v1/servers".to_string(),
            surfshark_api_url: "https://api.surfshark.com/v3/server/clusters".to_string(),
            cache_ttl: 300,
            http_timeout: 30.0,
            nordvpn_server_limit: 0,
            default_page_size: 100,
            max_page_size: 1000,
            log_level: None,
            latency: LatencySettings::default(),
            loaded_from: Vec::new(),
        }
    }
}

/// Knobs for the latency prober. Defaults are the WireGuard data port with
/// small-port fallbacks and the fping batching limits.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LatencySettings {
    pub primary_port: u16,
    pub fallback_ports: Vec<u16>,
    pub tcp_timeout_ms: u64,
    pub tcp_concurrency: usize,
    pub fping_program: String,
    pub fping_timeout_ms: u64,
    pub fping_batch_size: usize,
    pub batch_timeout_base_ms: u64,
    pub batch_timeout_per_host_ms: u64,
}

impl Default for LatencySettings {
    fn default() -> Self {
        Self {
            primary_port: 51820,
            fallback_ports: vec![443, 80, 22],
            tcp_timeout_ms: 3000,
            tcp_concurrency: 50,
            fping_program: "fping".to_string(),
            fping_timeout_ms: 1000,
            fping_batch_size: 500,
            batch_timeout_base_ms: 10_000,
            batch_timeout_per_host_ms: 50,
        }
    }
}

impl LatencySettings {
    /// Ports in the order they are tried: primary first, then fallbacks.
    pub fn ports(&self) -> Vec<u16> {
        let mut ports = Vec::with_capacity(self.fallback_ports.len() + 1);
        ports.push(self.primary_port);
        ports.extend(self.fallback_ports.iter().copied());
        ports
    }

    pub fn tcp_timeout(&self) -> Duration {
        Duration::from_millis(self.tcp_timeout_ms)
    }

    /// Whole-invocation timeout for one fping batch of `hosts` entries.
    pub fn batch_timeout(&self, hosts: usize) -> Duration {
        let per_host = self.batch_timeout_per_host_ms.saturating_mul(hosts as u64);
        Duration::from_millis(self.batch_timeout_base_ms.saturating_add(per_host))
    }
}

impl Settings {
    /// Load settings.
    /// Layers, later ones overriding earlier ones key by key:
    /// 1. Built-in defaults (assets/default.toml)
    /// 2. User config (~/.config/vpnprobe/config.toml), if present
    /// 3. An explicit `--config` path (must exist)
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let user = user_config_path().filter(|p| p.exists());
        Self::load_layers(user.as_deref(), explicit)
    }

    pub fn load_layers(user: Option<&Path>, explicit: Option<&Path>) -> Result<Self> {
        let mut merged: toml::Table = toml::from_str(DEFAULT_CONFIG)?;
        let mut loaded_from = Vec::new();

        for path in user.into_iter().chain(explicit) {
            let content = fs::read_to_string(path)?;
            let layer: toml::Table = toml::from_str(&content)?;
            merge_tables(&mut merged, layer);
            loaded_from.push(path.to_path_buf());
        }

        let mut settings: Settings = toml::Value::Table(merged).try_into()?;
        settings.loaded_from = loaded_from;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn validate(&self) -> Result<()> {
        check_range("cache_ttl", self.cache_ttl, 60, 3600)?;
        if !(5.0..=120.0).contains(&self.http_timeout) {
            return Err(ProbeError::InvalidConfig(format!(
                "http_timeout must be within 5.0..=120.0, got {}",
                self.http_timeout
            )));
        }
        check_range("nordvpn_server_limit", self.nordvpn_server_limit, 0, 10_000)?;
        check_range("default_page_size", self.default_page_size, 10, 500)?;
        check_range("max_page_size", self.max_page_size, 100, 2000)?;

        if let Some(ref level) = self.log_level {
            if !LOG_LEVELS.contains(&level.to_lowercase().as_str()) {
                return Err(ProbeError::InvalidConfig(format!(
                    "log_level must be one of {}, got '{}'",
                    LOG_LEVELS.join(", "),
                    level
                )));
            }
        }

        let latency = &self.latency;
        check_range("latency.tcp_concurrency", latency.tcp_concurrency, 1, 10_000)?;
        check_range("latency.fping_batch_size", latency.fping_batch_size, 1, 500)?;
        check_range("latency.tcp_timeout_ms", latency.tcp_timeout_ms, 1, 60_000)?;
        check_range("latency.fping_timeout_ms", latency.fping_timeout_ms, 1, 60_000)?;
        check_range(
            "latency.batch_timeout_base_ms",
            latency.batch_timeout_base_ms,
            1,
            600_000,
        )?;
        check_range(
            "latency.batch_timeout_per_host_ms",
            latency.batch_timeout_per_host_ms,
            0,
            10_000,
        )?;
        if latency.primary_port == 0 || latency.fallback_ports.contains(&0) {
            return Err(ProbeError::InvalidConfig(
                "latency ports must be non-zero".to_string(),
            ));
        }
        if latency.fping_program.trim().is_empty() {
            return Err(ProbeError::InvalidConfig(
                "latency.fping_program must not be empty".to_string(),
            ));
        }

        Ok(())
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.http_timeout)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl)
    }
}

fn check_range<T>(name: &str, value: T, min: T, max: T) -> Result<()>
where
    T: PartialOrd + std::fmt::Display,
{
    if value < min || value > max {
        return Err(ProbeError::InvalidConfig(format!(
            "{} must be within {}..={}, got {}",
            name, min, max, value
        )));
    }
    Ok(())
}

/// Nested tables merge recursively; any other value replaces the base one.
fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match value {
            toml::Value::Table(incoming) => match base.get_mut(&key) {
                Some(toml::Value::Table(existing)) => merge_tables(existing, incoming),
                _ => {
                    base.insert(key, toml::Value::Table(incoming));
                }
            },
            other => {
                base.insert(key, other);
            }
        }
    }
}

pub fn user_config_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "vpnprobe").map(|dirs| dirs.config_dir().join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_are_valid() {
        let settings = Settings::default();
        settings.validate().unwrap();
        assert_eq!(settings.latency.ports(), vec![51820, 443, 80, 22]);
        assert_eq!(settings.latency.batch_timeout(500), Duration::from_secs(35));
    }

    #[test]
    fn test_partial_file_keeps_defaults() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "cache_ttl = 600\n\n[latency]\ntcp_concurrency = 8\nfallback_ports = [443]\n",
        )?;

        let settings = Settings::load_layers(None, Some(&path))?;
        assert_eq!(settings.cache_ttl, 600);
        assert_eq!(settings.latency.tcp_concurrency, 8);
        assert_eq!(settings.latency.ports(), vec![51820, 443]);
        assert_eq!(settings.latency.fping_batch_size, 500);
        assert_eq!(settings.nordvpn_api_url, Settings::default().nordvpn_api_url);
        Ok(())
    }

    #[test]
    fn test_out_of_range_values_are_rejected() {
        let settings = Settings::from_toml("cache_ttl = 5").unwrap();
        assert!(matches!(settings.validate(), Err(ProbeError::InvalidConfig(_))));

        let settings = Settings::from_toml("[latency]\nfping_batch_size = 501").unwrap();
        assert!(matches!(settings.validate(), Err(ProbeError::InvalidConfig(_))));

        let settings = Settings::from_toml("[latency]\ntcp_concurrency = 0").unwrap();
        assert!(settings.validate().is_err());

        let settings = Settings::from_toml("log_level = \"loud\"").unwrap();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(matches!(
            Settings::load_layers(None, Some(&missing)),
            Err(ProbeError::Io(_))
        ));
    }

    #[test]
    fn test_builtin_defaults_match_default_impl() -> Result<()> {
        assert_eq!(Settings::load_layers(None, None)?, Settings::default());
        Ok(())
    }

    #[test]
    fn test_explicit_file_overrides_user_file() -> Result<()> {
        let dir = tempdir()?;
        let user = dir.path().join("user.toml");
        let explicit = dir.path().join("explicit.toml");
        fs::write(&user, "cache_ttl = 600\n\n[latency]\ntcp_concurrency = 8\n")?;
        fs::write(&explicit, "[latency]\ntcp_concurrency = 16\nfallback_ports = [443]\n")?;

        let settings = Settings::load_layers(Some(&user), Some(&explicit))?;
        assert_eq!(settings.cache_ttl, 600);
        assert_eq!(settings.latency.tcp_concurrency, 16);
        assert_eq!(settings.latency.ports(), vec![51820, 443]);
        assert_eq!(settings.latency.fping_batch_size, 500);
        assert_eq!(settings.loaded_from, vec![user, explicit]);
        Ok(())
    }

    #[test]
    fn test_huge_batch_timeouts_are_rejected() {
        for content in [
            "[latency]\nbatch_timeout_base_ms = 9223372036854775807",
            "[latency]\nbatch_timeout_per_host_ms = 10001",
        ] {
            let settings = Settings::from_toml(content).unwrap();
            assert!(matches!(settings.validate(), Err(ProbeError::InvalidConfig(_))));
        }
    }

    #[test]
    fn test_batch_timeout_saturates() {
        let latency = LatencySettings {
            batch_timeout_base_ms: u64::MAX,
            batch_timeout_per_host_ms: u64::MAX,
            ..LatencySettings::default()
        };
        assert_eq!(latency.batch_timeout(500), Duration::from_millis(u64::MAX));
        assert_eq!(
            LatencySettings::default().batch_timeout(3),
            Duration::from_millis(10_150)
        );
    }
}
