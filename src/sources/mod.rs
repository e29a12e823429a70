pub mod nordvpn;
pub mod surfshark;

use crate::config::Settings;
use crate::error::{ProbeError, Result};
use crate::traits::ServerSource;
use crate::types::{normalize_country_code, Provider, VpnServer};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, error, info};

pub const SUPPORTED_PROVIDERS: &[&str] = &["nordvpn", "surfshark"];

pub fn get_source(
    name: &str,
    client: &Client,
    settings: &Settings,
) -> Result<Box<dyn ServerSource>> {
    let provider: Provider = name.parse()?;
    Ok(Box::new(source_for(provider, client, settings)))
}

pub fn source_for(provider: Provider, client: &Client, settings: &Settings) -> ProviderSource {
    let url = match provider {
        Provider::NordVpn => {
            nordvpn::servers_url(&settings.nordvpn_api_url, settings.nordvpn_server_limit)
        }
        Provider::Surfshark => settings.surfshark_api_url.clone(),
    };
    ProviderSource::new(provider, client.clone(), url, settings.cache_ttl())
}

/// Shared HTTP client for all provider requests.
pub fn build_client(settings: &Settings) -> Result<Client> {
    Ok(Client::builder()
        .timeout(settings.http_timeout())
        .user_agent(concat!("vpnprobe/", env!("CARGO_PKG_VERSION")))
        .build()?)
}

struct CachedServers {
    fetched_at: Instant,
    servers: Vec<VpnServer>,
}

/// Fetches one provider's server list and keeps it for `ttl`.
pub struct ProviderSource {
    provider: Provider,
    client: Client,
    url: String,
    ttl: Duration,
    cache: Mutex<Option<CachedServers>>,
}

impl ProviderSource {
    pub fn new(provider: Provider, client: Client, url: String, ttl: Duration) -> Self {
        Self {
            provider,
            client,
            url,
            ttl,
            cache: Mutex::new(None),
        }
    }

    async fn fetch(&self) -> Result<Vec<VpnServer>> {
        info!("Fetching {} servers from: {}", self.provider, self.url);

        let response = self.client.get(&self.url).send().await?;
        let status = response.status();
        if !status.is_success() {
            error!("{} API HTTP error: {}", self.provider, status);
            return Err(ProbeError::ProviderApi {
                provider: self.provider.to_string(),
                status: status.as_u16(),
            });
        }

        let data: Value = response.json().await?;
        let servers = match self.provider {
            Provider::NordVpn => nordvpn::parse_servers(&data)?,
            Provider::Surfshark => surfshark::parse_servers(&data)?,
        };

        info!("Successfully parsed {} {} servers", servers.len(), self.provider);
        Ok(servers)
    }
}

#[async_trait]
impl ServerSource for ProviderSource {
    fn provider(&self) -> Provider {
        self.provider
    }

    async fn get_servers(&self) -> Result<Vec<VpnServer>> {
        // 持有锁期间请求, 并发调用只会触发一次拉取
        let mut cache = self.cache.lock().await;
        if let Some(ref cached) = *cache {
            if cached.fetched_at.elapsed() < self.ttl {
                debug!("Using cached {} server list", self.provider);
                return Ok(cached.servers.clone());
            }
        }

        let servers = self.fetch().await?;
        *cache = Some(CachedServers {
            fetched_at: Instant::now(),
            servers: servers.clone(),
        });
        Ok(servers)
    }

    async fn get_servers_by_country(&self, country_code: &str) -> Result<Vec<VpnServer>> {
        let code = normalize_country_code(country_code)?;
        let filtered: Vec<VpnServer> = self
            .get_servers()
            .await?
            .into_iter()
            .filter(|s| s.country_code == code)
            .collect();

        info!("Found {} {} servers for {}", filtered.len(), self.provider, code);
        Ok(filtered)
    }
}
