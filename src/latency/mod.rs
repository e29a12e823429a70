pub mod fping;
pub mod host;
pub mod tcp;

#[cfg(test)]
pub(crate) mod testing;

use crate::config::LatencySettings;
use crate::traits::{HostProbe, PingRunner};
use crate::types::{MeasureMethod, ProbeResult, VpnServer};
use fping::{BulkPinger, FpingCommand};
use host::extract_host;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tcp::{BoundedProber, TcpProbe};
use tracing::{debug, info};

/// Measures server latency and writes it back onto server records.
pub struct LatencyService {
    bulk: BulkPinger,
    tcp: BoundedProber,
}

impl LatencyService {
    pub fn new(settings: &LatencySettings) -> Self {
        Self::with_components(
            Arc::new(FpingCommand::from_settings(settings)),
            Arc::new(TcpProbe::from_settings(settings)),
            settings,
        )
    }

    pub fn with_components(
        runner: Arc<dyn PingRunner>,
        probe: Arc<dyn HostProbe>,
        settings: &LatencySettings,
    ) -> Self {
        let tcp = BoundedProber::new(probe, settings.tcp_concurrency);
        let bulk = BulkPinger::new(runner, tcp.clone(), settings);
        Self { bulk, tcp }
    }

    /// Whether fping is installed. Detected on first access, then cached for
    /// the lifetime of this instance.
    pub fn bulk_ping_available(&self) -> bool {
        self.bulk.is_available()
    }

    /// The strategy a request for `requested` actually runs with.
    pub fn effective_method(&self, requested: MeasureMethod) -> MeasureMethod {
        match requested {
            MeasureMethod::Auto | MeasureMethod::Fping if self.bulk_ping_available() => {
                MeasureMethod::Fping
            }
            _ => MeasureMethod::Tcp,
        }
    }

    /// Latency per unique bare host. Servers sharing a host are probed once.
    pub async fn measure_bulk(
        &self,
        servers: &[VpnServer],
        method: MeasureMethod,
    ) -> HashMap<String, ProbeResult> {
        if servers.is_empty() {
            return HashMap::new();
        }

        let hosts = unique_hosts(servers);
        info!(
            "Measuring latency for {} unique hosts using method={}",
            hosts.len(),
            method
        );

        let results = match method {
            MeasureMethod::Auto | MeasureMethod::Fping => self.bulk.measure(&hosts).await,
            MeasureMethod::Tcp => self.tcp.measure(&hosts).await,
        };

        for result in results.values() {
            debug!("{} -> {:?} ms via {}", result.host, result.latency_ms, result.method);
        }
        info!(
            "Latency measurement complete: {}/{} successful",
            results.values().filter(|r| r.success).count(),
            results.len()
        );

        results
    }

    /// Returns new records in input order, each with `latency` set to the
    /// rounded measurement or cleared when its host was unreachable.
    pub async fn measure_servers(
        &self,
        servers: &[VpnServer],
        method: MeasureMethod,
    ) -> Vec<VpnServer> {
        if servers.is_empty() {
            return Vec::new();
        }

        let results = self.measure_bulk(servers, method).await;

        servers
            .iter()
            .map(|server| {
                let latency = results
                    .get(extract_host(&server.identifier))
                    .filter(|r| r.success)
                    .and_then(|r| r.latency_ms)
                    .map(round_latency);
                server.with_latency(latency)
            })
            .collect()
    }
}

fn unique_hosts(servers: &[VpnServer]) -> Vec<String> {
    let mut seen = HashSet::new();
    servers
        .iter()
        .map(|s| extract_host(&s.identifier))
        .filter(|host| seen.insert(*host))
        .map(str::to_string)
        .collect()
}

/// 保留两位小数
pub fn round_latency(ms: f64) -> f64 {
    (ms * 100.0).round() / 100.0
}
