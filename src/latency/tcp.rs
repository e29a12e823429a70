use crate::config::LatencySettings;
use crate::traits::HostProbe;
use crate::types::{ProbeMethod, ProbeResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::debug;

/// TCP connect latency against an ordered list of ports.
///
/// Ports are tried one after another, never in parallel. The first port that
/// accepts the handshake wins; the connection is dropped right away.
pub struct TcpProbe {
    ports: Vec<u16>,
    timeout: Duration,
}

impl TcpProbe {
    pub fn new(ports: Vec<u16>, timeout: Duration) -> Self {
        Self { ports, timeout }
    }

    pub fn from_settings(settings: &LatencySettings) -> Self {
        Self::new(settings.ports(), settings.tcp_timeout())
    }
}

#[async_trait]
impl HostProbe for TcpProbe {
    async fn probe(&self, host: &str) -> ProbeResult {
        for &port in &self.ports {
            if let Some(elapsed) = connect_once(host, port, self.timeout).await {
                let latency_ms = elapsed.as_secs_f64() * 1000.0;
                return ProbeResult::reachable(host, latency_ms, ProbeMethod::Tcp(Some(port)));
            }
        }

        ProbeResult::unreachable(host, ProbeMethod::Tcp(None))
    }
}

async fn connect_once(host: &str, port: u16, timeout: Duration) -> Option<Duration> {
    let started = Instant::now();
    match tokio::time::timeout(timeout, TcpStream::connect((host, port))).await {
        Ok(Ok(stream)) => {
            let elapsed = started.elapsed();
            drop(stream);
            Some(elapsed)
        }
        Ok(Err(err)) => {
            debug!("TCP connect to {}:{} failed: {}", host, port, err);
            None
        }
        Err(_) => {
            debug!("TCP connect to {}:{} timed out", host, port);
            None
        }
    }
}

/// Runs a `HostProbe` over many hosts with at most `concurrency` probes in
/// flight.
#[derive(Clone)]
pub struct BoundedProber {
    probe: Arc<dyn HostProbe>,
    concurrency: usize,
}

impl BoundedProber {
    pub fn new(probe: Arc<dyn HostProbe>, concurrency: usize) -> Self {
        Self {
            probe,
            concurrency: concurrency.max(1),
        }
    }

    /// 并发测试所有主机
    ///
    /// Every input host gets an entry. A task that dies (panic) is recorded
    /// as unreachable for its host only.
    pub async fn measure(&self, hosts: &[String]) -> HashMap<String, ProbeResult> {
        if hosts.is_empty() {
            return HashMap::new();
        }

        let limit = Arc::new(Semaphore::new(self.concurrency));
        let mut set = JoinSet::new();

        for host in hosts {
            let host = host.clone();
            let limit = Arc::clone(&limit);
            let probe = Arc::clone(&self.probe);
            set.spawn(async move {
                let _permit = limit.acquire_owned().await.ok();
                let result = probe.probe(&host).await;
                (host, result)
            });
        }

        let mut results = HashMap::with_capacity(hosts.len());
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((host, result)) => {
                    results.insert(host, result);
                }
                Err(err) => debug!("TCP probe task failed: {}", err),
            }
        }

        for host in hosts {
            if !results.contains_key(host) {
                let missing = ProbeResult::unreachable(host, ProbeMethod::Tcp(None));
                results.insert(host.clone(), missing);
            }
        }

        results
    }
}
