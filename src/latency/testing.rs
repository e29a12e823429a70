//! Instrumented probes and runners shared by the latency tests.

use crate::error::Result;
use crate::traits::{HostProbe, PingRunner};
use crate::types::{ProbeMethod, ProbeResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

pub fn hosts(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("host-{}", i)).collect()
}

pub fn fping_ok(host: &str, avg: f64) -> String {
    format!(
        "{} : xmt/rcv/%loss = 1/1/0%, min/avg/max = {:.2}/{:.2}/{:.2}",
        host, avg, avg, avg
    )
}

pub fn fping_lost(host: &str) -> String {
    format!("{} : xmt/rcv/%loss = 1/0/100%", host)
}

/// Probe that records call counts and the in-flight high-water mark.
/// Answers every host as reachable on port 51820 unless told otherwise.
#[derive(Default)]
pub struct TrackingProbe {
    delay: Duration,
    host_delays: HashMap<String, Duration>,
    latencies: HashMap<String, f64>,
    panic_on: Option<String>,
    in_flight: AtomicUsize,
    high_water: AtomicUsize,
    calls: Mutex<HashMap<String, usize>>,
}

impl TrackingProbe {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn panicking_on(host: &str) -> Self {
        Self {
            panic_on: Some(host.to_string()),
            ..Self::default()
        }
    }

    pub fn latency(mut self, host: &str, ms: f64) -> Self {
        self.latencies.insert(host.to_string(), ms);
        self
    }

    pub fn host_delay(mut self, host: &str, delay: Duration) -> Self {
        self.host_delays.insert(host.to_string(), delay);
        self
    }

    pub fn high_water(&self) -> usize {
        self.high_water.load(Ordering::SeqCst)
    }

    pub fn calls_for(&self, host: &str) -> usize {
        self.calls.lock().unwrap().get(host).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }
}

#[async_trait]
impl HostProbe for TrackingProbe {
    async fn probe(&self, host: &str) -> ProbeResult {
        *self.calls.lock().unwrap().entry(host.to_string()).or_default() += 1;

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.high_water.fetch_max(now, Ordering::SeqCst);

        let delay = self.host_delays.get(host).copied().unwrap_or(self.delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.panic_on.as_deref() == Some(host) {
            panic!("probe exploded for {}", host);
        }

        let latency = self.latencies.get(host).copied().unwrap_or(10.0);
        ProbeResult::reachable(host, latency, ProbeMethod::Tcp(Some(51820)))
    }
}

type Responder = Box<dyn Fn(&[String]) -> Result<String> + Send + Sync>;

/// Stand-in for the fping binary.
pub struct FakeRunner {
    available: bool,
    checks: AtomicUsize,
    batches: Mutex<Vec<Vec<String>>>,
    timeouts: Mutex<Vec<Duration>>,
    respond: Responder,
}

impl FakeRunner {
    pub fn new<F>(respond: F) -> Self
    where
        F: Fn(&[String]) -> Result<String> + Send + Sync + 'static,
    {
        Self {
            available: true,
            checks: AtomicUsize::new(0),
            batches: Mutex::new(Vec::new()),
            timeouts: Mutex::new(Vec::new()),
            respond: Box::new(respond),
        }
    }

    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::new(|_| Ok(String::new()))
        }
    }

    /// Every host answers with the given average latency.
    pub fn all_reachable(avg: f64) -> Self {
        Self::new(move |hosts| {
            Ok(hosts
                .iter()
                .map(|h| fping_ok(h, avg))
                .collect::<Vec<_>>()
                .join("\n"))
        })
    }

    /// Every host reports 100% loss.
    pub fn all_lost() -> Self {
        Self::new(|hosts| {
            Ok(hosts
                .iter()
                .map(|h| fping_lost(h))
                .collect::<Vec<_>>()
                .join("\n"))
        })
    }

    pub fn checks(&self) -> usize {
        self.checks.load(Ordering::SeqCst)
    }

    pub fn batches(&self) -> Vec<Vec<String>> {
        self.batches.lock().unwrap().clone()
    }

    /// Timeout handed to each `run` call, in call order.
    pub fn timeouts(&self) -> Vec<Duration> {
        self.timeouts.lock().unwrap().clone()
    }
}

#[async_trait]
impl PingRunner for FakeRunner {
    fn is_available(&self) -> bool {
        self.checks.fetch_add(1, Ordering::SeqCst);
        self.available
    }

    async fn run(&self, hosts: &[String], timeout: Duration) -> Result<String> {
        self.batches.lock().unwrap().push(hosts.to_vec());
        self.timeouts.lock().unwrap().push(timeout);
        (self.respond)(hosts)
    }
}
