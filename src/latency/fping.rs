use crate::config::LatencySettings;
use crate::error::{ProbeError, Result};
use crate::latency::tcp::BoundedProber;
use crate::traits::PingRunner;
use crate::types::{ProbeMethod, ProbeResult};
use async_trait::async_trait;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::env;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, LazyLock, OnceLock};
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, error, info, warn};

/// Launches the real `fping` binary.
///
/// Arguments: `-c 1 -t <ms> -q -e <hosts...>`. Per-host summaries arrive on
/// stderr; stdout is drained and discarded.
pub struct FpingCommand {
    program: String,
    per_host_timeout_ms: u64,
}

impl FpingCommand {
    pub fn new(program: &str, per_host_timeout_ms: u64) -> Self {
        Self {
            program: program.to_string(),
            per_host_timeout_ms,
        }
    }

    pub fn from_settings(settings: &LatencySettings) -> Self {
        Self::new(&settings.fping_program, settings.fping_timeout_ms)
    }
}

#[async_trait]
impl PingRunner for FpingCommand {
    fn is_available(&self) -> bool {
        find_executable(&self.program).is_some()
    }

    async fn run(&self, hosts: &[String], timeout: Duration) -> Result<String> {
        let mut cmd = Command::new(&self.program);
        cmd.arg("-c")
            .arg("1")
            .arg("-t")
            .arg(self.per_host_timeout_ms.to_string())
            .arg("-q")
            .arg("-e")
            .args(hosts)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!("Running {} for {} hosts", self.program, hosts.len());
        let child = cmd.spawn()?;

        // wait_with_output 同时读取 stdout/stderr, 避免管道写满导致死锁
        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(output) => output?,
            Err(_) => return Err(ProbeError::Timeout(timeout.as_millis() as u64)),
        };

        // fping exits non-zero whenever a host is unreachable, so the status
        // code carries no signal here.
        Ok(String::from_utf8_lossy(&output.stderr).into_owned())
    }
}

/// Locate an executable the way a shell would: a path with a separator is
/// checked directly, a bare name is searched on `PATH`.
pub fn find_executable(program: &str) -> Option<PathBuf> {
    let candidate = Path::new(program);
    if candidate.components().count() > 1 {
        return is_executable(candidate).then(|| candidate.to_path_buf());
    }

    let paths = env::var_os("PATH")?;
    env::split_paths(&paths)
        .map(|dir| dir.join(program))
        .find(|path| is_executable(path))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

static LINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<host>\S+)\s+:\s+(?P<summary>.*)$").expect("valid fping line regex")
});
static LOSS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"xmt/rcv/%loss\s*=\s*\d+/\d+/(?P<loss>\d+)%")
        .expect("valid fping loss regex")
});
static RTT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"min/avg/max\s*=\s*[\d.]+/(?P<avg>[\d.]+)/[\d.]+")
        .expect("valid fping rtt regex")
});

/// 解析 fping 的汇总输出
///
/// One line per host:
/// `host : xmt/rcv/%loss = 1/1/0%, min/avg/max = 10.5/10.5/10.5`
/// `host : xmt/rcv/%loss = 1/0/100%`
///
/// Only the English summary format of fping 3.x/4.x/5.x is understood. Lines
/// that do not fit are skipped.
pub fn parse_fping_output(output: &str) -> Vec<ProbeResult> {
    let mut results = Vec::new();

    for line in output.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let Some(caps) = LINE_RE.captures(line) else {
            debug!("Skipping unrecognized fping line '{}'", line);
            continue;
        };
        let host = &caps["host"];
        let summary = &caps["summary"];

        let total_loss = LOSS_RE
            .captures(summary)
            .is_some_and(|c| &c["loss"] == "100");
        if total_loss {
            results.push(ProbeResult::unreachable(host, ProbeMethod::Fping));
            continue;
        }

        match RTT_RE.captures(summary).map(|c| c["avg"].parse::<f64>()) {
            Some(Ok(avg)) => {
                results.push(ProbeResult::reachable(host, avg, ProbeMethod::Fping));
            }
            Some(Err(e)) => debug!("Failed to parse fping line '{}': {}", line, e),
            None => debug!("No latency in fping line '{}'", line),
        }
    }

    results
}

/// Bulk measurement through fping, with TCP as the safety net.
///
/// - tool missing: every call goes straight to TCP
/// - batch timeout: that batch's hosts are unreachable, other batches continue
/// - spawn failure, or zero successes overall: the whole host list is
///   re-measured over TCP
pub struct BulkPinger {
    runner: Arc<dyn PingRunner>,
    fallback: BoundedProber,
    batch_size: usize,
    settings: LatencySettings,
    available: OnceLock<bool>,
}

impl BulkPinger {
    pub fn new(
        runner: Arc<dyn PingRunner>,
        fallback: BoundedProber,
        settings: &LatencySettings,
    ) -> Self {
        Self {
            runner,
            fallback,
            batch_size: settings.fping_batch_size.max(1),
            settings: settings.clone(),
            available: OnceLock::new(),
        }
    }

    /// Checked once per instance, on first use.
    pub fn is_available(&self) -> bool {
        *self.available.get_or_init(|| {
            let available = self.runner.is_available();
            if available {
                info!("fping detected - using it for bulk latency measurements");
            } else {
                info!("fping not found - using TCP fallback for latency");
            }
            available
        })
    }

    pub async fn measure(&self, hosts: &[String]) -> HashMap<String, ProbeResult> {
        if hosts.is_empty() {
            return HashMap::new();
        }
        if !self.is_available() {
            return self.fallback.measure(hosts).await;
        }

        match self.measure_batches(hosts).await {
            Ok(results) => {
                if results.values().any(|r| r.success) {
                    results
                } else {
                    warn!("fping returned no successful results, falling back to TCP");
                    self.fallback.measure(hosts).await
                }
            }
            Err(e) => {
                error!("fping error: {}, falling back to TCP", e);
                self.fallback.measure(hosts).await
            }
        }
    }

    async fn measure_batches(&self, hosts: &[String]) -> Result<HashMap<String, ProbeResult>> {
        let mut results = HashMap::with_capacity(hosts.len());
        let total_batches = hosts.len().div_ceil(self.batch_size);

        for (idx, batch) in hosts.chunks(self.batch_size).enumerate() {
            if total_batches > 1 {
                info!(
                    "fping batch {}/{} ({} hosts)",
                    idx + 1,
                    total_batches,
                    batch.len()
                );
            }

            let timeout = self.settings.batch_timeout(batch.len());
            match self.runner.run(batch, timeout).await {
                Ok(output) => {
                    let wanted: HashSet<&str> = batch.iter().map(String::as_str).collect();
                    for result in parse_fping_output(&output) {
                        if wanted.contains(result.host.as_str()) {
                            results.insert(result.host.clone(), result);
                        }
                    }
                }
                Err(ProbeError::Timeout(ms)) => {
                    warn!("fping batch timed out after {} ms for {} hosts", ms, batch.len());
                }
                Err(e) => return Err(e),
            }

            // 没有输出行的主机 (例如域名无法解析) 视为不可达
            for host in batch {
                if !results.contains_key(host) {
                    let missing = ProbeResult::unreachable(host, ProbeMethod::Fping);
                    results.insert(host.clone(), missing);
                }
            }
        }

        Ok(results)
    }
}
