use crate::error::Result;
use crate::types::{ProbeResult, Provider, VpnServer};
use async_trait::async_trait;
use std::time::Duration;

/// ServerSource: 每个 VPN 提供商的服务器列表来源
#[async_trait]
pub trait ServerSource: Sync + Send {
    fn provider(&self) -> Provider;

    /// 获取全部服务器 (已转换为统一格式)
    async fn get_servers(&self) -> Result<Vec<VpnServer>>;

    /// 按国家代码过滤 (大小写不敏感)
    async fn get_servers_by_country(&self, country_code: &str) -> Result<Vec<VpnServer>>;
}

/// Measures one bare host. Network failures are reported through
/// `ProbeResult::success`, never as an error.
#[async_trait]
pub trait HostProbe: Sync + Send {
    async fn probe(&self, host: &str) -> ProbeResult;
}

/// External bulk-ping utility.
#[async_trait]
pub trait PingRunner: Sync + Send {
    /// Whether the utility can be launched on this machine.
    fn is_available(&self) -> bool;

    /// Runs one batch and returns the diagnostic output stream.
    /// Exceeding `timeout` yields `ProbeError::Timeout`.
    async fn run(&self, hosts: &[String], timeout: Duration) -> Result<String>;
}
