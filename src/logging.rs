use tracing_subscriber::EnvFilter;

/// Picks the filter: `RUST_LOG` first, then `--verbose`, then the configured
/// level, then `info`.
fn build_filter(verbose: bool, configured: Option<&str>) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }

    let level = if verbose {
        "debug"
    } else {
        configured.unwrap_or("info")
    };
    EnvFilter::new(level.to_lowercase())
}

/// 日志写到 stderr, stdout 只输出结果
pub fn init(verbose: bool, configured: Option<&str>) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(build_filter(verbose, configured))
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
