mod config;
mod error;
mod latency;
mod logging;
mod sources;
mod traits;
mod types;
mod utils;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use config::Settings;
use latency::LatencyService;
use reqwest::Client;
use serde::Serialize;
use sources::get_source;
use std::path::PathBuf;
use tracing::{debug, info};
use traits::ServerSource;
use types::{CountryInfo, MeasureMethod, Provider, VpnServer};

#[derive(Parser)]
#[command(name = "vpnprobe")]
#[command(
    about = "Aggregate VPN server lists and rank them by measured latency",
    long_about = None
)]
struct Cli {
    /// Enable debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Path to a config file (defaults to ~/.config/vpnprobe/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List servers (e.g., vpnprobe servers nordvpn --country US)
    Servers {
        /// The provider (nordvpn, surfshark)
        provider: String,

        /// ISO 3166-1 alpha-2 country code
        #[arg(long, short)]
        country: Option<String>,

        /// Page number (1-indexed)
        #[arg(long, default_value_t = 1)]
        page: usize,

        /// Results per page (defaults to the configured page size)
        #[arg(long)]
        page_size: Option<usize>,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// List countries that have servers. Covers all providers if omitted.
    Countries {
        provider: Option<String>,
    },
    /// Best servers by known latency, then load
    Top {
        provider: String,

        #[arg(long, short, default_value_t = 10)]
        limit: usize,

        #[arg(long, short)]
        country: Option<String>,
    },
    /// Measure latency (e.g., vpnprobe latency surfshark --method tcp)
    Latency {
        provider: String,

        #[arg(long, short)]
        country: Option<String>,

        /// Maximum number of servers to measure (0 = all)
        #[arg(long, short, default_value_t = 0)]
        limit: usize,

        /// auto (fping if installed, else tcp), fping, or tcp
        #[arg(long, short, default_value = "auto")]
        method: MeasureMethod,

        #[arg(long)]
        json: bool,
    },
    /// Measure and return the fastest reachable servers
    Fastest {
        provider: String,

        #[arg(long, short, default_value_t = 10)]
        limit: usize,

        #[arg(long, short)]
        country: Option<String>,

        /// Number of lowest-load servers to measure (0 = all)
        #[arg(long, default_value_t = 0)]
        measure_count: usize,

        /// Countries to skip, hyphen-separated (e.g., BR-US-DE)
        #[arg(long, short)]
        exclude: Option<String>,
    },
}

#[derive(Serialize)]
struct LatencyReport {
    total_servers: usize,
    measured: usize,
    successful: usize,
    failed: usize,
    method: String,
    servers: Vec<VpnServer>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = Settings::load(cli.config.as_deref())?;
    logging::init(cli.verbose, settings.log_level.as_deref());
    if settings.loaded_from.is_empty() {
        debug!("No config file found, using built-in defaults");
    }
    for path in &settings.loaded_from {
        info!("Loaded settings from {:?}", path);
    }
    let client = sources::build_client(&settings)?;

    match cli.command {
        Commands::Servers {
            provider,
            country,
            page,
            page_size,
            json,
        } => {
            handle_servers(&settings, &client, &provider, country, page, page_size, json).await?
        }
        Commands::Countries { provider } => handle_countries(&settings, &client, provider).await?,
        Commands::Top {
            provider,
            limit,
            country,
        } => handle_top(&settings, &client, &provider, limit, country).await?,
        Commands::Latency {
            provider,
            country,
            limit,
            method,
            json,
        } => handle_latency(&settings, &client, &provider, country, limit, method, json).await?,
        Commands::Fastest {
            provider,
            limit,
            country,
            measure_count,
            exclude,
        } => {
            handle_fastest(&settings, &client, &provider, limit, country, measure_count, exclude)
                .await?
        }
    }

    Ok(())
}

// --- Handlers ---

async fn load_servers(source: &dyn ServerSource, country: Option<&str>) -> Result<Vec<VpnServer>> {
    match country {
        Some(code) => {
            let servers = source.get_servers_by_country(code).await?;
            if servers.is_empty() {
                bail!(
                    "No servers found for country '{}' with provider '{}'.",
                    code.to_uppercase(),
                    source.provider()
                );
            }
            Ok(servers)
        }
        None => Ok(source.get_servers().await?),
    }
}

async fn handle_servers(
    settings: &Settings,
    client: &Client,
    provider: &str,
    country: Option<String>,
    page: usize,
    page_size: Option<usize>,
    json: bool,
) -> Result<()> {
    let page_size = page_size.unwrap_or(settings.default_page_size);
    if page == 0 || page_size == 0 || page_size > settings.max_page_size {
        bail!(
            "page must be >= 1 and page-size within 1..={}",
            settings.max_page_size
        );
    }

    let source = get_source(provider, client, settings)?;
    let servers = load_servers(source.as_ref(), country.as_deref()).await?;

    let result = utils::paginate(&servers, page, page_size);
    if page > result.total_pages && result.total > 0 {
        bail!(
            "Page {} does not exist. Total pages: {}",
            page,
            result.total_pages
        );
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&result.data)?);
        return Ok(());
    }

    print_servers(&result.data, (result.page - 1) * result.page_size);
    println!(
        "Page {}/{} ({} servers total)",
        result.page, result.total_pages, result.total
    );

    Ok(())
}

async fn handle_countries(
    settings: &Settings,
    client: &Client,
    provider: Option<String>,
) -> Result<()> {
    let providers = match provider {
        Some(name) => vec![name.parse::<Provider>()?],
        None => Provider::ALL.to_vec(),
    };

    // 各提供商并发拉取
    let tasks = providers.iter().map(|&p| async move {
        let source = sources::source_for(p, client, settings);
        let servers = source.get_servers().await;
        (p, servers)
    });
    let results = futures::future::join_all(tasks).await;

    for (provider, servers) in results {
        let countries: Vec<CountryInfo> = utils::country_index(&servers?);

        println!("{} ({} countries)", provider, countries.len());
        println!("{}", "-".repeat(40));
        for country in &countries {
            println!("  {}", country.display);
        }
        println!();
    }

    Ok(())
}

async fn handle_top(
    settings: &Settings,
    client: &Client,
    provider: &str,
    limit: usize,
    country: Option<String>,
) -> Result<()> {
    if !(1..=50).contains(&limit) {
        bail!("limit must be within 1..=50");
    }

    let source = get_source(provider, client, settings)?;
    let mut servers = load_servers(source.as_ref(), country.as_deref()).await?;

    utils::sort_by_performance(&mut servers);
    servers.truncate(limit);

    info!("Returning top {} servers", servers.len());
    print_servers(&servers, 0);

    Ok(())
}

async fn handle_latency(
    settings: &Settings,
    client: &Client,
    provider: &str,
    country: Option<String>,
    limit: usize,
    method: MeasureMethod,
    json: bool,
) -> Result<()> {
    if limit > 5000 {
        bail!("limit must be within 0..=5000");
    }

    let source = get_source(provider, client, settings)?;
    let mut servers = load_servers(source.as_ref(), country.as_deref()).await?;
    if limit > 0 {
        servers.truncate(limit);
    }
    let total = servers.len();

    let service = LatencyService::new(&settings.latency);
    let pb = utils::spinner(&format!("Measuring {} servers...", total), !json);
    let mut measured = service.measure_servers(&servers, method).await;
    pb.finish_and_clear();

    utils::sort_by_latency(&mut measured);
    let summary = utils::summarize(&measured);
    let actual_method = service.effective_method(method);

    info!(
        "Latency measurement complete: {}/{} successful, method={}",
        summary.successful, total, actual_method
    );

    if json {
        let report = LatencyReport {
            total_servers: total,
            measured: summary.measured,
            successful: summary.successful,
            failed: summary.failed,
            method: actual_method.to_string(),
            servers: measured,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    print_servers(&measured, 0);
    println!(
        "Measured {} servers with {}: {} reachable, {} unreachable",
        summary.measured, actual_method, summary.successful, summary.failed
    );

    Ok(())
}

async fn handle_fastest(
    settings: &Settings,
    client: &Client,
    provider: &str,
    limit: usize,
    country: Option<String>,
    measure_count: usize,
    exclude: Option<String>,
) -> Result<()> {
    if !(1..=50).contains(&limit) {
        bail!("limit must be within 1..=50");
    }

    let source = get_source(provider, client, settings)?;
    let mut servers = load_servers(source.as_ref(), country.as_deref()).await?;

    if let Some(ref spec) = exclude {
        let excluded = utils::parse_excluded_countries(spec);
        servers.retain(|s| !excluded.contains(&s.country_code));
        if servers.is_empty() {
            let codes: Vec<&str> = excluded.iter().map(String::as_str).collect();
            bail!(
                "No servers found after excluding countries: {}",
                codes.join(", ")
            );
        }
    }

    let count = if measure_count == 0 {
        servers.len()
    } else {
        measure_count.min(servers.len())
    };

    // 先测负载低的服务器; 没有负载数据的按 50 处理
    servers.sort_by_key(|s| s.load.unwrap_or(50));
    servers.truncate(count);

    info!(
        "Finding {} fastest {} servers (measuring {})",
        limit, provider, count
    );

    let service = LatencyService::new(&settings.latency);
    let pb = utils::spinner(&format!("Measuring {} servers...", count), true);
    let measured = service.measure_servers(&servers, MeasureMethod::Auto).await;
    pb.finish_and_clear();

    let mut reachable: Vec<VpnServer> = measured
        .into_iter()
        .filter(|s| s.latency.is_some())
        .collect();
    if reachable.is_empty() {
        bail!("Could not reach any servers. Check network connectivity.");
    }

    utils::sort_by_latency(&mut reachable);
    reachable.truncate(limit);

    if let Some(best) = reachable.first().and_then(|s| s.latency) {
        info!(
            "Found {} fastest servers (best latency: {:.1}ms)",
            reachable.len(),
            best
        );
    }
    print_servers(&reachable, 0);

    Ok(())
}

fn print_servers(servers: &[VpnServer], offset: usize) {
    println!("{}", "-".repeat(96));
    println!(
        "{:<5} {:<10} {:<36} {:<4} {:<20} {:>5} {:>10}",
        "#", "PROVIDER", "HOST", "CC", "COUNTRY", "LOAD", "LATENCY"
    );
    println!("{}", "-".repeat(96));

    for (i, server) in servers.iter().enumerate() {
        let load = server
            .load
            .map(|l| format!("{}%", l))
            .unwrap_or_else(|| "-".to_string());
        let latency = server
            .latency
            .map(|ms| format!("{:.2}ms", ms))
            .unwrap_or_else(|| "-".to_string());

        // Truncate long names so the columns stay aligned
        let mut country = server.country.clone();
        if country.chars().count() > 20 {
            country = format!("{}...", country.chars().take(17).collect::<String>());
        }

        println!(
            "{:<5} {:<10} {:<36} {:<4} {:<20} {:>5} {:>10}",
            offset + i + 1,
            server.provider,
            server.identifier,
            server.country_code,
            country,
            load,
            latency
        );
    }
    println!("{}", "-".repeat(96));
}
