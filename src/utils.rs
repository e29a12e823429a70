use crate::types::{CountryInfo, VpnServer};
use indicatif::{ProgressBar, ProgressStyle};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

/// 一页结果及分页信息
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub total: usize,
    pub page: usize,
    pub page_size: usize,
    pub total_pages: usize,
    pub data: Vec<T>,
}

/// 1-indexed pagination. A page past the end yields an empty `data`.
pub fn paginate<T: Clone>(items: &[T], page: usize, page_size: usize) -> Page<T> {
    let page = page.max(1);
    let page_size = page_size.max(1);
    let total = items.len();
    let start = (page - 1).saturating_mul(page_size).min(total);
    let end = start.saturating_add(page_size).min(total);

    Page {
        total,
        page,
        page_size,
        total_pages: total.div_ceil(page_size),
        data: items[start..end].to_vec(),
    }
}

fn missing_last<T: PartialOrd>(a: Option<T>, b: Option<T>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// 排序: 延迟优先, 其次负载; 缺失的值排在最后
pub fn sort_by_performance(servers: &mut [VpnServer]) {
    servers.sort_by(|a, b| {
        missing_last(a.latency, b.latency).then_with(|| missing_last(a.load, b.load))
    });
}

/// Lowest latency first, unmeasured servers last. Stable.
pub fn sort_by_latency(servers: &mut [VpnServer]) {
    servers.sort_by(|a, b| missing_last(a.latency, b.latency));
}

/// "BR-US-de" -> {"BR", "DE", "US"}
pub fn parse_excluded_countries(spec: &str) -> BTreeSet<String> {
    spec.split('-')
        .map(|code| code.trim().to_ascii_uppercase())
        .filter(|code| !code.is_empty())
        .collect()
}

/// Unique countries across `servers`, sorted by code. The first name seen
/// for a code wins.
pub fn country_index(servers: &[VpnServer]) -> Vec<CountryInfo> {
    let mut map: BTreeMap<&str, &str> = BTreeMap::new();
    for server in servers {
        map.entry(server.country_code.as_str())
            .or_insert(server.country.as_str());
    }

    map.into_iter()
        .map(|(code, name)| CountryInfo {
            code: code.to_string(),
            name: name.to_string(),
            display: format!("{} - {}", code, name),
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeasurementSummary {
    pub measured: usize,
    pub successful: usize,
    pub failed: usize,
}

pub fn summarize(servers: &[VpnServer]) -> MeasurementSummary {
    let successful = servers.iter().filter(|s| s.latency.is_some()).count();
    MeasurementSummary {
        measured: servers.len(),
        successful,
        failed: servers.len() - successful,
    }
}

/// Spinner on stderr while probes run; hidden when `visible` is false.
pub fn spinner(message: &str, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg} [{elapsed}]") {
        pb.set_style(style);
    }
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Provider;

    fn server(id: &str, code: &str, load: Option<u32>, latency: Option<f64>) -> VpnServer {
        VpnServer::new(Provider::NordVpn, &format!("Country {}", code), code, id, "k", load)
            .unwrap()
            .with_latency(latency)
    }

    #[test]
    fn test_paginate() {
        let items: Vec<u32> = (1..=25).collect();

        let page = paginate(&items, 3, 10);
        assert_eq!(page.data, vec![21, 22, 23, 24, 25]);
        assert_eq!(page.total, 25);
        assert_eq!(page.total_pages, 3);

        assert!(paginate(&items, 4, 10).data.is_empty());
        assert_eq!(paginate::<u32>(&[], 1, 10).total_pages, 0);
    }

    #[test]
    fn test_sort_by_performance() {
        let mut servers = vec![
            server("a", "US", Some(10), None),
            server("b", "US", Some(90), Some(20.0)),
            server("c", "US", Some(5), Some(20.0)),
            server("d", "US", None, None),
            server("e", "US", Some(1), Some(3.5)),
        ];
        sort_by_performance(&mut servers);

        let ids: Vec<&str> = servers.iter().map(|s| s.identifier.as_str()).collect();
        assert_eq!(ids, vec!["e", "c", "b", "a", "d"]);
    }

    #[test]
    fn test_sort_by_latency_keeps_unmeasured_last() {
        let mut servers = vec![
            server("slow", "US", None, Some(80.0)),
            server("none", "US", None, None),
            server("fast", "US", None, Some(8.0)),
        ];
        sort_by_latency(&mut servers);
        assert_eq!(servers[0].identifier, "fast");
        assert_eq!(servers[2].identifier, "none");
    }

    #[test]
    fn test_parse_excluded_countries() {
        let codes = parse_excluded_countries("br-US- -de");
        assert_eq!(codes.into_iter().collect::<Vec<_>>(), vec!["BR", "DE", "US"]);
        assert!(parse_excluded_countries("").is_empty());
    }

    #[test]
    fn test_country_index() {
        let servers = vec![
            server("a", "US", None, None),
            server("b", "BR", None, None),
            server("c", "US", None, None),
        ];
        let countries = country_index(&servers);
        assert_eq!(countries.len(), 2);
        assert_eq!(countries[0].code, "BR");
        assert_eq!(countries[0].display, "BR - Country BR");
    }

    #[test]
    fn test_summarize() {
        let servers = vec![
            server("a", "US", None, Some(1.0)),
            server("b", "US", None, None),
            server("c", "US", None, Some(2.0)),
        ];
        assert_eq!(
            summarize(&servers),
            MeasurementSummary {
                measured: 3,
                successful: 2,
                failed: 1
            }
        );
    }
}
