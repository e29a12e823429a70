/// 从服务器标识中提取裸主机名
///
/// Strips, in order: everything up to the first `://`, everything from the
/// first `/`, everything from the first `:`. If that leaves nothing (e.g.
/// `https://` or `:51820`), the identifier is returned unchanged, so a
/// non-empty identifier never maps to an empty host.
///
/// IPv6 literals are not supported (the first `:` is taken as a port marker).
pub fn extract_host(identifier: &str) -> &str {
    let mut host = identifier;

    if let Some((_, rest)) = host.split_once("://") {
        host = rest;
    }
    if let Some((head, _)) = host.split_once('/') {
        host = head;
    }
    if let Some((head, _)) = host.split_once(':') {
        host = head;
    }

    if host.is_empty() {
        identifier
    } else {
        host
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_host_strips_scheme_port_and_path() {
        assert_eq!(extract_host("https://server.com:8080/path"), "server.com");
        assert_eq!(extract_host("us1.example.com"), "us1.example.com");
        assert_eq!(extract_host("10.0.0.1:51820"), "10.0.0.1");
        assert_eq!(extract_host("de-fra.prod.surfshark.com/wg"), "de-fra.prod.surfshark.com");
        assert_eq!(extract_host("wg://host/a:b"), "host");
    }

    #[test]
    fn test_extract_host_never_empties_an_identifier() {
        assert_eq!(extract_host("https://"), "https://");
        assert_eq!(extract_host(":51820"), ":51820");
        assert_eq!(extract_host("/wg"), "/wg");
        assert_eq!(extract_host(""), "");
    }

    #[test]
    fn test_extract_host_is_idempotent() {
        let samples = [
            "https://server.com:8080/path",
            "us1.example.com",
            "tcp://1.2.3.4",
            "host:1/x://y",
            "a/b/c",
            "https://",
            ":51820",
            "",
        ];
        for sample in samples {
            let once = extract_host(sample);
            assert_eq!(extract_host(once), once, "input: {}", sample);
        }
    }
}
