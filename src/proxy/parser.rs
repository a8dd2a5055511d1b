//! Proxy parser module for turning candidate lines into proxies
//!
//! Relays are always tunnelled as SOCKS5, so only bare `ip:port` lines and
//! `socks5://` URLs are accepted.

use crate::proxy::models::{Proxy, ProxyType};
use once_cell::sync::Lazy;
use regex::Regex;
use std::net::Ipv4Addr;

/// socks5://IP:PORT with an optional trailing slash
static URL_FORMAT_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^socks5://([^:/]+):(\d+)/?$").expect("Invalid proxy URL regex")
});

/// Proxy parser for candidate lines fetched from a relay source
pub struct ProxyParser;

impl ProxyParser {
    /// Parse a single candidate line
    ///
    /// Supports formats:
    /// - IP:PORT
    /// - socks5://IP:PORT
    ///
    /// The host must be a dotted IPv4 address and the port non-zero. Other
    /// schemes are rejected as malformed.
    pub fn parse_line(line: &str) -> Option<Proxy> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return None;
        }

        if line.contains("://") {
            Self::parse_url_format(line)
        } else {
            Self::parse_colon_format(line)
        }
    }

    fn parse_url_format(line: &str) -> Option<Proxy> {
        let caps = URL_FORMAT_REGEX.captures(line)?;
        Self::build(&caps[1], &caps[2])
    }

    fn parse_colon_format(line: &str) -> Option<Proxy> {
        let (host, port) = line.split_once(':')?;
        Self::build(host, port)
    }

    fn build(host: &str, port: &str) -> Option<Proxy> {
        let host: Ipv4Addr = host.parse().ok()?;
        let port: u16 = port.parse().ok()?;
        if port == 0 {
            return None;
        }
        Some(Proxy::new(host, port, ProxyType::Socks5))
    }

    /// Parse every valid candidate, silently dropping malformed lines
    pub fn parse_lines<S: AsRef<str>>(lines: &[S]) -> Vec<Proxy> {
        lines
            .iter()
            .filter_map(|line| Self::parse_line(line.as_ref()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_format() {
        let proxy = ProxyParser::parse_line("192.168.1.1:1080").unwrap();
        assert_eq!(proxy.host, Ipv4Addr::new(192, 168, 1, 1));
        assert_eq!(proxy.port, 1080);
        assert_eq!(proxy.proxy_type);
    }

    #[test]
    fn test_parse_socks5_url_format() {
        let proxy = ProxyParser::parse_line("socks5://10.0.0.1:1080/").unwrap();
        assert_eq!(proxy.host, Ipv4Addr::new(10, 0, 0, 1));
        assert_eq!(proxy.port, 1080);
        assert_eq!(proxy.proxy_type, ProxyType::Socks5);
    }

    #[test]
    fn test_parse_rejects_other_schemes() {
        assert!(ProxyParser::parse_line("http://1.2.3.4:8080").is_none());
        assert!(ProxyParser::parse_line("https://1.2.3.4:8443/").is_none());
        assert!(ProxyParser::parse_line("socks4://1.2.3.4:1080").is_none());
        assert!(ProxyParser::parse_line("socks5://example.com:1080").is_none());
    }

    #[test]
    fn test_parse_trims_line_endings() {
        let proxy = ProxyParser::parse_line("1.2.3.4:1080\r").unwrap();
        assert_eq!(proxy.port, 1080);
    }

    #[test]
    fn test_parse_empty_and_comment_lines() {
        assert!(ProxyParser::parse_line("").is_none());
        assert!(ProxyParser::parse_line("   ").is_none());
        assert!(ProxyParser::parse_line("# relays").is_none());
    }

    #[test]
    fn test_parse_invalid_format() {
        assert!(ProxyParser::parse_line("bad-line").is_none());
        assert!(ProxyParser::parse_line("192.168.1.1").is_none());
        assert!(ProxyParser::parse_line("192.168.1.1:abc").is_none());
        assert!(ProxyParser::parse_line("192.168.1.1:0").is_none());
        assert!(ProxyParser::parse_line("192.168.1.1:70000").is_none());
        assert!(ProxyParser::parse_line("999.1.1.1:1080").is_none());
        assert!(ProxyParser::parse_line("1.2.3.4:1080:user:pass").is_none());
    }

    #[test]
    fn test_parse_lines_keeps_order() {
        let lines = ["1.2.3.4:1080", "bad-line", "5.6.7.8:1080"];
        let proxies = ProxyParser::parse_lines(&lines);
        assert_eq!(proxies.len(), 2);
        assert_eq!(proxies[0].to_simple_string(), "1.2.3.4:1080");
        assert_eq!(proxies[1].to_simple_string(), "5.6.7.8:1080");
    }
}
