//! Target URL parsing, domain normalization and SSRF protection.

use std::collections::HashSet;
use std::net::IpAddr;
use thiserror::Error;
use url::{Host, Url};

/// Why a target URL was rejected before any legality lookup.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum UrlRejection {
    #[error("invalid URL")]
    Invalid,

    #[error("disallowed URL scheme: {0}")]
    DisallowedScheme(String),

    #[error("URL has no host")]
    NoHost,

    #[error("blocked host: {0}")]
    BlockedHost(String),
}

/// A parsed absolute URL with its normalized domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetUrl {
    pub url: Url,
    /// Lowercased host with any leading `www.` removed
    pub domain: String,
}

impl TargetUrl {
    /// Path plus query, used for robots.txt matching.
    pub fn path(&self) -> String {
        match self.url.query() {
            Some(q) => format!("{}?{}", self.url.path(), q),
            None => self.url.path().to_string(),
        }
    }

    /// `{scheme}://{host}[:port]/robots.txt`
    pub fn robots_url(&self) -> String {
        let host = self.url.host_str().unwrap_or_default();
        match self.url.port() {
            Some(port) => format!("{}://{}:{}/robots.txt", self.url.scheme(), host, port),
            None => format!("{}://{}/robots.txt", self.url.scheme(), host),
        }
    }
}

/// Normalize a hostname: lowercase, trailing dot and leading `www.` removed.
pub fn normalize_domain(host: &str) -> String {
    let host = host.trim().trim_end_matches('.').to_lowercase();
    host.strip_prefix("www.").map(str::to_string).unwrap_or(host)
}

/// URL validator for SSRF protection.
///
/// Rejects:
/// - Non-HTTP(S) schemes (file://, ftp://)
/// - Internal hostnames (localhost, cloud metadata)
/// - Loopback, private and link-local address ranges
#[derive(Debug, Clone)]
pub struct UrlGuard {
    allowed_schemes: HashSet<String>,
    blocked_hosts: HashSet<String>,
    blocked_cidrs: Vec<ipnet::IpNet>,
    block_private: bool,
}

impl Default for UrlGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl UrlGuard {
    pub fn new() -> Self {
        Self {
            allowed_schemes: ["http", "https"].into_iter().map(String::from).collect(),
            blocked_hosts: [
                "localhost",
                "metadata.google.internal",
                "metadata.gke.internal",
                "instance-data",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            blocked_cidrs: [
                "10.0.0.0/8",
                "172.16.0.0/12",
                "192.168.0.0/16",
                "169.254.0.0/16", // Link-local / cloud metadata
                "127.0.0.0/8",
                "0.0.0.0/8",
                "::1/128",
                "fc00::/7",
                "fe80::/10",
            ]
            .into_iter()
            .filter_map(|cidr| cidr.parse().ok())
            .collect(),
            block_private: true,
        }
    }

    /// Skip host and address checks (schemes are still enforced).
    pub fn allow_private(mut self) -> Self {
        self.block_private = false;
        self
    }

    /// Parse and validate a target URL.
    pub fn parse(&self, raw: &str) -> Result<TargetUrl, UrlRejection> {
        let url = Url::parse(raw.trim()).map_err(|_| UrlRejection::Invalid)?;

        if !self.allowed_schemes.contains(url.scheme()) {
            return Err(UrlRejection::DisallowedScheme(url.scheme().to_string()));
        }

        let host = url.host().ok_or(UrlRejection::NoHost)?;
        let domain = match &host {
            Host::Domain(d) => normalize_domain(d),
            Host::Ipv4(ip) => ip.to_string(),
            Host::Ipv6(ip) => ip.to_string(),
        };
        if domain.is_empty() {
            return Err(UrlRejection::NoHost);
        }

        if self.block_private {
            let ip = match host {
                Host::Ipv4(ip) => Some(IpAddr::V4(ip)),
                Host::Ipv6(ip) => Some(IpAddr::V6(ip)),
                Host::Domain(_) => None,
            };

            if self.blocked_hosts.contains(&domain) || domain.ends_with(".localhost") {
                return Err(UrlRejection::BlockedHost(domain));
            }

            if let Some(ip) = ip {
                if self.blocked_cidrs.iter().any(|cidr| cidr.contains(&ip)) {
                    return Err(UrlRejection::BlockedHost(ip.to_string()));
                }
            }
        }

        Ok(TargetUrl { url, domain })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_domain() {
        assert_eq!(normalize_domain("WWW.Example.COM"), "example.com");
        assert_eq!(normalize_domain("shop.example.com."), "shop.example.com");
        assert_eq!(normalize_domain("wwwexample.com"), "wwwexample.com");
    }

    #[test]
    fn test_rejects_malformed() {
        let guard = UrlGuard::new();
        assert_eq!(guard.parse("not a url"), Err(UrlRejection::Invalid));
        assert_eq!(guard.parse("/relative/path"), Err(UrlRejection::Invalid));
    }

    #[test]
    fn test_blocks_non_http() {
        let guard = UrlGuard::new();
        assert!(matches!(
            guard.parse("file:///etc/passwd"),
            Err(UrlRejection::DisallowedScheme(_))
        ));
        assert!(matches!(
            guard.parse("ftp://example.com/"),
            Err(UrlRejection::DisallowedScheme(_))
        ));
    }

    #[test]
    fn test_blocks_internal_targets() {
        let guard = UrlGuard::new();
        assert!(guard.parse("http://localhost/").is_err());
        assert!(guard.parse("http://127.0.0.1/").is_err());
        assert!(guard.parse("http://[::1]/").is_err());
        assert!(guard.parse("http://10.0.0.1/").is_err());
        assert!(guard.parse("http://169.254.169.254/").is_err());
        assert!(guard.parse("http://metadata.google.internal/").is_err());
    }

    #[test]
    fn test_allow_private() {
        let guard = UrlGuard::new().allow_private();
        assert!(guard.parse("http://127.0.0.1:8080/").is_ok());
        assert!(guard.parse("file:///etc/passwd").is_err());
    }

    #[test]
    fn test_target_parts() {
        let target = UrlGuard::new()
            .parse("https://www.Example.com:8443/private/x?page=2")
            .unwrap();
        assert_eq!(target.domain, "example.com");
        assert_eq!(target.path(), "/private/x?page=2");
        assert_eq!(target.robots_url(), "https://www.example.com:8443/robots.txt");
    }
}
