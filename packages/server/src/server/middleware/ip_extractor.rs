use axum::{
    extract::{ConnectInfo, Request},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use ipnet::IpNet;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

/// Extension key for storing extracted IP address
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientIp(pub IpAddr);

impl ClientIp {
    /// Caller identity as used by the admission gateway.
    pub fn caller(&self) -> String {
        self.0.to_string()
    }
}

/// Peers whose forwarding headers are believed.
///
/// Empty by default, meaning only the socket address identifies a caller.
#[derive(Clone, Debug, Default)]
pub struct TrustedProxies(Arc<Vec<IpNet>>);

impl TrustedProxies {
    pub fn new(networks: Vec<IpNet>) -> Self {
        Self(Arc::new(networks))
    }

    /// Parse CIDR blocks or bare addresses.
    pub fn parse(entries: &[String]) -> Result<Self, String> {
        entries
            .iter()
            .map(|entry| {
                entry
                    .parse::<IpNet>()
                    .ok()
                    .or_else(|| entry.parse::<IpAddr>().ok().and_then(host_network))
                    .ok_or_else(|| format!("invalid trusted proxy: {entry}"))
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Self::new)
    }

    pub fn contains(&self, ip: &IpAddr) -> bool {
        self.0.iter().any(|net| net.contains(ip))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

fn host_network(ip: IpAddr) -> Option<IpNet> {
    let prefix = if ip.is_ipv4() { 32 } else { 128 };
    IpNet::new(ip, prefix).ok()
}

/// Middleware to extract client IP address from request
///
/// The socket address is the caller unless it belongs to a trusted proxy.
/// Behind a trusted proxy:
/// 1. X-Forwarded-For, walked right to left past other trusted hops
/// 2. X-Real-IP
/// 3. The proxy's own address
pub async fn extract_client_ip(
    proxies: TrustedProxies,
    mut request: Request,
    next: Next,
) -> Response {
    let socket = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());

    if let Some(ip) = client_ip(request.headers(), socket, &proxies) {
        request.extensions_mut().insert(ClientIp(ip));
    }

    next.run(request).await
}

fn client_ip(headers: &HeaderMap, socket: Option<IpAddr>, proxies: &TrustedProxies) -> Option<IpAddr> {
    let peer = socket?;
    if !proxies.contains(&peer) {
        return Some(peer);
    }

    if let Some(forwarded) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        let hops: Option<Vec<IpAddr>> = forwarded
            .split(',')
            .map(|hop| hop.trim().parse::<IpAddr>().ok())
            .collect();

        if let Some(hops) = hops {
            // Nearest untrusted hop; an all-trusted chain yields its origin
            if let Some(ip) = hops.iter().rev().find(|ip| !proxies.contains(ip)) {
                return Some(*ip);
            }
            if let Some(ip) = hops.first() {
                return Some(*ip);
            }
        }
    }

    if let Some(real_ip) = headers.get("x-real-ip") {
        let ip = real_ip
            .to_str()
            .ok()
            .and_then(|s| s.trim().parse::<IpAddr>().ok());
        if ip.is_some() {
            return ip;
        }
    }

    Some(peer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn proxy() -> Option<IpAddr> {
        Some("10.0.0.1".parse().unwrap())
    }

    fn trusted() -> TrustedProxies {
        TrustedProxies::parse(&["10.0.0.0/8".to_string()]).unwrap()
    }

    #[test]
    fn test_forwarded_for_takes_nearest_untrusted_hop() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("198.51.100.66, 203.0.113.5, 10.0.0.7"),
        );
        headers.insert("x-real-ip", HeaderValue::from_static("198.51.100.9"));

        assert_eq!(
            client_ip(&headers, proxy(), &trusted()),
            Some("203.0.113.5".parse().unwrap())
        );
    }

    #[test]
    fn test_real_ip_when_no_forwarded_for() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("198.51.100.9"));

        assert_eq!(
            client_ip(&headers, proxy(), &trusted()),
            Some("198.51.100.9".parse().unwrap())
        );
    }

    #[test]
    fn test_garbage_header_falls_back_to_socket() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("not-an-ip"));

        assert_eq!(client_ip(&headers, proxy(), &trusted()), proxy());
        assert_eq!(client_ip(&HeaderMap::new(), None, &trusted()), None);
    }

    #[test]
    fn test_untrusted_peer_headers_are_ignored() {
        let peer: Option<IpAddr> = Some("198.51.100.200".parse().unwrap());
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.99"));
        headers.insert("x-real-ip", HeaderValue::from_static("203.0.113.98"));

        assert_eq!(client_ip(&headers, peer, &trusted()), peer);
        assert_eq!(client_ip(&headers, peer, &TrustedProxies::default()), peer);
        assert_eq!(client_ip(&headers, None, &TrustedProxies::default()), None);
    }

    #[test]
    fn test_parse_accepts_cidrs_and_addresses() {
        let proxies =
            TrustedProxies::parse(&["127.0.0.1".to_string(), "fd00::/8".to_string()]).unwrap();
        assert!(proxies.contains(&"127.0.0.1".parse().unwrap()));
        assert!(proxies.contains(&"fd12::1".parse().unwrap()));
        assert!(!proxies.contains(&"127.0.0.2".parse().unwrap()));

        assert!(TrustedProxies::parse(&["not-a-network".to_string()]).is_err());
        assert!(TrustedProxies::default().is_empty());
    }
}
