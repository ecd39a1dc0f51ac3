//! Resolves the originating address of a request.
//!
//! Forwarding headers are consulted in the order common proxies and CDNs set
//! them; the socket peer is the fallback. Addresses are normalised so that an
//! IPv4 client seen through a dual-stack socket (`::ffff:1.2.3.4`) is keyed
//! the same as a plain IPv4 one.

use axum::http::HeaderMap;
use std::net::{IpAddr, SocketAddr};

const SINGLE_VALUE_HEADERS: [&str; 5] = [
    "cf-connecting-ip",
    "fastly-client-ip",
    "true-client-ip",
    "x-real-ip",
    "x-cluster-client-ip",
];

pub fn client_address(headers: &HeaderMap, peer: Option<SocketAddr>) -> Option<String> {
    header_value(headers, "x-client-ip")
        .and_then(parse_ip)
        .or_else(|| from_forwarded_for(headers))
        .or_else(|| {
            SINGLE_VALUE_HEADERS
                .iter()
                .find_map(|name| header_value(headers, name).and_then(parse_ip))
        })
        .or_else(|| from_forwarded(headers))
        .or_else(|| peer.map(|p| p.ip().to_canonical()))
        .map(|ip| ip.to_string())
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|h| h.to_str().ok())
}

fn parse_ip(raw: &str) -> Option<IpAddr> {
    let raw = raw.trim();
    raw.parse::<IpAddr>()
        .ok()
        .or_else(|| raw.parse::<SocketAddr>().ok().map(|s| s.ip()))
        .map(|ip| ip.to_canonical())
}

// X-Forwarded-For: "client, proxy1, proxy2" - first valid entry wins
fn from_forwarded_for(headers: &HeaderMap) -> Option<IpAddr> {
    header_value(headers, "x-forwarded-for")?
        .split(',')
        .find_map(parse_ip)
}

// Forwarded (RFC 7239): for=192.0.2.60;proto=http, for="[2001:db8::1]:4711"
fn from_forwarded(headers: &HeaderMap) -> Option<IpAddr> {
    header_value(headers, "forwarded")?
        .split([',', ';'])
        .filter_map(|part| {
            let (key, value) = part.trim().split_once('=')?;
            key.eq_ignore_ascii_case("for").then_some(value)
        })
        .find_map(|value| {
            let value = value.trim().trim_matches('"');
            let value = match value.strip_prefix('[') {
                Some(rest) => rest.split(']').next().unwrap_or(rest),
                None => value,
            };
            parse_ip(value)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn forwarded_for_uses_leftmost_address() {
        let h = headers(&[("x-forwarded-for", "203.0.113.7, 10.0.0.1, 10.0.0.2")]);
        assert_eq!(client_address(&h, None).as_deref(), Some("203.0.113.7"));
    }

    #[test]
    fn skips_unparseable_forwarded_for_entries() {
        let h = headers(&[("x-forwarded-for", "unknown, 198.51.100.3")]);
        assert_eq!(client_address(&h, None).as_deref(), Some("198.51.100.3"));
    }

    #[test]
    fn x_client_ip_beats_forwarded_for() {
        let h = headers(&[
            ("x-client-ip", "192.0.2.1"),
            ("x-forwarded-for", "192.0.2.2"),
        ]);
        assert_eq!(client_address(&h, None).as_deref(), Some("192.0.2.1"));
    }

    #[test]
    fn rfc7239_forwarded_header() {
        let h = headers(&[("forwarded", r#"proto=https;for="[2001:db8::1]:4711""#)]);
        assert_eq!(client_address(&h, None).as_deref(), Some("2001:db8::1"));

        let h = headers(&[("forwarded", "for=192.0.2.60;proto=http;by=203.0.113.43")]);
        assert_eq!(client_address(&h, None).as_deref(), Some("192.0.2.60"));
    }

    #[test]
    fn falls_back_to_peer_and_unmaps_ipv4() {
        let peer: SocketAddr = "[::ffff:1.2.3.4]:5555".parse().unwrap();
        assert_eq!(
            client_address(&HeaderMap::new(), Some(peer)).as_deref(),
            Some("1.2.3.4")
        );
    }

    #[test]
    fn no_source_gives_none() {
        assert_eq!(client_address(&HeaderMap::new(), None), None);
    }
}
