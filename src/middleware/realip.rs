//! Client address extraction for the default key function.

use std::net::SocketAddr;

use http::request::Parts;

/// The connection peer address, inserted into request extensions by the
/// server (e.g. from `ConnectInfo` in axum or the accepted socket in a
/// hand-rolled hyper server).
///
/// The default key function falls back to this when no proxy header
/// identifies the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerAddr(pub SocketAddr);

/// Derive the client address for a request.
///
/// Precedence follows the common reverse-proxy conventions: the
/// `True-Client-IP` header, then `X-Real-IP`, then the first entry of a
/// comma-space separated `X-Forwarded-For` chain, then the raw peer
/// address from [`PeerAddr`] with the port stripped. Returns `"unknown"`
/// when none of these are present.
pub fn client_ip(parts: &Parts) -> String {
    if let Some(tcip) = header_str(parts, "true-client-ip") {
        return tcip.to_owned();
    }

    if let Some(xrip) = header_str(parts, "x-real-ip") {
        return xrip.to_owned();
    }

    if let Some(xff) = header_str(parts, "x-forwarded-for") {
        let first = match xff.split_once(", ") {
            Some((first, _)) => first,
            None => xff,
        };
        return first.to_owned();
    }

    match parts.extensions.get::<PeerAddr>() {
        Some(peer) => peer.0.ip().to_string(),
        None => "unknown".to_owned(),
    }
}

fn header_str<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts
        .headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Request;

    fn parts_with(headers: &[(&str, &str)]) -> Parts {
        let mut builder = Request::builder().uri("/");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn test_true_client_ip_takes_precedence() {
        let parts = parts_with(&[
            ("True-Client-IP", "203.0.113.7"),
            ("X-Real-IP", "198.51.100.1"),
            ("X-Forwarded-For", "192.0.2.1, 10.0.0.1"),
        ]);
        assert_eq!(client_ip(&parts), "203.0.113.7");
    }

    #[test]
    fn test_x_real_ip_before_forwarded_for() {
        let parts = parts_with(&[
            ("X-Real-IP", "198.51.100.1"),
            ("X-Forwarded-For", "192.0.2.1, 10.0.0.1"),
        ]);
        assert_eq!(client_ip(&parts), "198.51.100.1");
    }

    #[test]
    fn test_forwarded_for_uses_first_entry() {
        let parts = parts_with(&[("X-Forwarded-For", "192.0.2.1, 10.0.0.1, 10.0.0.2")]);
        assert_eq!(client_ip(&parts), "192.0.2.1");
    }

    #[test]
    fn test_single_forwarded_for_entry() {
        let parts = parts_with(&[("X-Forwarded-For", "192.0.2.1")]);
        assert_eq!(client_ip(&parts), "192.0.2.1");
    }

    #[test]
    fn test_peer_addr_strips_port() {
        let mut parts = parts_with(&[]);
        parts
            .extensions
            .insert(PeerAddr("192.0.2.9:41234".parse().unwrap()));
        assert_eq!(client_ip(&parts), "192.0.2.9");
    }

    #[test]
    fn test_empty_headers_are_skipped() {
        let parts = parts_with(&[("True-Client-IP", ""), ("X-Real-IP", "198.51.100.1")]);
        assert_eq!(client_ip(&parts), "198.51.100.1");
    }

    #[test]
    fn test_unknown_when_nothing_identifies_the_client() {
        let parts = parts_with(&[]);
        assert_eq!(client_ip(&parts), "unknown");
    }
}
