use crate::request::ClientRequest;

/// Resolve the identifying address for the caller of a request.
///
/// Precedence, first non-empty wins:
/// 1. first comma-separated entry of `x-forwarded-for`, trimmed
/// 2. `x-real-ip`
/// 3. the transport-level peer address
///
/// Reverse-proxied deployments must be attributed to the originating
/// client, not the proxy hop; direct connections fall back to the peer.
/// Header values are not validated as addresses — the proxies setting
/// them are trusted infrastructure. Known limitation.
pub fn resolve_client_ip(req: &ClientRequest) -> String {
    if let Some(forwarded) = req.header("x-forwarded-for") {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }

    if let Some(real_ip) = req.header("x-real-ip") {
        let real_ip = real_ip.trim();
        if !real_ip.is_empty() {
            return real_ip.to_string();
        }
    }

    req.peer_addr
        .as_deref()
        .filter(|addr| !addr.is_empty())
        .unwrap_or("unknown")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forwarded_for_takes_precedence() {
        let req = ClientRequest::new("GET", "/api/jobs")
            .with_peer_addr("127.0.0.1")
            .with_header("x-forwarded-for", "203.0.113.1, 198.51.100.1")
            .with_header("x-real-ip", "198.51.100.2");

        assert_eq!(resolve_client_ip(&req), "203.0.113.1");
    }

    #[test]
    fn real_ip_used_when_no_forwarded_for() {
        let req = ClientRequest::new("GET", "/api/jobs")
            .with_peer_addr("127.0.0.1")
            .with_header("x-real-ip", "203.0.113.1");

        assert_eq!(resolve_client_ip(&req), "203.0.113.1");
    }

    #[test]
    fn peer_address_is_the_fallback() {
        let req = ClientRequest::new("GET", "/api/jobs").with_peer_addr("127.0.0.1");
        assert_eq!(resolve_client_ip(&req), "127.0.0.1");
    }

    #[test]
    fn unknown_when_nothing_identifies_the_caller() {
        let req = ClientRequest::new("GET", "/api/jobs");
        assert_eq!(resolve_client_ip(&req), "unknown");
    }

    #[test]
    fn empty_forwarded_entry_falls_through() {
        let req = ClientRequest::new("GET", "/api/jobs")
            .with_peer_addr("10.0.0.1")
            .with_header("x-forwarded-for", "  ,198.51.100.1");

        assert_eq!(resolve_client_ip(&req), "10.0.0.1");
    }
}
