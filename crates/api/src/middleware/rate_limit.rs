//! Rate limiting middleware using governor and `tower_governor`.
//!
//! - `auth_rate_limiter`: login and registration (~10/min per IP)
//! - `contact_rate_limiter`: public contact form (~5/min per IP)

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::extract::ConnectInfo;
use axum::http::{HeaderMap, Request};
use governor::clock::QuantaInstant;
use governor::middleware::NoOpMiddleware;
use tower_governor::{GovernorError, GovernorLayer, governor::GovernorConfigBuilder};

// =============================================================================
// Client IP Key Extractor
// =============================================================================

/// Key extractor that uses the peer address of the TCP connection.
///
/// Forwarded headers are client controlled, so they are read only when the
/// server sits behind a reverse proxy that overwrites them (`trust_proxy`).
#[derive(Clone, Copy, Default)]
pub struct ClientIpKeyExtractor {
    trust_proxy: bool,
}

impl ClientIpKeyExtractor {
    #[must_use]
    pub const fn new(trust_proxy: bool) -> Self {
        Self { trust_proxy }
    }
}

impl tower_governor::key_extractor::KeyExtractor for ClientIpKeyExtractor {
    type Key = IpAddr;

    fn extract<T>(&self, req: &Request<T>) -> Result<Self::Key, GovernorError> {
        if self.trust_proxy
            && let Some(ip) = forwarded_ip(req.headers())
        {
            return Ok(ip);
        }

        req.extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip())
            .ok_or(GovernorError::UnableToExtractKey)
    }
}

/// Client IP set by a reverse proxy: first `X-Forwarded-For` hop, then `X-Real-IP`.
fn forwarded_ip(headers: &HeaderMap) -> Option<IpAddr> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(',').next())
        .and_then(|s| s.trim().parse::<IpAddr>().ok())
        .or_else(|| {
            headers
                .get("x-real-ip")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.trim().parse::<IpAddr>().ok())
        })
}

// =============================================================================
// Rate Limiter Configuration
// =============================================================================

/// Rate limiter layer type for Axum.
pub type RateLimiterLayer =
    GovernorLayer<ClientIpKeyExtractor, NoOpMiddleware<QuantaInstant>, axum::body::Body>;

/// Create rate limiter for auth endpoints: ~10 requests per minute per IP.
///
/// Configuration: 1 request every 6 seconds (replenish), burst of 5.
///
/// # Panics
///
/// This function will not panic. `per_second(6)` and `burst_size(5)` are
/// always accepted by `GovernorConfigBuilder`.
#[must_use]
pub fn auth_rate_limiter(trust_proxy: bool) -> RateLimiterLayer {
    let config = GovernorConfigBuilder::default()
        .key_extractor(ClientIpKeyExtractor::new(trust_proxy))
        .per_second(6)
        .burst_size(5)
        .finish()
        .expect("rate limiter config with per_second(6) and burst_size(5) is valid");
    GovernorLayer::new(Arc::new(config))
}

/// Create rate limiter for the contact form: ~5 requests per minute per IP.
///
/// Configuration: 1 request every 12 seconds (replenish), burst of 3.
///
/// # Panics
///
/// This function will not panic. `per_second(12)` and `burst_size(3)` are
/// always accepted by `GovernorConfigBuilder`.
#[must_use]
pub fn contact_rate_limiter(trust_proxy: bool) -> RateLimiterLayer {
    let config = GovernorConfigBuilder::default()
        .key_extractor(ClientIpKeyExtractor::new(trust_proxy))
        .per_second(12)
        .burst_size(3)
        .finish()
        .expect("rate limiter config with per_second(12) and burst_size(3) is valid");
    GovernorLayer::new(Arc::new(config))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tower_governor::key_extractor::KeyExtractor;

    use super::*;

    fn request(forwarded_for: &str, peer: &str) -> Request<()> {
        let mut req = Request::builder()
            .header("x-forwarded-for", forwarded_for)
            .body(())
            .unwrap();
        req.extensions_mut()
            .insert(ConnectInfo(peer.parse::<SocketAddr>().unwrap()));
        req
    }

    #[test]
    fn test_ignores_forwarded_headers_by_default() {
        let extractor = ClientIpKeyExtractor::default();
        for spoofed in ["203.0.113.7", "203.0.113.8", "198.51.100.1"] {
            assert_eq!(
                extractor.extract(&request(spoofed, "192.0.2.9:5123")).unwrap(),
                "192.0.2.9".parse::<IpAddr>().unwrap()
            );
        }
    }

    #[test]
    fn test_trusted_proxy_uses_forwarded_for() {
        let mut req = request("203.0.113.7, 10.0.0.1", "10.0.0.1:443");
        req.headers_mut()
            .insert("x-real-ip", "198.51.100.2".parse().unwrap());
        assert_eq!(
            ClientIpKeyExtractor::new(true).extract(&req).unwrap(),
            "203.0.113.7".parse::<IpAddr>().unwrap()
        );
    }

    #[test]
    fn test_trusted_proxy_falls_back_to_real_ip_then_peer() {
        let mut req = Request::builder()
            .header("x-real-ip", "198.51.100.2")
            .body(())
            .unwrap();
        assert_eq!(
            ClientIpKeyExtractor::new(true).extract(&req).unwrap(),
            "198.51.100.2".parse::<IpAddr>().unwrap()
        );

        req.headers_mut().remove("x-real-ip");
        assert!(ClientIpKeyExtractor::new(true).extract(&req).is_err());
        req.extensions_mut()
            .insert(ConnectInfo("192.0.2.9:5123".parse::<SocketAddr>().unwrap()));
        assert_eq!(
            ClientIpKeyExtractor::new(true).extract(&req).unwrap(),
            "192.0.2.9".parse::<IpAddr>().unwrap()
        );
    }
}
