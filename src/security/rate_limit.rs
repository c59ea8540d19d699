use crate::AppState;
use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Mutex, PoisonError};
use std::time::Instant;

/// Bucket key when neither a peer address nor a trusted forwarded hop is known.
const UNKNOWN_CLIENT: &str = "unknown";

#[derive(Debug, Clone, Copy)]
struct Bucket {
    last_update: Instant,
    tokens: f32,
}

/// Token bucket rate limiter with one bucket per client key.
///
/// At most `max_clients` buckets are tracked; when full, buckets that have
/// refilled are dropped first, then the least recently used.
#[derive(Debug)]
pub struct SimpleRateLimiter {
    buckets: Mutex<HashMap<String, Bucket>>,
    rate_per_sec: f32,
    burst_size: f32,
    max_clients: usize,
}

impl SimpleRateLimiter {
    pub fn new(rate_per_sec: f32, burst_size: f32, max_clients: usize) -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
            rate_per_sec,
            burst_size,
            max_clients: max_clients.max(1),
        }
    }

    /// Take one token from `client`'s bucket.
    pub fn check(&self, client: &str) -> bool {
        let mut buckets = self.buckets.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();

        if !buckets.contains_key(client) && buckets.len() >= self.max_clients {
            self.evict(&mut buckets, now);
        }

        let bucket = buckets.entry(client.to_string()).or_insert(Bucket {
            last_update: now,
            tokens: self.burst_size,
        });
        let elapsed = now.duration_since(bucket.last_update).as_secs_f32();
        let tokens = (bucket.tokens + elapsed * self.rate_per_sec).min(self.burst_size);

        // Time passage is recorded even when the request is denied.
        bucket.last_update = now;
        if tokens >= 1.0 {
            bucket.tokens = tokens - 1.0;
            true
        } else {
            bucket.tokens = tokens;
            false
        }
    }

    fn evict(&self, buckets: &mut HashMap<String, Bucket>, now: Instant) {
        buckets.retain(|_, b| {
            b.tokens + now.duration_since(b.last_update).as_secs_f32() * self.rate_per_sec
                < self.burst_size
        });
        if buckets.len() >= self.max_clients
            && let Some(oldest) = buckets
                .iter()
                .min_by_key(|(_, b)| b.last_update)
                .map(|(key, _)| key.clone())
        {
            buckets.remove(&oldest);
        }
    }

    pub fn tracked_clients(&self) -> usize {
        self.buckets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Rate-limit key for a request: the first `X-Forwarded-For` hop when
/// trusted, else the peer IP.
pub fn client_key(headers: &HeaderMap, peer: Option<SocketAddr>, trust_forwarded_for: bool) -> String {
    let forwarded = trust_forwarded_for
        .then(|| headers.get("x-forwarded-for"))
        .flatten()
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|hop| !hop.is_empty());

    match (forwarded, peer) {
        (Some(hop), _) => hop.to_string(),
        (None, Some(addr)) => addr.ip().to_string(),
        (None, None) => UNKNOWN_CLIENT.to_string(),
    }
}

/// Middleware to enforce rate limits
pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let resilience = &state.config.resilience;
    if resilience.rate_limit_enabled {
        let peer = req
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        let client = client_key(req.headers(), peer, resilience.trust_forwarded_for);
        if !state.rate_limiter.check(&client) {
            tracing::warn!(
                name: "auth.rate_limited",
                client = %client,
                path = %req.uri().path(),
                "Rate limit exceeded"
            );
            return Err(StatusCode::TOO_MANY_REQUESTS);
        }
    }
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use std::time::Duration;

    #[test]
    fn test_bucket_refills_over_time() {
        let limiter = SimpleRateLimiter::new(2.0, 2.0, 16);
        assert!(limiter.check("10.0.0.1"));
        assert!(limiter.check("10.0.0.1"));
        assert!(!limiter.check("10.0.0.1"));

        // 0.6s at 2/s refills 1.2 tokens.
        std::thread::sleep(Duration::from_millis(600));
        assert!(limiter.check("10.0.0.1"));
        assert!(!limiter.check("10.0.0.1"));
    }

    #[test]
    fn test_exhausted_client_does_not_throttle_others() {
        let limiter = SimpleRateLimiter::new(0.001, 3.0, 16);
        for _ in 0..3 {
            assert!(limiter.check("attacker"));
        }
        assert!(!limiter.check("attacker"));

        assert!(limiter.check("someone-else"));
        assert!(limiter.check("someone-else"));
    }

    #[test]
    fn test_tracked_clients_are_bounded() {
        let limiter = SimpleRateLimiter::new(0.001, 5.0, 3);
        for client in ["a", "b", "c", "d", "e"] {
            assert!(limiter.check(client));
        }
        assert!(limiter.tracked_clients() <= 3);
        // The newest client keeps its bucket.
        assert!(limiter.check("e"));
    }

    #[test]
    fn test_client_key_sources() {
        let peer: SocketAddr = "192.0.2.7:5000".parse().unwrap();
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.9, 10.0.0.1"));

        assert_eq!(client_key(&headers, Some(peer), true), "203.0.113.9");
        assert_eq!(client_key(&headers, Some(peer), false), "192.0.2.7");
        assert_eq!(client_key(&HeaderMap::new(), None, true), "unknown");
    }
}
