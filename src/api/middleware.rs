//! API Middleware - Rate Limiting and Request Logging
//!
//! - Per-client rate limiting keyed by forwarded IP
//! - Request/response logging with a correlation ID per request

use axum::{
    extract::{Request, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use crate::common::logging::{
    generate_correlation_id, log_api_request, log_api_response, log_security_event,
};

use super::routes::ErrorResponse;

/// Header carrying the correlation ID back to the caller
pub const CORRELATION_HEADER: &str = "x-correlation-id";

// ============================================================================
// Rate Limiting
// ============================================================================

/// Rate limiter configuration
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Maximum requests per window
    pub max_requests: u32,
    /// Time window duration
    pub window: Duration,
    /// Extra requests allowed on top of the window budget
    pub burst: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self::per_minute(60)
    }
}

impl RateLimitConfig {
    /// `max_requests` per minute with a burst of a fifth of that
    pub fn per_minute(max_requests: u32) -> Self {
        Self {
            max_requests,
            window: Duration::from_secs(60),
            burst: max_requests / 5,
        }
    }
}

#[derive(Debug, Clone)]
struct RateLimitEntry {
    count: u32,
    window_start: Instant,
    burst_tokens: u32,
}

/// In-memory rate limiter
pub struct RateLimiter {
    config: RateLimitConfig,
    entries: RwLock<HashMap<String, RateLimitEntry>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Check if a request is allowed for the given client ID
    pub async fn check(&self, client_id: &str) -> Result<(), RateLimitError> {
        let mut entries = self.entries.write().await;
        let now = Instant::now();

        let entry = entries.entry(client_id.to_string()).or_insert(RateLimitEntry {
            count: 0,
            window_start: now,
            burst_tokens: self.config.burst,
        });

        if now.duration_since(entry.window_start) >= self.config.window {
            entry.count = 0;
            entry.window_start = now;
            // burst refills slowly
            entry.burst_tokens = self.config.burst.min(entry.burst_tokens + 5);
        }

        if entry.count < self.config.max_requests {
            entry.count += 1;
            Ok(())
        } else if entry.burst_tokens > 0 {
            entry.burst_tokens -= 1;
            entry.count += 1;
            Ok(())
        } else {
            let retry_after = self
                .config
                .window
                .as_secs()
                .saturating_sub(now.duration_since(entry.window_start).as_secs());
            Err(RateLimitError::Exceeded { retry_after })
        }
    }

    /// Drop entries idle for two windows
    pub async fn cleanup(&self) {
        let mut entries = self.entries.write().await;
        let now = Instant::now();
        let expiry = self.config.window * 2;

        entries.retain(|_, entry| now.duration_since(entry.window_start) < expiry);
    }

    #[cfg(test)]
    async fn tracked_clients(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[derive(Debug)]
pub enum RateLimitError {
    Exceeded { retry_after: u64 },
}

/// Shared rate limiter state
pub type RateLimitState = Arc<RateLimiter>;

pub fn create_rate_limiter(requests_per_minute: u32) -> RateLimitState {
    Arc::new(RateLimiter::new(RateLimitConfig::per_minute(requests_per_minute)))
}

/// Extract client IP from proxy headers
pub fn extract_client_ip(headers: &HeaderMap) -> Option<String> {
    if let Some(forwarded) = headers.get("x-forwarded-for") {
        if let Ok(value) = forwarded.to_str() {
            // first hop is the client
            return Some(value.split(',').next()?.trim().to_string());
        }
    }

    if let Some(real_ip) = headers.get("x-real-ip") {
        if let Ok(value) = real_ip.to_str() {
            return Some(value.to_string());
        }
    }

    None
}

/// Rate limiting middleware
pub async fn rate_limit_middleware(
    State(rate_limiter): State<RateLimitState>,
    request: Request,
    next: Next,
) -> Response {
    let client_id = extract_client_ip(request.headers()).unwrap_or_else(|| "unknown".to_string());

    match rate_limiter.check(&client_id).await {
        Ok(()) => next.run(request).await,
        Err(RateLimitError::Exceeded { retry_after }) => {
            log_security_event(
                "rate_limited",
                false,
                serde_json::json!({
                    "client": client_id,
                    "path": request.uri().path(),
                    "retry_after": retry_after
                }),
                None,
            );

            let mut response = (
                StatusCode::TOO_MANY_REQUESTS,
                Json(ErrorResponse::new("Rate limit exceeded", "RATE_LIMITED")),
            )
                .into_response();
            response
                .headers_mut()
                .insert("retry-after", HeaderValue::from(retry_after));
            response
        }
    }
}

// ============================================================================
// Request Logging
// ============================================================================

/// Log every request and its response under one correlation ID
pub async fn request_logging_middleware(request: Request, next: Next) -> Response {
    let correlation_id = generate_correlation_id();
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let client_ip = extract_client_ip(request.headers());

    log_api_request(&method, &path, client_ip.as_deref(), &correlation_id);

    let started = Instant::now();
    let mut response = next.run(request).await;
    let duration_ms = started.elapsed().as_millis() as u64;

    log_api_response(
        &method,
        &path,
        response.status().as_u16(),
        duration_ms,
        &correlation_id,
    );

    if let Ok(value) = HeaderValue::from_str(&correlation_id) {
        response.headers_mut().insert(CORRELATION_HEADER, value);
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_rate_limiter() {
        let config = RateLimitConfig {
            max_requests: 3,
            window: Duration::from_secs(1),
            burst: 1,
        };
        let limiter = RateLimiter::new(config);

        assert!(limiter.check("client1").await.is_ok());
        assert!(limiter.check("client1").await.is_ok());
        assert!(limiter.check("client1").await.is_ok());

        // burst token
        assert!(limiter.check("client1").await.is_ok());

        assert!(matches!(
            limiter.check("client1").await,
            Err(RateLimitError::Exceeded { .. })
        ));

        assert!(limiter.check("client2").await.is_ok());
    }

    #[tokio::test]
    async fn test_cleanup_keeps_recent_clients() {
        let limiter = RateLimiter::new(RateLimitConfig::per_minute(10));
        limiter.check("a").await.unwrap();
        limiter.check("b").await.unwrap();

        limiter.cleanup().await;
        assert_eq!(limiter.tracked_clients().await, 2);
    }

    #[test]
    fn test_per_minute_burst() {
        let config = RateLimitConfig::per_minute(60);
        assert_eq!(config.max_requests, 60);
        assert_eq!(config.burst, 12);
        assert_eq!(config.window, Duration::from_secs(60));
    }

    #[test]
    fn test_extract_client_ip() {
        let mut headers = HeaderMap::new();
        assert_eq!(extract_client_ip(&headers), None);

        headers.insert("x-real-ip", "10.0.0.7".parse().unwrap());
        assert_eq!(extract_client_ip(&headers).as_deref(), Some("10.0.0.7"));

        headers.insert("x-forwarded-for", "203.0.113.9, 10.0.0.1".parse().unwrap());
        assert_eq!(extract_client_ip(&headers).as_deref(), Some("203.0.113.9"));
    }
}
