use crate::errors::ServiceError;
use crate::identity::resolve_client_ip;
use crate::request::ClientRequest;
use crate::store::{CounterStore, KeyTtl, StoreError};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

pub const DEFAULT_LIMIT_MESSAGE: &str = "Too many requests, please try again later.";

/// Key derivation and exemption policy for one protected route.
///
/// The default derives `rate_limit:{identity}:{path}` and never skips.
/// Routes with trusted callers supply their own strategy; `should_skip`
/// returning true exempts the request without touching the store.
pub trait KeyStrategy: Send + Sync {
    fn derive_key(&self, req: &ClientRequest) -> String;

    fn should_skip(&self, _req: &ClientRequest) -> bool {
        false
    }
}

pub struct DefaultKeyStrategy;

impl KeyStrategy for DefaultKeyStrategy {
    fn derive_key(&self, req: &ClientRequest) -> String {
        format!("rate_limit:{}:{}", resolve_client_ip(req), req.path)
    }
}

/// Per-route rate limit configuration.
#[derive(Clone)]
pub struct RateLimitConfig {
    window_ms: u64,
    max_requests: u32,
    message: String,
    strategy: Arc<dyn KeyStrategy>,
}

impl RateLimitConfig {
    /// A zero window is a programmer error and fails construction.
    /// `max_requests == 0` is accepted and degenerates to always-deny.
    pub fn new(window_ms: u64, max_requests: u32) -> Result<Self, ServiceError> {
        if window_ms == 0 {
            return Err(ServiceError::Validation(
                "rate limit window must be positive".to_string(),
            ));
        }

        Ok(Self {
            window_ms,
            max_requests,
            message: DEFAULT_LIMIT_MESSAGE.to_string(),
            strategy: Arc::new(DefaultKeyStrategy),
        })
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn with_strategy(mut self, strategy: Arc<dyn KeyStrategy>) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn window_ms(&self) -> u64 {
        self.window_ms
    }

    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Quota details accompanying a rate limit decision, surfaced to the
/// HTTP layer as response headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitInfo {
    pub limit: u32,
    pub remaining: u32,
    /// Absolute epoch milliseconds when the current window closes.
    pub reset_time: i64,
}

/// Per-request decision. Never persisted.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitResult {
    pub allowed: bool,
    pub info: RateLimitInfo,
}

/// Fixed-window rate limiter over a shared counter store.
///
/// The store performs the counting; the limiter never reads-then-writes
/// non-atomically and keeps no cross-request state of its own. When the
/// store is unreachable the limiter fails open: an unavailable counting
/// store must not become a denial-of-service vector for legitimate
/// traffic.
pub struct RateLimiter {
    store: Arc<dyn CounterStore>,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn CounterStore>) -> Self {
        Self { store }
    }

    pub async fn check(&self, req: &ClientRequest, config: &RateLimitConfig) -> RateLimitResult {
        if config.strategy.should_skip(req) {
            return Self::pass_through(config);
        }

        let key = config.strategy.derive_key(req);
        match self.count(&key, config).await {
            Ok(result) => result,
            Err(err) => {
                warn!(key = %key, error = %err, "Counter store degraded; failing open");
                Self::pass_through(config)
            }
        }
    }

    async fn count(
        &self,
        key: &str,
        config: &RateLimitConfig,
    ) -> Result<RateLimitResult, StoreError> {
        let count = self.store.increment(key, config.window()).await?;
        let now_ms = Utc::now().timestamp_millis();

        let reset_time = match self.store.ttl(key).await? {
            KeyTtl::Remaining(ttl) => now_ms + ttl.as_millis() as i64,
            KeyTtl::NoExpiry | KeyTtl::Missing => {
                // A counted key without an expiry is a store anomaly;
                // treat it as a fresh full window rather than surfacing
                // a stale or negative reset.
                warn!(key = %key, "Counter key has no expiry; assuming a fresh window");
                now_ms + config.window_ms as i64
            }
        };

        // A count the store could not represent as a positive number is
        // treated as zero: fail toward allowing.
        let current = count.max(0);
        let remaining = (i64::from(config.max_requests) - current).max(0) as u32;

        Ok(RateLimitResult {
            allowed: current <= i64::from(config.max_requests),
            info: RateLimitInfo {
                limit: config.max_requests,
                remaining,
                reset_time,
            },
        })
    }

    fn pass_through(config: &RateLimitConfig) -> RateLimitResult {
        let now_ms = Utc::now().timestamp_millis();
        RateLimitResult {
            allowed: true,
            info: RateLimitInfo {
                limit: config.max_requests,
                remaining: config.max_requests,
                reset_time: now_ms + config.window_ms as i64,
            },
        }
    }
}
