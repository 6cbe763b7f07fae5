use async_trait::async_trait;
use dashmap::DashMap;
use redis::aio::ConnectionManager;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::time::timeout;

/// Errors at the counter-store boundary.
///
/// These are ordinary values, not panics: the rate limiter treats any of
/// them as "store degraded" and fails open.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("counter store unavailable: {0}")]
    Unavailable(String),

    #[error("counter store operation timed out after {0:?}")]
    Timeout(Duration),
}

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        StoreError::Unavailable(err.to_string())
    }
}

/// Remaining lifetime of a counter key as reported by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyTtl {
    /// Key exists and expires after this duration.
    Remaining(Duration),
    /// Key exists but carries no expiry. An inconsistency the caller
    /// must absorb, never propagate.
    NoExpiry,
    /// Key does not exist.
    Missing,
}

/// Shared counter storage with atomic increment-and-expire.
///
/// The store is the single source of truth for request counts; the rate
/// limiter holds no in-process cache. Correctness under concurrent
/// requests depends on `increment` being one indivisible operation, so
/// no key can end up incremented without an expiry.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Atomically increment the counter at `key`, refreshing its expiry
    /// to `window`, and return the post-increment count. Creates the
    /// key with count 1 when absent.
    async fn increment(&self, key: &str, window: Duration) -> Result<i64, StoreError>;

    /// Report the remaining lifetime of `key`.
    async fn ttl(&self, key: &str) -> Result<KeyTtl, StoreError>;
}

/// Time source for the in-memory store, injectable so tests can drive
/// window expiry deterministically.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// System clock backed by `Instant::now()`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Controllable clock for tests.
#[derive(Debug)]
pub struct MockClock {
    base: Instant,
    offset: Mutex<Duration>,
}

impl MockClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, delta: Duration) {
        let mut offset = self.offset.lock().unwrap();
        *offset += delta;
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MockClock {
    fn now(&self) -> Instant {
        self.base + *self.offset.lock().unwrap()
    }
}

/// Redis-backed counter store.
///
/// INCR and EXPIRE are issued inside one MULTI/EXEC pipeline, so two
/// concurrent first-requests for a new key cannot produce a counter
/// with an increment applied but no expiry set. Every operation runs
/// under a bounded timeout; an elapsed timeout is reported as a store
/// error, never held indefinitely.
pub struct RedisCounterStore {
    connection: ConnectionManager,
    op_timeout: Duration,
}

impl RedisCounterStore {
    pub async fn connect(url: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(url)?;
        let connection = ConnectionManager::new(client).await?;
        Ok(Self {
            connection,
            op_timeout: Duration::from_secs(2),
        })
    }

    pub fn with_op_timeout(mut self, op_timeout: Duration) -> Self {
        self.op_timeout = op_timeout;
        self
    }

    fn window_secs(window: Duration) -> i64 {
        // Redis expiries have one-second granularity; never round a
        // positive window down to zero.
        (window.as_secs() as i64).max(1)
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn increment(&self, key: &str, window: Duration) -> Result<i64, StoreError> {
        let mut conn = self.connection.clone();
        let expire_secs = Self::window_secs(window);

        let op = async move {
            let (count,): (i64,) = redis::pipe()
                .atomic()
                .incr(key, 1i64)
                .expire(key, expire_secs)
                .ignore()
                .query_async(&mut conn)
                .await?;
            Ok::<i64, redis::RedisError>(count)
        };

        match timeout(self.op_timeout, op).await {
            Ok(result) => result.map_err(StoreError::from),
            Err(_) => Err(StoreError::Timeout(self.op_timeout)),
        }
    }

    async fn ttl(&self, key: &str) -> Result<KeyTtl, StoreError> {
        let mut conn = self.connection.clone();
        let key = key.to_string();

        let op = async move {
            redis::cmd("TTL")
                .arg(&key)
                .query_async::<_, i64>(&mut conn)
                .await
        };

        let secs = match timeout(self.op_timeout, op).await {
            Ok(result) => result.map_err(StoreError::from)?,
            Err(_) => return Err(StoreError::Timeout(self.op_timeout)),
        };

        Ok(match secs {
            -2 => KeyTtl::Missing,
            -1 => KeyTtl::NoExpiry,
            s => KeyTtl::Remaining(Duration::from_secs(s.max(0) as u64)),
        })
    }
}

#[derive(Debug, Clone, Copy)]
struct CounterEntry {
    count: i64,
    expires_at: Instant,
}

/// In-process counter store.
///
/// Used when no Redis address is configured and as the deterministic
/// store in tests. Counts are not shared across processes; deployments
/// running more than one instance should configure Redis.
pub struct MemoryCounterStore {
    entries: DashMap<String, CounterEntry>,
    clock: Arc<dyn Clock>,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
        }
    }
}

impl Default for MemoryCounterStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn increment(&self, key: &str, window: Duration) -> Result<i64, StoreError> {
        let now = self.clock.now();
        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert(CounterEntry {
                count: 0,
                expires_at: now + window,
            });

        if now >= entry.expires_at {
            entry.count = 0;
        }
        entry.count += 1;
        entry.expires_at = now + window;

        Ok(entry.count)
    }

    async fn ttl(&self, key: &str) -> Result<KeyTtl, StoreError> {
        let now = self.clock.now();

        let expired = match self.entries.get(key) {
            None => return Ok(KeyTtl::Missing),
            Some(entry) => {
                if now < entry.expires_at {
                    return Ok(KeyTtl::Remaining(entry.expires_at - now));
                }
                true
            }
        };

        if expired {
            self.entries.remove(key);
        }
        Ok(KeyTtl::Missing)
    }
}
