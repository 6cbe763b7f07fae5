// Request defense core: client identity, rate limiting, threat
// detection, security event recording and aggregation.
pub mod errors;
pub mod events;
pub mod handlers;
pub mod identity;
pub mod metrics;
pub mod rate_limit;
pub mod request;
pub mod store;
pub mod threat;

pub use errors::ServiceError;
pub use events::{EventStore, MemoryEventStore, PgEventStore, SecurityEventRecorder};
pub use identity::resolve_client_ip;
pub use metrics::SecurityMetricsAggregator;
pub use rate_limit::{
    DefaultKeyStrategy, KeyStrategy, RateLimitConfig, RateLimitInfo, RateLimitResult, RateLimiter,
    DEFAULT_LIMIT_MESSAGE,
};
pub use request::ClientRequest;
pub use store::{
    Clock, CounterStore, KeyTtl, MemoryCounterStore, MockClock, RedisCounterStore, StoreError,
    SystemClock,
};
pub use threat::{DetectionResult, SecurityPattern, ThreatDetector};
