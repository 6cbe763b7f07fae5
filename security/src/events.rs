use crate::errors::ServiceError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jobhub_models::{NewSecurityEvent, SecurityEvent, Severity};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error};
use uuid::Uuid;

/// Durable storage for security events.
///
/// Injected so the recorder and aggregator run identically against
/// Postgres in production and the in-memory store in tests or
/// database-less deployments.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Persist one event and echo back the stored record.
    async fn insert(&self, event: SecurityEvent) -> Result<SecurityEvent, ServiceError>;

    /// Events at or after `since` (all events when `None`), most recent
    /// first, capped at `limit`.
    async fn fetch(
        &self,
        since: Option<DateTime<Utc>>,
        limit: i64,
    ) -> Result<Vec<SecurityEvent>, ServiceError>;

    /// Most recent events, optionally filtered by severity.
    async fn recent(
        &self,
        severity: Option<Severity>,
        limit: i64,
    ) -> Result<Vec<SecurityEvent>, ServiceError>;
}

/// Postgres-backed event store over the `security_events` table.
pub struct PgEventStore {
    pool: PgPool,
}

impl PgEventStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_event(row: &PgRow) -> Result<SecurityEvent, ServiceError> {
        let event_type_raw: String = row.try_get("event_type")?;
        let severity_raw: String = row.try_get("severity")?;

        let event_type = jobhub_models::SecurityEventType::parse(&event_type_raw)
            .ok_or_else(|| {
                ServiceError::Internal(format!("unknown event type in store: {event_type_raw}"))
            })?;
        let severity = Severity::parse(&severity_raw).ok_or_else(|| {
            ServiceError::Internal(format!("unknown severity in store: {severity_raw}"))
        })?;

        Ok(SecurityEvent {
            id: row.try_get("id")?,
            event_type,
            severity,
            ip: row.try_get("ip")?,
            user_id: row.try_get("user_id")?,
            user_agent: row.try_get("user_agent")?,
            details: row.try_get("details")?,
            timestamp: row.try_get("timestamp")?,
        })
    }
}

#[async_trait]
impl EventStore for PgEventStore {
    async fn insert(&self, event: SecurityEvent) -> Result<SecurityEvent, ServiceError> {
        sqlx::query(
            r#"
            INSERT INTO security_events
                (id, event_type, severity, ip, user_id, user_agent, details, timestamp)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(event.id)
        .bind(event.event_type.as_str())
        .bind(event.severity.as_str())
        .bind(&event.ip)
        .bind(&event.user_id)
        .bind(&event.user_agent)
        .bind(&event.details)
        .bind(event.timestamp)
        .execute(&self.pool)
        .await?;

        Ok(event)
    }

    async fn fetch(
        &self,
        since: Option<DateTime<Utc>>,
        limit: i64,
    ) -> Result<Vec<SecurityEvent>, ServiceError> {
        let rows = sqlx::query(
            r#"
            SELECT id, event_type, severity, ip, user_id, user_agent, details, timestamp
            FROM security_events
            WHERE ($1::timestamptz IS NULL OR timestamp >= $1)
            ORDER BY timestamp DESC
            LIMIT $2
            "#,
        )
        .bind(since)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_event).collect()
    }

    async fn recent(
        &self,
        severity: Option<Severity>,
        limit: i64,
    ) -> Result<Vec<SecurityEvent>, ServiceError> {
        let rows = sqlx::query(
            r#"
            SELECT id, event_type, severity, ip, user_id, user_agent, details, timestamp
            FROM security_events
            WHERE ($1::text IS NULL OR severity = $1)
            ORDER BY timestamp DESC
            LIMIT $2
            "#,
        )
        .bind(severity.map(|s| s.as_str()))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_event).collect()
    }
}

/// In-process event store for database-less deployments and tests.
pub struct MemoryEventStore {
    events: Arc<RwLock<Vec<SecurityEvent>>>,
}

impl MemoryEventStore {
    pub fn new() -> Self {
        Self {
            events: Arc::new(RwLock::new(Vec::new())),
        }
    }
}

impl Default for MemoryEventStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventStore for MemoryEventStore {
    async fn insert(&self, event: SecurityEvent) -> Result<SecurityEvent, ServiceError> {
        let mut events = self.events.write().await;
        events.push(event.clone());
        Ok(event)
    }

    async fn fetch(
        &self,
        since: Option<DateTime<Utc>>,
        limit: i64,
    ) -> Result<Vec<SecurityEvent>, ServiceError> {
        let events = self.events.read().await;
        let mut matched: Vec<SecurityEvent> = events
            .iter()
            .filter(|e| since.map(|s| e.timestamp >= s).unwrap_or(true))
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        matched.truncate(limit.max(0) as usize);
        Ok(matched)
    }

    async fn recent(
        &self,
        severity: Option<Severity>,
        limit: i64,
    ) -> Result<Vec<SecurityEvent>, ServiceError> {
        let events = self.events.read().await;
        let mut matched: Vec<SecurityEvent> = events
            .iter()
            .filter(|e| severity.map(|s| e.severity == s).unwrap_or(true))
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        matched.truncate(limit.max(0) as usize);
        Ok(matched)
    }
}

/// Writes security events to the durable store.
///
/// One write per call, no batching and no deduplication: repeated
/// identical detections produce repeated records so that event volume
/// itself is a signal for the aggregator.
#[derive(Clone)]
pub struct SecurityEventRecorder {
    store: Arc<dyn EventStore>,
}

impl SecurityEventRecorder {
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self { store }
    }

    /// Persist an event, assigning its id and timestamp.
    ///
    /// Failures propagate: silently losing a security record is worse
    /// than surfacing the failure to the operator.
    pub async fn record(&self, event: NewSecurityEvent) -> Result<SecurityEvent, ServiceError> {
        let event = SecurityEvent {
            id: Uuid::new_v4(),
            event_type: event.event_type,
            severity: event.severity,
            ip: event.ip,
            user_id: event.user_id,
            user_agent: event.user_agent,
            details: event.details,
            timestamp: Utc::now(),
        };

        let stored = self.store.insert(event).await?;
        debug!(
            event_type = %stored.event_type,
            severity = %stored.severity,
            ip = %stored.ip,
            "Security event recorded"
        );
        Ok(stored)
    }

    /// Hot-path variant: the write happens off the request's critical
    /// path and a persistence failure is logged, never surfaced, so a
    /// degraded event store cannot block or fail the triggering request.
    pub fn record_best_effort(&self, event: NewSecurityEvent) {
        let recorder = self.clone();
        tokio::spawn(async move {
            if let Err(err) = recorder.record(event).await {
                error!(error = %err, "Failed to record security event");
            }
        });
    }
}
