use crate::errors::ServiceError;
use crate::events::EventStore;
use chrono::{DateTime, Utc};
use jobhub_models::{SecurityEvent, SecurityEventType, SecurityMetricsSummary, Severity};
use std::sync::Arc;

pub const DEFAULT_SUMMARY_LIMIT: i64 = 1000;

/// Read-only aggregation over recorded security events for the admin
/// dashboard. Computes counts by filtering previously recorded events;
/// never mutates anything.
pub struct SecurityMetricsAggregator {
    store: Arc<dyn EventStore>,
}

impl SecurityMetricsAggregator {
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self { store }
    }

    /// Summary counts over events at or after `since` (all recorded
    /// events when `None`), considering at most `limit` records. An
    /// empty event set yields all-zero counts.
    pub async fn summarize(
        &self,
        since: Option<DateTime<Utc>>,
        limit: i64,
    ) -> Result<SecurityMetricsSummary, ServiceError> {
        let events = self.store.fetch(since, limit).await?;

        let mut summary = SecurityMetricsSummary::default();
        for event in &events {
            summary.total_requests += 1;
            match event.event_type {
                SecurityEventType::RateLimitExceeded => summary.rate_limited_requests += 1,
                SecurityEventType::SuspiciousActivity => summary.blocked_requests += 1,
                SecurityEventType::AuthFailure => summary.auth_failures += 1,
                SecurityEventType::AccessDenied => {}
            }
        }

        Ok(summary)
    }

    /// Most recent alerts, most recent first, optionally filtered by
    /// severity.
    pub async fn recent_alerts(
        &self,
        severity: Option<Severity>,
        limit: i64,
    ) -> Result<Vec<SecurityEvent>, ServiceError> {
        self.store.recent(severity, limit).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::MemoryEventStore;
    use chrono::Duration;
    use serde_json::json;
    use uuid::Uuid;

    fn event(
        event_type: SecurityEventType,
        severity: Severity,
        timestamp: DateTime<Utc>,
    ) -> SecurityEvent {
        SecurityEvent {
            id: Uuid::new_v4(),
            event_type,
            severity,
            ip: "198.51.100.4".to_string(),
            user_id: None,
            user_agent: None,
            details: json!({}),
            timestamp,
        }
    }

    #[tokio::test]
    async fn empty_event_set_yields_zero_counts() {
        let aggregator = SecurityMetricsAggregator::new(Arc::new(MemoryEventStore::new()));

        let summary = aggregator
            .summarize(None, DEFAULT_SUMMARY_LIMIT)
            .await
            .unwrap();
        assert_eq!(summary, SecurityMetricsSummary::default());

        let alerts = aggregator
            .recent_alerts(None, DEFAULT_SUMMARY_LIMIT)
            .await
            .unwrap();
        assert!(alerts.is_empty());
    }

    #[tokio::test]
    async fn summary_counts_by_event_type() {
        let store = Arc::new(MemoryEventStore::new());
        let base = Utc::now();

        let fixtures = [
            (SecurityEventType::RateLimitExceeded, Severity::Medium, 1i64),
            (SecurityEventType::RateLimitExceeded, Severity::Medium, 2),
            (SecurityEventType::SuspiciousActivity, Severity::High, 3),
            (SecurityEventType::AuthFailure, Severity::Medium, 4),
            (SecurityEventType::AccessDenied, Severity::Low, 5),
        ];
        for (event_type, severity, minutes) in fixtures {
            store
                .insert(event(event_type, severity, base - Duration::minutes(minutes)))
                .await
                .unwrap();
        }

        let aggregator = SecurityMetricsAggregator::new(store);
        let summary = aggregator
            .summarize(None, DEFAULT_SUMMARY_LIMIT)
            .await
            .unwrap();

        assert_eq!(summary.total_requests, 5);
        assert_eq!(summary.rate_limited_requests, 2);
        assert_eq!(summary.blocked_requests, 1);
        assert_eq!(summary.auth_failures, 1);
    }

    #[tokio::test]
    async fn since_bound_excludes_older_events() {
        let store = Arc::new(MemoryEventStore::new());
        let base = Utc::now();

        store
            .insert(event(
                SecurityEventType::AuthFailure,
                Severity::Medium,
                base - Duration::hours(3),
            ))
            .await
            .unwrap();
        store
            .insert(event(
                SecurityEventType::AuthFailure,
                Severity::Medium,
                base - Duration::minutes(10),
            ))
            .await
            .unwrap();

        let aggregator = SecurityMetricsAggregator::new(store);
        let summary = aggregator
            .summarize(Some(base - Duration::hours(1)), DEFAULT_SUMMARY_LIMIT)
            .await
            .unwrap();

        assert_eq!(summary.total_requests, 1);
        assert_eq!(summary.auth_failures, 1);
    }

    #[tokio::test]
    async fn alerts_filter_by_severity_most_recent_first() {
        let store = Arc::new(MemoryEventStore::new());
        let base = Utc::now();

        store
            .insert(event(
                SecurityEventType::SuspiciousActivity,
                Severity::High,
                base - Duration::minutes(30),
            ))
            .await
            .unwrap();
        store
            .insert(event(
                SecurityEventType::RateLimitExceeded,
                Severity::Medium,
                base - Duration::minutes(20),
            ))
            .await
            .unwrap();
        store
            .insert(event(
                SecurityEventType::SuspiciousActivity,
                Severity::High,
                base - Duration::minutes(10),
            ))
            .await
            .unwrap();

        let aggregator = SecurityMetricsAggregator::new(store);
        let alerts = aggregator
            .recent_alerts(Some(Severity::High), DEFAULT_SUMMARY_LIMIT)
            .await
            .unwrap();

        assert_eq!(alerts.len(), 2);
        assert!(alerts[0].timestamp > alerts[1].timestamp);
        assert!(alerts.iter().all(|a| a.severity == Severity::High));
    }
}
