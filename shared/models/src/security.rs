use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Severity of a security event or detection verdict.
///
/// Ordered so that `max()` across matched signatures yields the final
/// classification: `Low < Medium < High`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "LOW",
            Severity::Medium => "MEDIUM",
            Severity::High => "HIGH",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_uppercase().as_str() {
            "LOW" => Some(Severity::Low),
            "MEDIUM" => Some(Severity::Medium),
            "HIGH" => Some(Severity::High),
            _ => None,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Category of a recorded security event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityEventType {
    RateLimitExceeded,
    SuspiciousActivity,
    AuthFailure,
    AccessDenied,
}

impl SecurityEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SecurityEventType::RateLimitExceeded => "rate_limit_exceeded",
            SecurityEventType::SuspiciousActivity => "suspicious_activity",
            SecurityEventType::AuthFailure => "auth_failure",
            SecurityEventType::AccessDenied => "access_denied",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "rate_limit_exceeded" => Some(SecurityEventType::RateLimitExceeded),
            "suspicious_activity" => Some(SecurityEventType::SuspiciousActivity),
            "auth_failure" => Some(SecurityEventType::AuthFailure),
            "access_denied" => Some(SecurityEventType::AccessDenied),
            _ => None,
        }
    }
}

impl fmt::Display for SecurityEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Durable security event record.
///
/// This is the persisted contract the admin dashboard and analytics
/// tooling read; field names are stable (camelCase on the wire).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityEvent {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub event_type: SecurityEventType,
    pub severity: Severity,
    pub ip: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    pub details: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

/// A security event as submitted for recording, before the recorder
/// assigns its id and timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSecurityEvent {
    #[serde(rename = "type")]
    pub event_type: SecurityEventType,
    pub severity: Severity,
    pub ip: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default = "default_details")]
    pub details: serde_json::Value,
}

fn default_details() -> serde_json::Value {
    serde_json::json!({})
}

impl NewSecurityEvent {
    pub fn new(event_type: SecurityEventType, severity: Severity, ip: impl Into<String>) -> Self {
        Self {
            event_type,
            severity,
            ip: ip.into(),
            user_id: None,
            user_agent: None,
            details: default_details(),
        }
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }
}

/// Summary counts produced by the metrics aggregator for the dashboard.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityMetricsSummary {
    pub total_requests: i64,
    pub blocked_requests: i64,
    pub rate_limited_requests: i64,
    pub auth_failures: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_serializes_uppercase() {
        assert_eq!(serde_json::to_string(&Severity::High).unwrap(), "\"HIGH\"");
        assert_eq!(Severity::parse("medium"), Some(Severity::Medium));
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::Medium < Severity::High);
    }

    #[test]
    fn event_type_round_trips_snake_case() {
        let json = serde_json::to_string(&SecurityEventType::RateLimitExceeded).unwrap();
        assert_eq!(json, "\"rate_limit_exceeded\"");
        assert_eq!(
            SecurityEventType::parse("suspicious_activity"),
            Some(SecurityEventType::SuspiciousActivity)
        );
    }

    #[test]
    fn event_serializes_contract_field_names() {
        let event = SecurityEvent {
            id: Uuid::new_v4(),
            event_type: SecurityEventType::AuthFailure,
            severity: Severity::Medium,
            ip: "203.0.113.1".to_string(),
            user_id: Some("user-42".to_string()),
            user_agent: None,
            details: serde_json::json!({ "url": "/api/login" }),
            timestamp: Utc::now(),
        };

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "auth_failure");
        assert_eq!(value["severity"], "MEDIUM");
        assert_eq!(value["userId"], "user-42");
        assert!(value.get("userAgent").is_none());
    }
}
