pub mod security;

pub use security::{
    NewSecurityEvent, SecurityEvent, SecurityEventType, SecurityMetricsSummary, Severity,
};
