use crate::events::SecurityEventRecorder;
use crate::metrics::{SecurityMetricsAggregator, DEFAULT_SUMMARY_LIMIT};
use actix_web::{web, HttpResponse};
use chrono::{DateTime, Utc};
use jobhub_models::{NewSecurityEvent, Severity};
use serde::Deserialize;

/// Shared state for the security API.
pub struct SecurityApiState {
    pub recorder: SecurityEventRecorder,
    pub aggregator: SecurityMetricsAggregator,
}

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/security")
            .route("/metrics", web::get().to(get_metrics))
            .route("/alerts", web::get().to(get_alerts))
            .route("/events", web::post().to(record_event)),
    );
}

#[derive(Deserialize)]
struct MetricsQuery {
    since: Option<DateTime<Utc>>,
    limit: Option<i64>,
}

#[derive(Deserialize)]
struct AlertsQuery {
    severity: Option<String>,
    limit: Option<i64>,
}

async fn get_metrics(
    state: web::Data<SecurityApiState>,
    query: web::Query<MetricsQuery>,
) -> HttpResponse {
    let limit = query.limit.unwrap_or(DEFAULT_SUMMARY_LIMIT);
    match state.aggregator.summarize(query.since, limit).await {
        Ok(summary) => HttpResponse::Ok().json(summary),
        Err(e) => HttpResponse::InternalServerError().json(e.to_string()),
    }
}

async fn get_alerts(
    state: web::Data<SecurityApiState>,
    query: web::Query<AlertsQuery>,
) -> HttpResponse {
    let severity = match query.severity.as_deref() {
        None => None,
        Some(raw) => match Severity::parse(raw) {
            Some(severity) => Some(severity),
            None => {
                return HttpResponse::BadRequest()
                    .json(format!("unknown severity: {raw}"));
            }
        },
    };

    let limit = query.limit.unwrap_or(DEFAULT_SUMMARY_LIMIT);
    match state.aggregator.recent_alerts(severity, limit).await {
        Ok(alerts) => HttpResponse::Ok().json(alerts),
        Err(e) => HttpResponse::InternalServerError().json(e.to_string()),
    }
}

/// Explicit audit recording, outside the request hot path: persistence
/// failures surface to the caller here.
async fn record_event(
    state: web::Data<SecurityApiState>,
    event: web::Json<NewSecurityEvent>,
) -> HttpResponse {
    match state.recorder.record(event.into_inner()).await {
        Ok(stored) => HttpResponse::Created().json(stored),
        Err(e) => HttpResponse::InternalServerError().json(e.to_string()),
    }
}
