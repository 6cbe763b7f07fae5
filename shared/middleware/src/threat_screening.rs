use crate::rate_limiting::client_request;
use actix_web::{
    body::EitherBody,
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error, HttpResponse,
};
use futures_util::future::LocalBoxFuture;
use jobhub_models::{NewSecurityEvent, SecurityEventType, Severity};
use jobhub_security::events::SecurityEventRecorder;
use jobhub_security::resolve_client_ip;
use jobhub_security::threat::ThreatDetector;
use std::{
    future::{ready, Ready},
    rc::Rc,
};
use tracing::warn;

/// What to do with a suspicious request.
///
/// Detection classifies; blocking is the deploying service's decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ThreatPolicy {
    /// Record and log the detection, let the request proceed.
    #[default]
    LogOnly,
    /// Reject HIGH-severity verdicts with a 403; log the rest.
    BlockHigh,
}

/// Screens the request line and headers against the attack-signature
/// catalogue.
///
/// Middlewares do not buffer request bodies, so this covers url, query
/// string and user-agent; handlers with a parsed body call
/// `ThreatDetector::inspect` directly for field-level checks.
#[derive(Clone)]
pub struct ThreatScreenMiddleware {
    detector: ThreatDetector,
    policy: ThreatPolicy,
    recorder: Option<SecurityEventRecorder>,
}

impl ThreatScreenMiddleware {
    pub fn new(policy: ThreatPolicy) -> Self {
        Self {
            detector: ThreatDetector::new(),
            policy,
            recorder: None,
        }
    }

    /// Record suspicious_activity events through this recorder
    /// (best-effort, off the request's critical path).
    pub fn with_recorder(mut self, recorder: SecurityEventRecorder) -> Self {
        self.recorder = Some(recorder);
        self
    }
}

impl<S, B> Transform<S, ServiceRequest> for ThreatScreenMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type InitError = ();
    type Transform = ThreatScreenMiddlewareService<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(ThreatScreenMiddlewareService {
            service: Rc::new(service),
            middleware: self.clone(),
        }))
    }
}

pub struct ThreatScreenMiddlewareService<S> {
    service: Rc<S>,
    middleware: ThreatScreenMiddleware,
}

impl<S, B> Service<ServiceRequest> for ThreatScreenMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let middleware = self.middleware.clone();
        let service = self.service.clone();

        Box::pin(async move {
            let mut client = client_request(&req);
            // Screen the full request line, query string included.
            if let Some(path_and_query) = req.uri().path_and_query() {
                client.path = path_and_query.as_str().to_string();
            }

            let verdict = middleware.detector.inspect(&client);

            if verdict.is_suspicious {
                let ip = resolve_client_ip(&client);
                let block = middleware.policy == ThreatPolicy::BlockHigh
                    && verdict.severity == Severity::High;

                warn!(
                    ip = %ip,
                    path = %client.path,
                    severity = %verdict.severity,
                    reasons = ?verdict.reasons,
                    blocked = block,
                    "Suspicious request detected"
                );

                if let Some(recorder) = &middleware.recorder {
                    let mut event = NewSecurityEvent::new(
                        SecurityEventType::SuspiciousActivity,
                        verdict.severity,
                        ip,
                    )
                    .with_details(serde_json::json!({
                        "url": client.path,
                        "method": client.method,
                        "reasons": verdict.reasons,
                        "blocked": block,
                    }));
                    if let Some(agent) = client.user_agent() {
                        event = event.with_user_agent(agent);
                    }
                    if let Some(user_id) = &client.user_id {
                        event = event.with_user_id(user_id.clone());
                    }
                    recorder.record_best_effort(event);
                }

                if block {
                    let response = HttpResponse::Forbidden().json(serde_json::json!({
                        "error": "Request blocked",
                    }));
                    return Ok(req.into_response(response).map_into_right_body());
                }
            }

            service
                .call(req)
                .await
                .map(|res| res.map_into_left_body())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{test, web, App};
    use jobhub_security::events::{EventStore, MemoryEventStore};
    use std::sync::Arc;
    use std::time::Duration;

    fn app_with(
        policy: ThreatPolicy,
        store: Arc<MemoryEventStore>,
    ) -> ThreatScreenMiddleware {
        ThreatScreenMiddleware::new(policy)
            .with_recorder(SecurityEventRecorder::new(store))
    }

    #[actix_web::test]
    async fn block_high_policy_rejects_a_traversal_url() {
        let store = Arc::new(MemoryEventStore::new());
        let app = test::init_service(
            App::new()
                .wrap(app_with(ThreatPolicy::BlockHigh, store.clone()))
                .route(
                    "/api/files/{path:.*}",
                    web::get().to(|| async { HttpResponse::Ok().finish() }),
                ),
        )
        .await;

        let resp = test::call_service(
            &app,
            test::TestRequest::get()
                .uri("/api/files/..%2F..%2Fetc%2Fpasswd?raw=../../etc/passwd")
                .to_request(),
        )
        .await;

        assert_eq!(resp.status(), actix_web::http::StatusCode::FORBIDDEN);

        tokio::time::sleep(Duration::from_millis(20)).await;
        let events = store.recent(None, 10).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(
            events[0].event_type,
            SecurityEventType::SuspiciousActivity
        );
        assert_eq!(events[0].severity, Severity::High);
        assert_eq!(events[0].details["blocked"], true);
    }

    #[actix_web::test]
    async fn log_only_policy_lets_the_request_through() {
        let store = Arc::new(MemoryEventStore::new());
        let app = test::init_service(
            App::new()
                .wrap(app_with(ThreatPolicy::LogOnly, store.clone()))
                .route(
                    "/api/files/{path:.*}",
                    web::get().to(|| async { HttpResponse::Ok().finish() }),
                ),
        )
        .await;

        let resp = test::call_service(
            &app,
            test::TestRequest::get()
                .uri("/api/files/x?raw=../../etc/passwd")
                .to_request(),
        )
        .await;

        assert!(resp.status().is_success());

        tokio::time::sleep(Duration::from_millis(20)).await;
        let events = store.recent(None, 10).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].details["blocked"], false);
    }

    #[actix_web::test]
    async fn benign_requests_record_nothing() {
        let store = Arc::new(MemoryEventStore::new());
        let app = test::init_service(
            App::new()
                .wrap(app_with(ThreatPolicy::BlockHigh, store.clone()))
                .route(
                    "/api/jobs",
                    web::get().to(|| async { HttpResponse::Ok().finish() }),
                ),
        )
        .await;

        let resp = test::call_service(
            &app,
            test::TestRequest::get()
                .uri("/api/jobs?query=gardening")
                .to_request(),
        )
        .await;

        assert!(resp.status().is_success());

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(store.recent(None, 10).await.unwrap().is_empty());
    }
}
