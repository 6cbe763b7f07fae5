use actix_web::{
    body::EitherBody,
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::header::{HeaderName, HeaderValue},
    Error, HttpMessage, HttpResponse,
};
use futures_util::future::LocalBoxFuture;
use jobhub_models::{NewSecurityEvent, SecurityEventType, Severity};
use jobhub_security::events::SecurityEventRecorder;
use jobhub_security::rate_limit::{RateLimitConfig, RateLimiter};
use jobhub_security::request::ClientRequest;
use jobhub_security::resolve_client_ip;
use std::{
    future::{ready, Ready},
    rc::Rc,
    sync::Arc,
};
use tracing::{debug, warn};

/// Build the normalized request the defense core consumes.
///
/// Headers are copied as-is; identity precedence over x-forwarded-for /
/// x-real-ip / peer address happens inside the core, so only the raw
/// transport peer goes in here.
pub(crate) fn client_request(req: &ServiceRequest) -> ClientRequest {
    let mut client = ClientRequest::new(req.method().as_str(), req.path());

    if let Some(peer) = req.peer_addr() {
        client = client.with_peer_addr(peer.ip().to_string());
    }

    for (name, value) in req.headers() {
        if let Ok(value) = value.to_str() {
            client.insert_header(name.as_str(), value);
        }
    }

    if let Some(user_id) = req.extensions().get::<String>() {
        client = client.with_user_id(user_id.clone());
    }

    client
}

/// Per-route rate limiting over the shared counter store.
///
/// Denied requests get a 429 with the configured message and the
/// X-RateLimit-* headers; allowed requests pass through with remaining
/// and reset headers attached.
#[derive(Clone)]
pub struct RateLimitMiddleware {
    limiter: Arc<RateLimiter>,
    config: RateLimitConfig,
    recorder: Option<SecurityEventRecorder>,
}

impl RateLimitMiddleware {
    pub fn new(limiter: Arc<RateLimiter>, config: RateLimitConfig) -> Self {
        Self {
            limiter,
            config,
            recorder: None,
        }
    }

    /// Record rate_limit_exceeded events through this recorder.
    /// Recording is best-effort here: a degraded event store must never
    /// block request handling.
    pub fn with_recorder(mut self, recorder: SecurityEventRecorder) -> Self {
        self.recorder = Some(recorder);
        self
    }
}

impl<S, B> Transform<S, ServiceRequest> for RateLimitMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type InitError = ();
    type Transform = RateLimitMiddlewareService<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RateLimitMiddlewareService {
            service: Rc::new(service),
            middleware: self.clone(),
        }))
    }
}

pub struct RateLimitMiddlewareService<S> {
    service: Rc<S>,
    middleware: RateLimitMiddleware,
}

impl<S, B> Service<ServiceRequest> for RateLimitMiddlewareService<S>
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
            let client = client_request(&req);
            let decision = middleware.limiter.check(&client, &middleware.config).await;

            if decision.allowed {
                debug!(
                    path = %client.path,
                    remaining = decision.info.remaining,
                    "Rate limit check passed"
                );

                let mut res = service.call(req).await?;
                let headers = res.headers_mut();
                if let Ok(value) = HeaderValue::from_str(&decision.info.remaining.to_string()) {
                    headers.insert(HeaderName::from_static("x-ratelimit-remaining"), value);
                }
                if let Ok(value) = HeaderValue::from_str(&decision.info.reset_time.to_string()) {
                    headers.insert(HeaderName::from_static("x-ratelimit-reset"), value);
                }
                return Ok(res.map_into_left_body());
            }

            let ip = resolve_client_ip(&client);
            warn!(ip = %ip, path = %client.path, "Rate limit exceeded");

            if let Some(recorder) = &middleware.recorder {
                let mut event = NewSecurityEvent::new(
                    SecurityEventType::RateLimitExceeded,
                    Severity::Medium,
                    ip,
                )
                .with_details(serde_json::json!({
                    "url": client.path,
                    "method": client.method,
                    "limit": decision.info.limit,
                }));
                if let Some(agent) = client.user_agent() {
                    event = event.with_user_agent(agent);
                }
                if let Some(user_id) = &client.user_id {
                    event = event.with_user_id(user_id.clone());
                }
                recorder.record_best_effort(event);
            }

            let retry_after_secs = (middleware.config.window_ms() / 1000).max(1);
            let response = HttpResponse::TooManyRequests()
                .insert_header(("X-RateLimit-Limit", decision.info.limit.to_string()))
                .insert_header(("X-RateLimit-Remaining", decision.info.remaining.to_string()))
                .insert_header(("X-RateLimit-Reset", decision.info.reset_time.to_string()))
                .insert_header(("Retry-After", retry_after_secs.to_string()))
                .json(serde_json::json!({
                    "error": "Rate limit exceeded",
                    "message": middleware.config.message(),
                }));

            Ok(req.into_response(response).map_into_right_body())
        })
    }
}
