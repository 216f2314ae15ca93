use super::Middleware;
use crate::handlers::Handler;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, info_span, warn};

/// Request/response access logging
///
/// Emits a "Request received" event before the request runs and a
/// "Request completed" event after it, inside a `request` span carrying the
/// request id. The completion level follows the status class: 4xx logs at
/// `warn`, 5xx at `error`, everything else at `info`.
#[derive(Debug, Clone, Copy, Default)]
pub struct AccessLogMiddleware;

/// Format client addresses as `first (+N more)`
#[must_use]
pub fn describe_client(ips: &[String]) -> String {
    match ips {
        [] => "unknown".to_string(),
        [only] => only.clone(),
        [first, rest @ ..] => format!("{first} (+{} more)", rest.len()),
    }
}

impl Middleware for AccessLogMiddleware {
    fn wrap(&self, next: Handler) -> Handler {
        Arc::new(move |res, req| {
            let started = Instant::now();
            let client = describe_client(&req.client_ips());
            let method = req.method().clone();
            let path = req.path().to_string();
            let span = info_span!("request", request_id = %req.request_id());

            let result = span.in_scope(|| {
                info!(%method, %path, %client, "Request received");
                next(res, req)
            });

            // Errors are rendered further out; report the status they will get.
            let status = match &result {
                Err(err) if !res.is_written() => err.status(),
                _ => res.status(),
            };
            let duration_ms = started.elapsed().as_secs_f64() * 1000.0;

            span.in_scope(|| match status {
                400..=499 => warn!(%method, %path, status, %client, duration_ms, "Request completed"),
                500..=u16::MAX => error!(%method, %path, status, %client, duration_ms, "Request completed"),
                _ => info!(%method, %path, status, %client, duration_ms, "Request completed"),
            });
            result
        })
    }
}
