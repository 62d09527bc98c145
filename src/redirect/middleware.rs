use axum::{body::Body, http::Request, middleware::Next, response::Response};
use std::time::Instant;

/// When the redirect server first saw a request
#[derive(Copy, Clone)]
pub struct RequestStart(pub Instant);

impl RequestStart {
    pub fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.0.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}

/// Stamp the request before routing so handler timing covers extraction too
pub async fn record_request_start(mut request: Request<Body>, next: Next) -> Response {
    request.extensions_mut().insert(RequestStart(Instant::now()));
    next.run(request).await
}
