use axum::{extract::Request, middleware::Next, response::Response};
use std::time::Instant;

/// Adds `X-Response-Time-Us` and `Server-Timing` headers to every metrics
/// api response and traces the request at debug level.
pub async fn timing_middleware(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_owned();

    let start = Instant::now();
    let mut response = next.run(req).await;
    let elapsed = start.elapsed();
    let us = elapsed.as_micros();

    if let Ok(val) = us.to_string().parse() {
        response.headers_mut().insert("x-response-time-us", val);
    }

    let server_timing = format!("total;dur={:.3}", elapsed.as_secs_f64() * 1000.0);
    if let Ok(val) = server_timing.parse() {
        response.headers_mut().insert("server-timing", val);
    }

    // SSE responses return immediately; their timing says nothing
    if !path.ends_with("/stream") {
        tracing::debug!(
            %method,
            path = %path,
            status = response.status().as_u16(),
            us = us as u64,
            "metrics api request"
        );
    }

    response
}
