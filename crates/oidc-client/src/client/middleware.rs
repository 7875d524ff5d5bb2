//! Middleware for the provider HTTP client.
//!
//! Composed with the reqwest client through `reqwest-middleware`. Every provider
//! call is a single attempt.

use std::time::{Duration, Instant};

use http::Extensions;
use reqwest::{Request, Response};
use reqwest_middleware::{Middleware, Next, Result};

/// Logs method, path, status and latency of every provider call.
///
/// Only the URL path is recorded. Query strings and headers may carry codes or
/// credentials and never reach the logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct TraceRequests;

#[async_trait::async_trait]
impl Middleware for TraceRequests {
    async fn handle(
        &self,
        req: Request,
        extensions: &mut Extensions,
        next: Next<'_>,
    ) -> Result<Response> {
        let method = req.method().clone();
        let host = req.url().host_str().unwrap_or_default().to_owned();
        let path = req.url().path().to_owned();
        let started = Instant::now();

        let result = next.run(req, extensions).await;
        let elapsed_ms = millis(started.elapsed());

        match &result {
            Ok(response) => tracing::debug!(
                %method,
                host,
                path,
                status = response.status().as_u16(),
                elapsed_ms,
                "Provider call completed"
            ),
            Err(e) => tracing::warn!(
                %method,
                host,
                path,
                elapsed_ms,
                error = %e,
                "Provider call failed"
            ),
        }

        result
    }
}

/// Whole milliseconds, saturating at `u64::MAX`.
fn millis(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}
