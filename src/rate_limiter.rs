use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::{Request, Response};
use reqwest_middleware::{Middleware, Next};
use std::{num::NonZeroU32, sync::Arc, time::Duration};

/// Delays each request until the quota admits it.
#[derive(Clone)]
pub struct RateLimiterMiddleware {
    rate_limiter: Arc<DefaultDirectRateLimiter>,
}

impl RateLimiterMiddleware {
    /// Allows at most `max_calls` requests in any `period` window.
    ///
    /// Calls are spaced `period / max_calls` apart with no burst allowance, so
    /// any window of length `period` admits at most `max_calls` of them.
    /// Returns `None` if `period` is zero.
    pub fn with_period(max_calls: NonZeroU32, period: Duration) -> Option<Self> {
        let quota = Quota::with_period(period / max_calls.get())?;
        Some(Self {
            rate_limiter: Arc::new(RateLimiter::direct(quota)),
        })
    }
}

#[async_trait::async_trait]
impl Middleware for RateLimiterMiddleware {
    async fn handle(
        &self,
        req: Request,
        extensions: &mut http::Extensions,
        next: Next<'_>,
    ) -> reqwest_middleware::Result<Response> {
        self.rate_limiter.until_ready().await;
        next.run(req, extensions).await
    }
}
