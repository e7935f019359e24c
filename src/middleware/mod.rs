pub mod request_logger;

use axum::Router;
use std::time::Duration;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::timeout::TimeoutLayer;

/// Wraps every route with request logging, panic recovery and a per-request
/// timeout. Logging is outermost so timed-out and panicked requests are logged too.
pub fn with_request_guards<S>(router: Router<S>, request_timeout: Duration) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router
        .layer(TimeoutLayer::new(request_timeout))
        .layer(CatchPanicLayer::new())
        .layer(axum::middleware::from_fn(request_logger::request_logger_middleware))
}
