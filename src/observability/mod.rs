use crate::config::LogFormat;
use crate::error::{Result, ServiceError};
use axum::{
    extract::Request,
    http::{self, HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use tracing::{field, info, info_span, Span};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

pub const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

const DEFAULT_FILTER: &str = "expense_tracker=debug,tower_http=debug";

/// Install the global tracing subscriber.
///
/// `RUST_LOG` overrides the default filter.
pub fn init_tracing(format: LogFormat) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into());

    let installed = match format {
        LogFormat::Compact => tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .compact()
            .try_init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .json()
            .with_current_span(true)
            .try_init(),
    };
    installed.map_err(|e| ServiceError::Internal(format!("Failed to initialize tracing: {}", e)))?;

    info!(?format, "Tracing initialized");
    Ok(())
}

/// Span for one HTTP request, with a `request_id` slot filled in by
/// [`request_id_middleware`]
pub fn request_span<B>(request: &http::Request<B>) -> Span {
    info_span!(
        "request",
        method = %request.method(),
        uri = %request.uri(),
        request_id = field::Empty,
    )
}

/// Reuse the caller's `x-request-id` or mint one, record it on the request
/// span, and echo it on the response
pub async fn request_id_middleware(req: Request, next: Next) -> Response {
    let request_id = req
        .headers()
        .get(&REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(|s| s.to_string())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    Span::current().record("request_id", request_id.as_str());

    let mut response = next.run(req).await;

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }

    response
}
