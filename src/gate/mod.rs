//! Admission gate for protected routes.
//!
//! Every request walks two checks in a fixed order:
//!
//! 1. `Unauthenticated`: the bearer token is verified. Failure ends the
//!    request with 401 before any rate limit state is touched.
//! 2. `Authenticated(identity)`: the identity's fixed window is counted.
//!    Rejection ends the request with 429 and the rate limit headers.
//! 3. `Admitted`: the request is forwarded with the [`Identity`] in its
//!    extensions, and the downstream response gets the rate limit headers.
//!
//! There is no anonymous fallback: a protected route always has a verified
//! identity, and a handler that extracts `Extension<Identity>` outside the
//! gate fails loudly instead of limiting by network address.

use crate::auth::{Identity, TokenVerifier};
use crate::error::{Result, ServiceError};
use crate::metrics;
use crate::rate_limit::{apply_rate_limit_headers, RateLimitDecision, RateLimiter};
use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// A request that passed both checks
#[derive(Debug, Clone)]
pub struct Admission {
    pub identity: Identity,
    pub decision: RateLimitDecision,
}

/// Authentication followed by rate limiting
pub struct AdmissionGate {
    verifier: Arc<TokenVerifier>,
    limiter: Arc<RateLimiter>,
}

impl AdmissionGate {
    pub fn new(verifier: Arc<TokenVerifier>, limiter: Arc<RateLimiter>) -> Self {
        Self { verifier, limiter }
    }

    /// Run both checks against the request headers
    pub fn admit(&self, headers: &HeaderMap) -> Result<Admission> {
        let identity = match self.verifier.verify_headers(headers) {
            Ok(identity) => {
                metrics::record_auth_attempt(None);
                identity
            }
            Err(failure) => {
                warn!(reason = failure.kind(), "Authentication failed");
                metrics::record_auth_attempt(Some(failure));
                return Err(ServiceError::Unauthorized(failure));
            }
        };

        let decision = self.limiter.admit(identity.as_str()).map_err(|e| {
            error!(identity = %identity, error = %e, "Rate limit check failed");
            metrics::record_store_failure();
            e
        })?;
        metrics::record_rate_limit_decision(decision.allowed);

        if !decision.allowed {
            warn!(
                identity = %identity,
                limit = decision.limit,
                reset_at = %decision.reset_at,
                "Rate limit exceeded"
            );
            return Err(ServiceError::RateLimited(decision));
        }

        debug!(
            identity = %identity,
            remaining = decision.remaining,
            "Request admitted"
        );

        Ok(Admission { identity, decision })
    }
}

/// Axum middleware wrapping [`AdmissionGate::admit`]
pub async fn admission_gate(
    State(gate): State<Arc<AdmissionGate>>,
    mut request: Request,
    next: Next,
) -> Response {
    let admission = match gate.admit(request.headers()) {
        Ok(admission) => admission,
        Err(e) => return e.into_response(),
    };

    request.extensions_mut().insert(admission.identity);
    let mut response = next.run(request).await;
    apply_rate_limit_headers(response.headers_mut(), &admission.decision);
    response
}
