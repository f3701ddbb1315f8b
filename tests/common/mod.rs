#![allow(dead_code)]

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, Response},
    Router,
};
use chrono::{DateTime, TimeZone, Utc};
use expense_tracker::{
    auth::Identity,
    clock::ManualClock,
    config::ServiceConfig,
    AppContext,
};
use jsonwebtoken::{encode, EncodingKey, Header};
use secrecy::Secret;
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

pub const SECRET: &str = "integration-test-secret";
pub const START: i64 = 1_700_000_000;

pub fn start() -> DateTime<Utc> {
    Utc.timestamp_opt(START, 0).unwrap()
}

pub struct TestApp {
    pub app: Router,
    pub clock: ManualClock,
    pub context: AppContext,
}

impl TestApp {
    pub fn new(policy: &str) -> Self {
        let mut config = ServiceConfig::default();
        config.rate_limit.policy = policy.to_string();
        Self::with_config(config)
    }

    pub fn with_config(config: ServiceConfig) -> Self {
        let clock = ManualClock::new(start());
        let secret = Secret::new(SECRET.to_string());
        let context = AppContext::new(config, &secret, Arc::new(clock.clone())).unwrap();

        Self {
            app: context.router(),
            clock,
            context,
        }
    }

    /// Token for `sub` issued by the service itself
    pub fn token(&self, sub: &str) -> String {
        self.context.state.issuer.issue(&Identity::new(sub)).unwrap()
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.app.clone().oneshot(request).await.unwrap()
    }
}

/// Sign arbitrary claims with the shared test secret
pub fn sign(claims: &Value) -> String {
    encode(
        &Header::default(),
        claims,
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .unwrap()
}

pub fn request(method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

pub fn get(uri: &str, token: Option<&str>) -> Request<Body> {
    request(Method::GET, uri, token, None)
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

pub fn header_value<'a>(response: &'a Response<Body>, name: &str) -> Option<&'a str> {
    response.headers().get(name).and_then(|v| v.to_str().ok())
}
