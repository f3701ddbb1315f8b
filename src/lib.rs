pub mod auth;
pub mod clock;
pub mod config;
pub mod error;
pub mod gate;
pub mod handlers;
pub mod metrics;
pub mod observability;
pub mod rate_limit;
pub mod repository;
pub mod secrets;

use crate::auth::jwt::parse_algorithm;
use crate::auth::{TokenIssuer, TokenVerifier};
use crate::clock::{Clock, SystemClock};
use crate::config::ServiceConfig;
use crate::error::{Result, ServiceError};
use crate::gate::{admission_gate, AdmissionGate};
use crate::handlers::AppState;
use crate::metrics::{metrics_handler, track_requests, MetricsService};
use crate::observability::{request_id_middleware, request_span};
use crate::rate_limit::{spawn_window_sweeper, RateLimiter, WindowStore};
use crate::repository::{InMemoryExpenseRepository, InMemoryUserRepository};
use crate::secrets::{SecretString, SecretsManager, DEFAULT_SECRETS_DIR};
use axum::{
    extract::Request,
    middleware,
    routing::{get, post},
    Router,
};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Notify;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

pub use crate::observability::init_tracing;

/// Everything the router needs, wired once at startup
pub struct AppContext {
    pub config: ServiceConfig,
    pub state: AppState,
    pub gate: Arc<AdmissionGate>,
    pub limiter: Arc<RateLimiter>,
    metrics: Option<MetricsService>,
}

impl AppContext {
    /// Build the verifier, limiter and repositories from configuration.
    ///
    /// The window store is created here and shared by every request.
    pub fn new(config: ServiceConfig, secret: &SecretString, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;

        let algorithm = parse_algorithm(&config.auth.algorithm)?;
        let policy = config.rate_limit_policy()?;

        let store = Arc::new(match config.rate_limit.max_identities {
            Some(max) => WindowStore::with_max_identities(max),
            None => WindowStore::new(),
        });
        let limiter = Arc::new(RateLimiter::new(store, policy, clock.clone()));
        let verifier = Arc::new(TokenVerifier::new(secret, algorithm, clock.clone()));
        let issuer = Arc::new(TokenIssuer::new(
            secret,
            algorithm,
            config.token_ttl(),
            clock.clone(),
        )?);

        info!(
            policy = %limiter.policy(),
            algorithm = ?algorithm,
            "Admission gate configured"
        );

        let state = AppState {
            users: Arc::new(InMemoryUserRepository::new()),
            expenses: Arc::new(InMemoryExpenseRepository::new()),
            issuer,
            clock,
        };

        Ok(Self {
            config,
            state,
            gate: Arc::new(AdmissionGate::new(verifier, limiter.clone())),
            limiter,
            metrics: None,
        })
    }

    /// Expose `/metrics` from this recorder
    pub fn with_metrics(mut self, metrics: MetricsService) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Build the HTTP router
    pub fn router(&self) -> Router {
        let expenses = Router::new()
            .route(
                "/",
                post(handlers::create_expense).get(handlers::list_expenses),
            )
            .route("/summary", get(handlers::expense_summary))
            .route(
                "/:id",
                get(handlers::get_expense)
                    .put(handlers::update_expense)
                    .delete(handlers::delete_expense),
            )
            .route_layer(middleware::from_fn_with_state(
                self.gate.clone(),
                admission_gate,
            ));

        let api = Router::new()
            .route("/signup", post(handlers::signup))
            .route("/login", post(handlers::login))
            .nest("/expenses", expenses);

        let mut app = Router::new()
            .route("/health", get(handlers::health))
            .nest("/api/v1", api)
            .with_state(self.state.clone());

        if let Some(metrics) = &self.metrics {
            app = app.merge(
                Router::new()
                    .route("/metrics", get(metrics_handler))
                    .with_state(metrics.clone()),
            );
        }

        app.layer(middleware::from_fn(track_requests))
            .layer(middleware::from_fn(request_id_middleware))
            .layer(TraceLayer::new_for_http().make_span_with(|req: &Request| request_span(req)))
    }
}

/// Run the service until a shutdown signal arrives
pub async fn run(config: ServiceConfig) -> Result<()> {
    let secrets = SecretsManager::from_environment(Path::new(DEFAULT_SECRETS_DIR));
    let secret = secrets.signing_secret()?;

    let mut context = AppContext::new(config, &secret, Arc::new(SystemClock::new()))?;
    if context.config.metrics.enabled {
        context = context.with_metrics(MetricsService::new()?);
    }

    let sweeper = spawn_window_sweeper(context.limiter.clone(), context.config.sweep_interval());

    let addr = format!("{}:{}", context.config.server.host, context.config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "Server listening");

    let shutdown = Arc::new(Notify::new());
    let server = axum::serve(listener, context.router()).with_graceful_shutdown({
        let shutdown = shutdown.clone();
        async move { shutdown.notified().await }
    });
    let mut server = tokio::spawn(async move { server.await });

    tokio::select! {
        finished = &mut server => {
            sweeper.abort();
            return match finished {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(ServiceError::Internal(format!("Server error: {}", e))),
                Err(e) => Err(ServiceError::Internal(format!("Server task failed: {}", e))),
            };
        }
        _ = shutdown_signal() => {}
    }

    shutdown.notify_one();
    let deadline = context.config.shutdown_timeout();

    match tokio::time::timeout(deadline, server).await {
        Ok(Ok(Ok(()))) => info!("Server stopped"),
        Ok(Ok(Err(e))) => error!(error = %e, "Server error during shutdown"),
        Ok(Err(e)) => error!(error = %e, "Server task failed during shutdown"),
        Err(_) => warn!(
            deadline_secs = deadline.as_secs(),
            "Shutdown deadline elapsed, dropping in-flight requests"
        ),
    }

    sweeper.abort();
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
