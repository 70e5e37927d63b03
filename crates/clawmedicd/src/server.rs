//! HTTP server for clawmedicd

use crate::config::Config;
use crate::routes;
use anyhow::{Context, Result};
use axum::extract::DefaultBodyLimit;
use axum::Router;
use clawmedic_common::augmentor::{Augmentor, DisabledAugmentor, HttpAugmentor};
use clawmedic_common::{Doctor, ResultStore, SqliteLedger};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Slack on top of the AI timeout before a request is abandoned
const REQUEST_TIMEOUT_SLACK: Duration = Duration::from_secs(10);

/// Application state shared across handlers
pub struct AppState {
    pub doctor: Arc<Doctor>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(doctor: Doctor) -> Self {
        Self {
            doctor: Arc::new(doctor),
            start_time: Instant::now(),
        }
    }
}

/// Wire the doctor from configuration. A ledger that cannot be opened is
/// logged and skipped; results then live in memory only.
pub fn build_doctor(config: &Config) -> Result<Doctor> {
    let augmentor: Arc<dyn Augmentor> = if config.ai.enabled {
        if config.ai.api_key.is_none() {
            warn!("AI analysis enabled without an API key; requests may be rejected");
        }
        Arc::new(HttpAugmentor::new(config.ai.clone())?)
    } else {
        info!("AI analysis disabled");
        Arc::new(DisabledAugmentor)
    };

    let store = Arc::new(RwLock::new(ResultStore::new(config.store.capacity)));
    let mut doctor = Doctor::new(augmentor, store)
        .with_ai_timeout(Duration::from_secs(config.ai.timeout_secs.max(1)));

    if config.ledger.enabled {
        match SqliteLedger::open_at(&config.ledger.path) {
            Ok(ledger) => {
                info!("Fix ledger at {}", config.ledger.path);
                doctor = doctor.with_ledger(Arc::new(ledger));
            }
            Err(e) => warn!("Fix ledger unavailable, results kept in memory only: {:#}", e),
        }
    }

    Ok(doctor)
}

/// Full router with middleware, without binding
pub fn router(state: AppState, config: &Config) -> Router {
    let request_timeout = Duration::from_secs(config.ai.timeout_secs) + REQUEST_TIMEOUT_SLACK;

    Router::new()
        .merge(routes::diagnose_routes())
        .merge(routes::fix_routes())
        .merge(routes::catalog_routes())
        .merge(routes::stats_routes())
        .merge(routes::health_routes())
        .with_state(Arc::new(state))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(config.server.max_body_bytes))
        .layer(TimeoutLayer::new(request_timeout))
        .layer(TraceLayer::new_for_http())
}

/// Run the HTTP server until Ctrl-C
pub async fn run(config: Config) -> Result<()> {
    let doctor = build_doctor(&config)?;
    info!("  Catalog: {} rule(s)", doctor.catalog().len());

    let app = router(AppState::new(doctor), &config);

    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind))?;
    info!("  Listening on http://{}", config.server.bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutting down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}
