// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use sentinel_iam::{
    api::router,
    config::{AppConfig, DEFAULT_LOG_FILTER, LOG_FORMAT_ENV},
    mailer::LogMailer,
    state::{bootstrap, AppState},
    storage::IdentityDatabase,
};
use tokio::{net::TcpListener, signal};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let json = std::env::var(LOG_FORMAT_ENV).is_ok_and(|format| format.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(env_filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().flatten_event(true))
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer().pretty()).init();
    }
}

#[tokio::main]
async fn main() {
    init_tracing();

    let config = AppConfig::from_env().expect("Invalid configuration");
    tracing::info!(?config, "Configuration loaded");

    let db_path = config.database_path();
    let store = Arc::new(IdentityDatabase::open(&db_path).expect("Failed to open identity database"));
    tracing::info!(path = %db_path.display(), "Identity database opened");

    let mailer = Arc::new(LogMailer::new(&config.mailer));
    let addr = config.bind_address();
    let state = AppState::new(config, store, mailer).expect("Invalid access rules");
    bootstrap(&state).expect("Failed to bootstrap identity records");

    let listener = TcpListener::bind(&addr).await.expect("Failed to bind listener");
    tracing::info!(addr = %addr, "Sentinel IAM listening (docs at /docs)");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("HTTP server failed");

    tracing::info!("Service shutdown complete");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        },
    }
}
