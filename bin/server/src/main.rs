use portcullis_authz::{Authorizer, ToleranceTable};
use portcullis_server::{AppState, app, config::ServerConfig};
use portcullis_store::PgDatabase;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration from environment
    let config = ServerConfig::from_env().expect("failed to load configuration");
    let token_key = config.token_key().expect("invalid token key");
    let linker = config.linker().expect("invalid base URL");
    tracing::info!(base_url = %linker.base(), "Loaded configuration");

    let db_pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url)
        .await
        .expect("failed to connect to database");

    if config.run_migrations {
        tracing::info!("Running database migrations...");
        sqlx::migrate!("./migrations")
            .run(&db_pool)
            .await
            .expect("failed to run migrations");
    }

    let tolerances = ToleranceTable::standard().expect("invalid taint tolerances");
    let authorizer = Authorizer::new(
        Arc::new(PgDatabase::new(db_pool)),
        tolerances,
        config.authorizer_config(),
    );
    if config.root_password.is_none() {
        tracing::info!("No root password configured; root access is disabled");
    }

    let state = AppState::new(authorizer, token_key, linker, config.cookie.clone());
    tracing::warn!("No WebAuthn verifier configured; login and enrollment are not served");

    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .expect("failed to bind listener");
    tracing::info!(addr = %config.listen_addr, "Listening");

    axum::serve(listener, app(Arc::new(state)))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutting down");
}
