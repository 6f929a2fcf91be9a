use portcullis_envoy_authz::{
    ProxyAuthorizer,
    config::ProxyConfig,
    http::{ProxyState, router},
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
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

    let config = ProxyConfig::from_env().expect("failed to load configuration");
    let client = config
        .decision_client()
        .expect("failed to build decision client");
    tracing::info!(endpoint = %client.endpoint(), "Loaded configuration");

    let shutdown = CancellationToken::new();
    let state = Arc::new(ProxyState {
        authorizer: ProxyAuthorizer::new(client, config.plaintext_username_header.clone()),
        path_prefix: config.path_prefix.clone(),
        check_timeout: config.check_timeout(),
        shutdown: shutdown.clone(),
    });

    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .expect("failed to bind listener");
    tracing::info!(addr = %config.listen_addr, "Listening");

    axum::serve(
        listener,
        router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for shutdown signal");
        }
        tracing::info!("Shutting down");
        shutdown.cancel();
    })
    .await
    .expect("server error");
}
