use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    http::{HeaderValue, Method, header},
    routing::{get, post},
};
use tokio::net::TcpListener;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    decompression::RequestDecompressionLayer,
    trace::TraceLayer,
};
use tracing::{info, warn};

use super::{
    services::{health, merge, signed_url, view_file},
    state::AppState,
};
use crate::config::{Config, ServerConfig, StorageProvider};
use crate::signing::SignedUrlIssuer;
use crate::storage::{GcsJsonApi, StorageClient};

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// All routes with their middleware stack
pub fn router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.server);

    Router::new()
        .route("/view-file", get(view_file))
        .route("/merge", post(merge))
        .route("/signed-url", get(signed_url))
        .route("/health", get(health))
        .with_state(state)
        // Automatically decompress gzip request bodies
        .layer(RequestDecompressionLayer::new())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

fn cors_layer(config: &ServerConfig) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::HEAD,
            Method::PUT,
            Method::DELETE,
            Method::PATCH,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE]);

    if config.cors_allow_origins.iter().any(|origin| origin == "*") {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = config
        .cors_allow_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(%origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    layer.allow_origin(AllowOrigin::list(origins))
}

/// Build storage and signing from `config` and serve until SIGINT/SIGTERM
///
/// `address` overrides `server.bind_addr` when given.
pub async fn run(config: Config, address: Option<SocketAddr>) -> Result<(), AnyError> {
    let address = address.unwrap_or(config.server.bind_addr);

    info!(
        provider = ?config.storage.provider,
        bucket = config.storage.bucket.as_deref().unwrap_or("<unset>"),
        "Initializing storage"
    );
    let mut storage = StorageClient::new(
        config.storage.clone(),
        config.merge.max_compose_sources,
    );
    if config.storage.provider == StorageProvider::Gcs && !config.storage.emulate_compose {
        let api = GcsJsonApi::from_config(&config)
            .map_err(|e| format!("Failed to initialize GCS compose: {e}"))?;
        storage = storage.with_native_compose(Arc::new(api));
    }

    let issuer = SignedUrlIssuer::from_config(&config)
        .map_err(|e| format!("Failed to initialize URL signer: {e}"))?;
    info!(signer = issuer.signer_kind(), "URL signer ready");

    let host = config.server.host.clone();
    let state = AppState::new(config, Arc::new(storage), issuer);
    let app = router(state);

    let listener = TcpListener::bind(address).await?;
    info!(%address, host = host.as_deref().unwrap_or("-"), "ComposeBox API listening");

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
