use std::sync::Arc;

use axum::{
    Router,
    http::HeaderValue,
    routing::{get, post},
};
use color_eyre::eyre::{Context, eyre};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::http_server::{
    http_routes::{convert::convert, download_image::download_image, media_data::get_media_data},
    state::AppState,
};

pub struct HttpServerConfig {
    pub port: u16,
    pub app_state: AppState,
}

async fn root() -> &'static str {
    "WavCon server is running"
}

fn cors_layer(origins: &[String]) -> color_eyre::Result<CorsLayer> {
    if origins.is_empty() {
        return Ok(CorsLayer::permissive());
    }

    let origins = origins
        .iter()
        .map(|origin| {
            HeaderValue::from_str(origin).wrap_err_with(|| eyre!("Invalid CORS origin: {}", origin))
        })
        .collect::<color_eyre::Result<Vec<_>>>()?;
    Ok(CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(tower_http::cors::Any)
        .allow_headers(tower_http::cors::Any)
        .expose_headers(tower_http::cors::Any))
}

pub fn router(app_state: Arc<AppState>) -> color_eyre::Result<Router> {
    let cors_layer = cors_layer(&app_state.config.http.cors_origins)?;

    Ok(Router::new()
        .route("/", get(root))
        .route("/api/get-media-data", post(get_media_data))
        .route("/api/convert", post(convert))
        .route("/api/download-image", get(download_image))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer),
        )
        .with_state(app_state))
}

pub async fn start(config: HttpServerConfig) -> color_eyre::Result<()> {
    let HttpServerConfig { port, app_state } = config;
    let app = router(Arc::new(app_state))?;

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port))
        .await
        .wrap_err_with(|| eyre!("Failed to bind to port {}", port))?;
    log::info!("Listening on http://0.0.0.0:{}", port);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .wrap_err("Failed to start HTTP server")?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        log::error!("Failed to listen for shutdown signal: {}", error);
        std::future::pending::<()>().await;
    }
    log::info!("Shutting down HTTP server");
}
