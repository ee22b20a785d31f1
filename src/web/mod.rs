//! HTTP surface: the index page, the generation endpoints and downloads.

use std::num::NonZeroU16;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::constants::MAX_BODY_BYTES;
use crate::generation::Generator;

mod generate;
mod images;
mod middleware;
mod prelude;
mod views;

use generate::{download_handler, generate_handler, img2img_handler, latest_handler};
use views::{not_found_handler, root_handler, styles_handler};

#[derive(Clone, Debug)]
pub(crate) struct AppState {
    generator: Generator,
}

impl AppState {
    fn new(generator: Generator) -> Self {
        Self { generator }
    }
}

fn create_router() -> Router<AppState> {
    Router::new()
        .route("/", get(root_handler))
        .route("/static/styles.css", get(styles_handler))
        .route("/generate", post(generate_handler))
        .route("/img2img", post(img2img_handler))
        .route("/download", get(download_handler))
        .route("/latest", get(latest_handler))
        .fallback(not_found_handler)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(axum::middleware::from_fn(middleware::cors))
        .layer(TraceLayer::new_for_http())
}

/// Builds the router and serves it until the listener fails
pub async fn setup_server(
    listen_addr: &str,
    port: NonZeroU16,
    generator: Generator,
) -> Result<(), anyhow::Error> {
    let app = create_router().with_state(AppState::new(generator));

    let addr = format!("{}:{}", listen_addr, port);
    info!("Starting server on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    if let Err(err) = axum::serve(listener, app).await {
        error!("Server error: {}", err);
    }
    Ok(())
}
