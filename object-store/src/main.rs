mod handlers;

use axum::{
    routing::{delete, get, patch, post, put},
    Router,
};
use handlers::*;
use std::fs;
use std::net::SocketAddr;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    if let Err(e) = fs::create_dir_all("data") {
        tracing::warn!(error = %e, "could not create data directory");
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "object_store=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let app = Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/list", get(list_directory_contents))
        .route("/list/*path", get(list_directory_contents))
        .route("/is-dir-empty", get(is_dir_empty_root))
        .route("/is-dir-empty/*path", get(is_dir_empty))
        .route("/mkdir/*path", post(mkdir))
        .route("/rename/*path", post(rename))
        .route(
            "/files/*path",
            get(get_file)
                .put(put_file)
                .delete(delete_file)
                .patch(chmod),
        )
        .route("/truncate/*path", patch(truncate_file))
        .route("/chown/*path", post(chown))
        .layer(TraceLayer::new_for_http());

    let addr = SocketAddr::from(([127, 0, 0, 1], 8080));
    tracing::info!(%addr, "listening");
    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}
