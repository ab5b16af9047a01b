//! constellation-api — HTTP surface of a node and the peer HTTP client.

pub mod client;
pub mod error;
pub mod extract;
pub mod handlers;

use std::net::SocketAddr;

use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

pub use client::HttpTransport;
pub use error::ApiError;
pub use handlers::ApiState;

/// Peer endpoints at the root, operator endpoints under `/api`.
pub fn router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/status", get(handlers::handle_status))
        .route("/neighbours", get(handlers::handle_neighbours))
        .route("/blocklist", get(handlers::handle_blocklist))
        .route("/blocklist/remove", post(handlers::handle_blocklist_remove))
        .route("/constellation", get(handlers::handle_constellation))
        .route("/routes", get(handlers::handle_routes))
        .route("/discovery", get(handlers::handle_discovery))
        .route("/heartbeat/trigger", post(handlers::handle_heartbeat_trigger))
        .route("/churn/trigger", post(handlers::handle_churn_trigger))
        .route("/forward", post(handlers::handle_originate));

    Router::new()
        .route("/id", get(handlers::handle_identify))
        .route("/handshake", post(handlers::handle_handshake))
        .route("/heartbeat", post(handlers::handle_heartbeat))
        .route("/route", post(handlers::handle_route))
        .route("/forward", post(handlers::handle_forward))
        .nest("/api", api_routes)
        .layer(cors)
        .with_state(state)
}

pub async fn serve(state: ApiState, bind: &str, port: u16) -> anyhow::Result<()> {
    let listener = TcpListener::bind(format!("{}:{}", bind, port)).await?;
    tracing::info!(bind, port, "node API listening");
    serve_listener(state, listener).await
}

/// Serve on an already bound listener.
pub async fn serve_listener(state: ApiState, listener: TcpListener) -> anyhow::Result<()> {
    let app = router(state).into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, app).await?;
    Ok(())
}
