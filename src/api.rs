use axum::{
    extract::State,
    routing::get,
    Json, Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

use crate::models::MonitorState;

/// Non-resetting view of the current window: the counters keep
/// accumulating until the next summary flush.
pub async fn get_stats(State(state): State<Arc<Mutex<MonitorState>>>) -> Json<MonitorState> {
    let state = state.lock().await;
    Json(state.clone())
}

pub fn create_router(state: Arc<Mutex<MonitorState>>) -> Router {
    Router::new()
        .route("/api/stats", get(get_stats))
        .with_state(state)
}

pub async fn start_server(port: u16, state: Arc<Mutex<MonitorState>>) {
    let app = create_router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Stats endpoint: http://localhost:{}/api/stats", addr.port());
    let listener = tokio::net::TcpListener::bind(addr).await.expect("Failed to bind API port");
    axum::serve(listener, app).await.unwrap();
}
