//! RPC HTTP Server
//!
//! Axum-based HTTP server that handles JSON-RPC requests on `POST /`.

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::node::Node;
use crate::rpc::methods::{handle_request, JsonRpcRequest, JsonRpcResponse, RpcState};

/// Build the RPC router
pub fn rpc_router(node: RpcState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", post(handle_rpc))
        .layer(cors)
        .with_state(node)
}

/// Serve JSON-RPC on an already bound listener
pub async fn serve_rpc(listener: TcpListener, node: Arc<Node>) {
    match listener.local_addr() {
        Ok(addr) => info!("RPC server listening on http://{}", addr),
        Err(e) => warn!(error = %e, "RPC listener has no local address"),
    }

    if let Err(e) = axum::serve(listener, rpc_router(node)).await {
        warn!(error = %e, "RPC server stopped");
    }
}

/// Handle incoming JSON-RPC requests
async fn handle_rpc(
    State(node): State<RpcState>,
    Json(request): Json<JsonRpcRequest>,
) -> (StatusCode, Json<JsonRpcResponse>) {
    let response = handle_request(&node, request);
    (StatusCode::OK, Json(response))
}
