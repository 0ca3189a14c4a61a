// SPDX-License-Identifier: MIT

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use super::WorkflowService;
use crate::engine::error::EngineError;
use crate::workflow::graph::GraphSpec;
use crate::workflow::run::RunRecord;

type AppState = Arc<WorkflowService>;

pub fn router(service: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health_check))
        .route("/graph/create", post(create_graph))
        .route("/graph/run", post(run_graph))
        .route("/graph/state/{run_id}", get(get_run_state))
        .route("/graph/cancel/{run_id}", post(cancel_run))
        .route("/graph/{graph_id}", get(get_graph))
        .route("/graphs", get(list_graphs))
        .route("/steps", get(list_steps))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(service)
}

/// Bind to the configured address and serve until the process exits
pub async fn serve(service: AppState) -> Result<(), EngineError> {
    let addr = service.config().bind_addr();
    let listener = TcpListener::bind(&addr).await?;
    serve_on(listener, service).await
}

/// Serve on an already bound listener
pub async fn serve_on(listener: TcpListener, service: AppState) -> Result<(), EngineError> {
    log::info!("Listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router(service)).await?;
    Ok(())
}

/// `EngineError` rendered as a JSON error body
pub struct ApiError(EngineError);

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            EngineError::GraphNotFound(_) | EngineError::RunNotFound(_) => StatusCode::NOT_FOUND,
            e if e.is_client_error() => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            log::error!("Request failed: {}", self.0);
        }
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn create_graph(
    State(service): State<AppState>,
    Json(spec): Json<GraphSpec>,
) -> Result<Json<Value>, ApiError> {
    let graph_id = service.create_graph(&spec).await?;
    Ok(Json(json!({
        "graph_id": graph_id,
        "message": "Graph created successfully"
    })))
}

#[derive(Deserialize)]
struct RunRequest {
    graph_id: String,
    #[serde(default)]
    input_data: Value,
    #[serde(default)]
    max_rounds: Option<u32>,
}

async fn run_graph(
    State(service): State<AppState>,
    Json(payload): Json<RunRequest>,
) -> Result<Json<Value>, ApiError> {
    let run_id = service
        .submit(&payload.graph_id, payload.input_data, payload.max_rounds)
        .await?;
    Ok(Json(json!({ "run_id": run_id, "status": "submitted" })))
}

async fn get_run_state(
    State(service): State<AppState>,
    Path(run_id): Path<String>,
) -> Result<Json<RunRecord>, ApiError> {
    Ok(Json(service.get_run(&run_id).await?))
}

async fn cancel_run(
    State(service): State<AppState>,
    Path(run_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let cancelled = service.cancel(&run_id).await?;
    Ok(Json(json!({ "run_id": run_id, "cancelled": cancelled })))
}

async fn get_graph(
    State(service): State<AppState>,
    Path(graph_id): Path<String>,
) -> Result<Json<GraphSpec>, ApiError> {
    Ok(Json(service.graph_spec(&graph_id).await?))
}

async fn list_graphs(State(service): State<AppState>) -> Json<Value> {
    Json(json!(service.list_graphs().await))
}

async fn list_steps(State(service): State<AppState>) -> Json<Value> {
    let registry = service.registry();
    Json(json!({
        "steps": registry.step_names().await,
        "predicates": registry.predicate_names().await,
    }))
}
