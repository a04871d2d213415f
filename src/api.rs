//! HTTP surface: health, storage upload events and report generation

use crate::analytics::report::{generate_report, ReportTarget};
use crate::analytics::ReportQueries;
use crate::error::EtlError;
use crate::ingestion::batch::process_object;
use crate::storage::ObjectStore;
use crate::warehouse::{DimensionWriteMode, Warehouse};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

pub struct AppState<W, S> {
    pub warehouse: Arc<W>,
    pub store: Arc<S>,
    pub target: Arc<ReportTarget>,
    pub write_mode: DimensionWriteMode,
}

// Manual impl: a derive would demand `W: Clone` and `S: Clone`
impl<W, S> Clone for AppState<W, S> {
    fn clone(&self) -> Self {
        Self {
            warehouse: Arc::clone(&self.warehouse),
            store: Arc::clone(&self.store),
            target: Arc::clone(&self.target),
            write_mode: self.write_mode,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct ApiResponse {
    message: String,
    status: String,
}

/// Object-finalized notification
#[derive(Debug, Deserialize)]
pub struct StorageEvent {
    pub bucket: String,
    pub name: String,
}

pub fn router<W, S>(state: AppState<W, S>) -> Router
where
    W: Warehouse + ReportQueries + 'static,
    S: ObjectStore + 'static,
{
    Router::new()
        .route("/", get(health_check))
        .route("/api/health", get(health_check))
        .route("/api/events/storage", post(storage_event::<W, S>))
        .route(
            "/api/reports",
            get(create_report::<W, S>).post(create_report::<W, S>),
        )
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

async fn health_check() -> Json<ApiResponse> {
    Json(ApiResponse {
        message: "Listing API is running!".to_string(),
        status: "ok".to_string(),
    })
}

async fn storage_event<W, S>(
    State(state): State<AppState<W, S>>,
    Json(event): Json<StorageEvent>,
) -> Response
where
    W: Warehouse + ReportQueries,
    S: ObjectStore,
{
    info!("Storage event: {}/{}", event.bucket, event.name);

    let result = process_object(
        state.warehouse.as_ref(),
        state.store.as_ref(),
        &event.bucket,
        &event.name,
        state.write_mode,
    )
    .await;

    match result {
        Ok(None) => Json(json!({
            "status": "skipped",
            "reason": "not a CSV file",
            "object": event.name,
        }))
        .into_response(),
        Ok(Some(summary)) => Json(json!({
            "status": "success",
            "summary": summary,
        }))
        .into_response(),
        Err(e) => {
            let status = status_for(&e);
            if status == StatusCode::UNPROCESSABLE_ENTITY {
                warn!("Rejected {}: {}", event.name, e);
            } else {
                error!("Failed to process {}: {}", event.name, e);
            }
            (status, Json(json!({ "status": "error", "error": e.to_string() }))).into_response()
        }
    }
}

/// Bad uploads are the caller's problem; everything else is ours
fn status_for(e: &EtlError) -> StatusCode {
    if e.is_rejection() {
        StatusCode::UNPROCESSABLE_ENTITY
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

async fn create_report<W, S>(State(state): State<AppState<W, S>>) -> Response
where
    W: Warehouse + ReportQueries,
    S: ObjectStore,
{
    match generate_report(state.warehouse.as_ref(), state.store.as_ref(), &state.target).await {
        Ok(outcome) => Json(outcome).into_response(),
        Err(e) => {
            error!("Report generation failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "status": "error", "error": e.to_string() })),
            )
                .into_response()
        }
    }
}
