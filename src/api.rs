// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! HTTP control surface — the ambient API the web UI talks to. This layer
//! is a thin wrapper around the Supervisor; it carries no core logic of its
//! own (spec §4.7 names the Supervisor as the sole external contract).
//!
//! Endpoints:
//!   GET    /api/cameras           → status snapshot for every camera
//!   POST   /api/cameras           → create a camera (allocates ONVIF port)
//!   PUT    /api/cameras/{id}      → update a camera (restarts if running)
//!   DELETE /api/cameras/{id}      → remove a camera (stops first if needed)
//!   POST   /api/cameras/{id}/start
//!   POST   /api/cameras/{id}/stop
//!   POST   /api/start-all
//!   POST   /api/stop-all
//!   GET    /api/settings          → global settings snapshot

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tracing::error;

use crate::config::{Camera, CameraStatus, ConfigStore, GlobalSettings};
use crate::error::GatewayError;
use crate::supervisor::{StatusEntry, Supervisor};

pub struct AppState {
    pub config: Arc<ConfigStore>,
    pub supervisor: Arc<Supervisor>,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    kind: &'static str,
}

fn error_response(e: GatewayError) -> (StatusCode, Json<ErrorBody>) {
    let status = match &e {
        GatewayError::NotFound(_) => StatusCode::NOT_FOUND,
        GatewayError::Invalid(_) | GatewayError::DuplicatePath(_) | GatewayError::BadMac(_) => StatusCode::BAD_REQUEST,
        GatewayError::PortInUse(_) | GatewayError::PortExhausted => StatusCode::CONFLICT,
        GatewayError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(ErrorBody { error: e.to_string(), kind: e.kind() }))
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/cameras", get(list_cameras).post(create_camera))
        .route("/api/cameras/{id}", put(update_camera).delete(delete_camera))
        .route("/api/cameras/{id}/start", post(start_camera))
        .route("/api/cameras/{id}/stop", post(stop_camera))
        .route("/api/start-all", post(start_all))
        .route("/api/stop-all", post(stop_all))
        .route("/api/settings", get(get_settings))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[derive(Serialize)]
struct StatusResponse {
    cameras: Vec<StatusEntry>,
}

async fn list_cameras(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(StatusResponse { cameras: state.supervisor.status_snapshot() })
}

async fn create_camera(State(state): State<Arc<AppState>>, Json(mut camera): Json<Camera>) -> impl IntoResponse {
    camera.id = state.config.next_id();
    if camera.path_name.is_empty() {
        camera.path_name = crate::config::slugify(&camera.name);
    }
    if camera.onvif_port == 0 {
        match state.supervisor.allocate_port() {
            Ok(port) => camera.onvif_port = port,
            Err(e) => return error_response(e).into_response(),
        }
    }
    camera.status = CameraStatus::Stopped;

    match state.config.put_camera(camera.clone()) {
        Ok(()) => (StatusCode::CREATED, Json(camera)).into_response(),
        Err(e) => error_response(e).into_response(),
    }
}

async fn update_camera(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u32>,
    Json(patch): Json<Camera>,
) -> impl IntoResponse {
    match state.supervisor.update_camera(id, patch).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => error_response(e).into_response(),
    }
}

async fn delete_camera(State(state): State<Arc<AppState>>, Path(id): Path<u32>) -> impl IntoResponse {
    match state.supervisor.delete_camera(id).await {
        Ok(camera) => Json(camera).into_response(),
        Err(e) => error_response(e).into_response(),
    }
}

async fn start_camera(State(state): State<Arc<AppState>>, Path(id): Path<u32>) -> impl IntoResponse {
    match state.supervisor.start_camera(id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => {
            error!(camera_id = id, error = %e, "start_camera failed");
            error_response(e).into_response()
        }
    }
}

async fn stop_camera(State(state): State<Arc<AppState>>, Path(id): Path<u32>) -> impl IntoResponse {
    match state.supervisor.stop_camera(id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => error_response(e).into_response(),
    }
}

#[derive(Serialize)]
struct BatchResult {
    id: u32,
    ok: bool,
    error: Option<String>,
}

async fn start_all(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let results = state.supervisor.start_all().await;
    Json(to_batch_results(results))
}

async fn stop_all(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let results = state.supervisor.stop_all().await;
    Json(to_batch_results(results))
}

fn to_batch_results(results: Vec<(u32, crate::error::Result<()>)>) -> Vec<BatchResult> {
    results
        .into_iter()
        .map(|(id, r)| match r {
            Ok(()) => BatchResult { id, ok: true, error: None },
            Err(e) => BatchResult { id, ok: false, error: Some(e.to_string()) },
        })
        .collect()
}

async fn get_settings(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let settings: GlobalSettings = state.config.settings();
    Json(settings)
}
