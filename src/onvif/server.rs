// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Per-camera ONVIF SOAP server (spec §4.6). One endpoint task per running
//! camera, bound to `(assignedIp | hostIp, onvifPort)`. Action dispatch is
//! substring matching on the SOAP body, the same shallow style the
//! standalone transcoder reference implementation in the pack uses — a
//! compliant ONVIF client always puts the operation name as the body's root
//! element, so there is no ambiguity in practice.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;
use chrono::Utc;
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::{info, warn};

use crate::config::{Camera, ConfigStore};
use crate::error::{GatewayError, Result};
use crate::onvif::auth::{self, UsernameToken};
use crate::onvif::soap;

/// Grace period given to in-flight requests before the listener is torn
/// down (spec §9, lifecycle step "Drain and close ONVIF Endpoint").
pub const DRAIN_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointState {
    Idle,
    Listening,
    Serving,
    Draining,
    Closed,
}

struct EndpointHandlerState {
    config: Arc<ConfigStore>,
    camera_id: u32,
    bind_address: String,
}

pub struct OnvifEndpoint {
    camera_id: u32,
    state: Arc<Mutex<EndpointState>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    join_handle: Option<tokio::task::JoinHandle<()>>,
}

impl OnvifEndpoint {
    pub fn new(camera_id: u32) -> Self {
        Self {
            camera_id,
            state: Arc::new(Mutex::new(EndpointState::Idle)),
            shutdown_tx: None,
            join_handle: None,
        }
    }

    pub fn state(&self) -> EndpointState {
        *self.state.lock()
    }

    /// Bind the listener and start serving. Transitions `idle -> listening
    /// -> serving` (spec §4.6: no further automatic transitions).
    pub async fn start(&mut self, config: Arc<ConfigStore>, bind_ip: &str, port: u16) -> Result<()> {
        let addr: SocketAddr = format!("{bind_ip}:{port}")
            .parse()
            .map_err(|e| GatewayError::Bind(format!("invalid bind address {bind_ip}:{port}: {e}")))?;

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| GatewayError::Bind(format!("{addr}: {e}")))?;

        *self.state.lock() = EndpointState::Listening;

        let handler_state = Arc::new(EndpointHandlerState {
            config,
            camera_id: self.camera_id,
            bind_address: bind_ip.to_string(),
        });
        let router = Router::new()
            .route("/onvif/device_service", post(dispatch))
            .route("/onvif/media_service", post(dispatch))
            .route("/onvif/media2_service", post(dispatch))
            .with_state(handler_state);

        let (tx, rx) = oneshot::channel::<()>();
        self.shutdown_tx = Some(tx);

        let camera_id = self.camera_id;
        let state = Arc::clone(&self.state);
        let handle = tokio::spawn(async move {
            info!(camera_id, %addr, "onvif endpoint listening");
            let serve = axum::serve(listener, router.into_make_service());
            let graceful = serve.with_graceful_shutdown(async {
                let _ = rx.await;
            });
            if let Err(e) = graceful.await {
                warn!(camera_id, error = %e, "onvif endpoint server error");
            }
            *state.lock() = EndpointState::Closed;
            info!(camera_id, "onvif endpoint closed");
        });
        self.join_handle = Some(handle);

        *self.state.lock() = EndpointState::Serving;
        Ok(())
    }

    /// Drain (grace period for in-flight requests) then close (spec §9).
    /// Shutdown is signaled immediately so `axum`'s graceful shutdown stops
    /// accepting new connections right away and lets in-flight ones finish;
    /// `DRAIN_GRACE` bounds how long we wait for that to happen before
    /// force-aborting the server task.
    pub async fn stop(&mut self) {
        if matches!(self.state(), EndpointState::Idle | EndpointState::Closed) {
            return;
        }
        *self.state.lock() = EndpointState::Draining;
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.join_handle.take() {
            let abort_handle = handle.abort_handle();
            if tokio::time::timeout(DRAIN_GRACE, handle).await.is_err() {
                warn!(camera_id = self.camera_id, "onvif endpoint did not drain within grace period, aborting");
                abort_handle.abort();
            }
        }
        *self.state.lock() = EndpointState::Closed;
    }
}

async fn dispatch(State(state): State<Arc<EndpointHandlerState>>, body: Bytes) -> Response {
    let text = String::from_utf8_lossy(&body).into_owned();

    let camera = match state.config.get_camera(state.camera_id) {
        Ok(c) => c,
        Err(_) => return soap_response(StatusCode::NOT_FOUND, soap::fault_response("Receiver", "NotFound", "camera no longer exists")),
    };

    if !text.contains("GetCapabilities") && !text.contains("GetDeviceInformation") {
        if let Err(auth_err) = authenticate(&text, &camera) {
            warn!(camera_id = camera.id, error = %auth_err, "onvif request rejected");
            return soap_response(StatusCode::UNAUTHORIZED, soap::not_authorized_fault());
        }
    }

    let base_url = format!("http://{}:{}", state.bind_address, camera.onvif_port);

    let body = if text.contains("GetCapabilities") {
        soap::get_capabilities_response(&base_url)
    } else if text.contains("GetDeviceInformation") {
        soap::get_device_information_response(&camera)
    } else if text.contains("GetServices") {
        soap::get_services_response(&base_url)
    } else if text.contains("GetSystemDateAndTime") {
        soap::get_system_date_and_time_response(Utc::now())
    } else if text.contains("GetStreamUri") {
        let path = if text.contains(soap::SUB_PROFILE_TOKEN) { camera.path_sub() } else { camera.path_main() };
        let settings = state.config.settings();
        let uri = soap::stream_uri(&settings.bind_ip.resolve(), settings.rtsp_port, &path);
        if text.contains("GetStreamUriResponse") || text.contains("ver20") {
            soap::get_stream_uri_response_media2(&uri)
        } else {
            soap::get_stream_uri_response(&uri)
        }
    } else if text.contains("GetSnapshotUri") {
        let path = if text.contains(soap::SUB_PROFILE_TOKEN) { camera.path_sub() } else { camera.path_main() };
        soap::get_snapshot_uri_response(&base_url, &path)
    } else if text.contains("GetProfiles") {
        if text.contains("ver20") {
            soap::get_profiles_response_media2(&camera)
        } else {
            soap::get_profiles_response(&camera)
        }
    } else {
        return soap_response(
            StatusCode::BAD_REQUEST,
            soap::fault_response("Sender", "ActionNotSupported", "unrecognized SOAP action"),
        );
    };

    soap_response(StatusCode::OK, body)
}

fn authenticate(request_body: &str, camera: &Camera) -> std::result::Result<(), auth::AuthError> {
    let token = extract_username_token(request_body);
    auth::verify(&token, &camera.onvif_username, &camera.onvif_password)
}

/// Pull `wsse:UsernameToken` fields out of the request body by tag search.
/// ONVIF clients always place WS-Security in the SOAP header as flat,
/// unnested elements, so a tag scan is sufficient without a full parser.
fn extract_username_token(body: &str) -> UsernameToken {
    UsernameToken {
        username: extract_tag(body, "Username").unwrap_or_default(),
        password_digest: extract_attributed_tag(body, "Password", "PasswordDigest"),
        password_text: extract_attributed_tag(body, "Password", "PasswordText"),
        nonce_b64: extract_tag(body, "Nonce"),
        created: extract_tag(body, "Created"),
    }
}

fn extract_tag(body: &str, tag: &str) -> Option<String> {
    let open = format!("<{tag}");
    let start = body.find(&open)?;
    let gt = body[start..].find('>')? + start + 1;
    let close = format!("</");
    let end_rel = body[gt..].find(&close)?;
    Some(body[gt..gt + end_rel].trim().to_string())
}

fn extract_attributed_tag(body: &str, tag: &str, type_marker: &str) -> Option<String> {
    let open = format!("<{tag}");
    let mut search_from = 0;
    while let Some(rel_start) = body[search_from..].find(&open) {
        let start = search_from + rel_start;
        let gt = body[start..].find('>')? + start;
        let tag_text = &body[start..gt];
        if tag_text.contains(type_marker) {
            let content_start = gt + 1;
            let end_rel = body[content_start..].find("</")?;
            return Some(body[content_start..content_start + end_rel].trim().to_string());
        }
        search_from = gt + 1;
    }
    None
}

fn soap_response(status: StatusCode, body: String) -> Response {
    (status, [("Content-Type", "application/soap+xml; charset=utf-8")], body).into_response()
}
