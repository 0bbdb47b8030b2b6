/**
 * API REST KONPANION - Serveur HTTP du hub
 *
 * RÔLE :
 * Surface HTTP autour du store, du hub de broadcast et du registre de découverte.
 *
 * ROUTES :
 * - /health, /system/health          : santé (sans auth)
 * - /ingest/{vael,snuu,nooh}         : télémétrie des devices (token partagé)
 * - /api/hub, /api/devices           : snapshot (sweep staleness avant lecture)
 * - /api/device/{id}                 : historique ring buffer d'un device
 * - /api/devices/discover, /connect  : scan WiFi + connexion logique (session + allow-list)
 * - /ws/telemetry                    : flux live (session)
 * - /login, /logout, /_whoami        : session cookie
 *
 * Les erreurs du sweep staleness ne font jamais échouer une lecture.
 */

use crate::auth::{clear_cookie, require_principal, session_cookie, session_token};
use crate::discovery::{scan, DeviceState, DiscoveredDevice};
use crate::error::HubError;
use crate::ingest::{ingest, require_ingest_token};
use crate::models::{DeviceStatus, HubSnapshot, NoohPayload, SnuuPayload, TelemetryEvent, VaelPayload};
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::middleware;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

pub fn build_router(app_state: AppState) -> Router {
    let ingest_routes = Router::new()
        .route("/ingest/vael", post(ingest::<VaelPayload>))
        .route("/ingest/snuu", post(ingest::<SnuuPayload>))
        .route("/ingest/nooh", post(ingest::<NoohPayload>))
        .route_layer(middleware::from_fn_with_state(app_state.clone(), require_ingest_token));

    Router::new()
        .route("/health", get(health))
        .route("/system/health", get(get_system_health))
        .route("/api/hub", get(hub_snapshot))
        .route("/api/devices", get(list_devices))
        .route("/api/device/{device_id}", get(device_series))
        .route("/api/devices/discover", get(discover))
        .route("/api/devices/connect", post(connect_intent))
        .route("/ws/telemetry", get(crate::ws::telemetry_ws))
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/_whoami", get(whoami))
        .merge(ingest_routes)
        .with_state(app_state)
}

/// Sweep avant lecture ; un échec est loggé puis ignoré
fn sweep_before_read(app: &AppState) {
    if let Err(e) = app.store.lock().mark_stale_devices(app.cfg.stale_after_secs) {
        tracing::warn!("staleness sweep failed, serving previous state: {}", e);
    }
}

// GET /health
async fn health(State(app): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "ok": true, "hub_id": app.cfg.hub_id }))
}

// GET /system/health
async fn get_system_health(State(app): State<AppState>) -> Json<crate::health::HubHealth> {
    Json(app.health_tracker.get_health(&app))
}

// GET /api/hub (snapshot complet)
async fn hub_snapshot(State(app): State<AppState>) -> Json<HubSnapshot> {
    sweep_before_read(&app);
    Json(app.store.lock().snapshot())
}

#[derive(Debug, Serialize)]
pub struct DeviceList {
    pub hub_id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub ts: OffsetDateTime,
    pub devices: Vec<DeviceStatus>,
}

// GET /api/devices (devices ayant déjà envoyé de la télémétrie)
async fn list_devices(State(app): State<AppState>) -> Json<DeviceList> {
    sweep_before_read(&app);
    let snap = app.store.lock().snapshot();
    Json(DeviceList {
        hub_id: snap.hub_id,
        ts: snap.ts,
        devices: snap.devices.into_values().collect(),
    })
}

#[derive(Debug, Serialize)]
pub struct DeviceSeries {
    pub device_id: String,
    pub series: Vec<TelemetryEvent>,
}

// GET /api/device/{device_id}
async fn device_series(
    State(app): State<AppState>,
    Path(device_id): Path<String>,
) -> Result<Json<DeviceSeries>, HubError> {
    let store = app.store.lock();
    let series = store.get_device_series(&device_id);
    // statut connu sans historique : série vide plutôt que 404
    if series.is_empty() && !store.knows_device(&device_id) {
        return Err(HubError::NotFound("Unknown device_id".into()));
    }
    Ok(Json(DeviceSeries { device_id, series }))
}

/// Session valide + présence dans l'allow-list
fn require_admin_like_access(app: &AppState, headers: &HeaderMap) -> Result<String, HubError> {
    let username = require_principal(&app.sessions, headers)?;
    if !app.users.contains(&username) {
        return Err(HubError::Forbidden);
    }
    Ok(username)
}

#[derive(Debug, Serialize)]
pub struct DiscoverResponse {
    pub count: usize,
    pub devices: Vec<DiscoveredDevice>,
}

// GET /api/devices/discover
async fn discover(State(app): State<AppState>, headers: HeaderMap) -> Result<Json<DiscoverResponse>, HubError> {
    require_admin_like_access(&app, &headers)?;
    let devices = scan::scan_and_update(&app.registry, &app.cfg.scan.interface).await;
    Ok(Json(DiscoverResponse {
        count: devices.len(),
        devices,
    }))
}

#[derive(Debug, Deserialize)]
pub struct ConnectRequest {
    pub device_id: String,
}

#[derive(Debug, Serialize)]
pub struct ConnectResponse {
    pub success: bool,
    pub device: Option<DiscoveredDevice>,
}

// POST /api/devices/connect (connexion logique uniquement, pas d'association WiFi)
async fn connect_intent(
    State(app): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<ConnectRequest>,
) -> Result<Json<ConnectResponse>, HubError> {
    require_admin_like_access(&app, &headers)?;

    let mut registry = app.registry.lock();
    if registry.get(&body.device_id).is_none() {
        return Err(HubError::NotFound("Device not found (discover first)".into()));
    }
    registry.set_state(&body.device_id, DeviceState::Connecting, None);
    registry.set_state(&body.device_id, DeviceState::Connected, None);
    tracing::info!(device_id = %body.device_id, "device logically connected");

    Ok(Json(ConnectResponse {
        success: true,
        device: registry.get(&body.device_id).cloned(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

// POST /login
async fn login(State(app): State<AppState>, Form(form): Form<LoginForm>) -> Result<Response, HubError> {
    if !app.users.verify(&form.username, &form.password) {
        tracing::warn!(username = %form.username, "failed login attempt");
        return Err(HubError::Unauthorized);
    }
    let token = app.sessions.lock().create(&form.username);
    tracing::info!(username = %form.username, "user logged in");

    Ok((
        StatusCode::OK,
        [(header::SET_COOKIE, session_cookie(&token))],
        Json(serde_json::json!({ "ok": true, "user": form.username })),
    )
        .into_response())
}

// POST /logout
async fn logout(State(app): State<AppState>, headers: HeaderMap) -> Response {
    if let Some(token) = session_token(&headers) {
        app.sessions.lock().revoke(&token);
    }
    (
        StatusCode::OK,
        [(header::SET_COOKIE, clear_cookie())],
        Json(serde_json::json!({ "ok": true })),
    )
        .into_response()
}

// GET /_whoami
async fn whoami(State(app): State<AppState>, headers: HeaderMap) -> Json<serde_json::Value> {
    let token = session_token(&headers);
    let user = app.sessions.lock().principal(token.as_deref());
    Json(serde_json::json!({ "user": user, "hub_id": app.cfg.hub_id }))
}
