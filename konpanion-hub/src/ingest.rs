/**
 * INGEST GATEWAY - Réception HTTP de la télémétrie des devices
 *
 * RÔLE :
 * - POST /ingest/{vael,snuu,nooh} : parse + validation transport du payload
 * - Token partagé `x-konpanion-token` (middleware, seulement si configuré)
 * - ts absent → heure de réception (vraie heure de réception, pas une donnée inventée)
 * - Upsert dans le store puis fan-out du dernier événement aux viewers
 *
 * Les anomalies métier (canaux FSR, batterie) ne rejettent jamais un
 * événement : elles deviennent des issues dans le statut du device.
 */

use crate::error::HubError;
use crate::models::{DevicePayload, DeviceType, NoohPayload, SnuuPayload, TelemetryEvent, VaelPayload};
use crate::state::AppState;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use time::OffsetDateTime;

pub const TOKEN_HEADER: &str = "x-konpanion-token";

/// Payload spécifique à un type de device, reçu sur sa route dédiée
pub trait IngestPayload: DeserializeOwned + Send + 'static {
    const DEVICE_TYPE: DeviceType;

    fn into_payload(self) -> DevicePayload;

    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

impl IngestPayload for VaelPayload {
    const DEVICE_TYPE: DeviceType = DeviceType::Vael;

    fn into_payload(self) -> DevicePayload {
        DevicePayload::Vael(self)
    }
}

impl IngestPayload for SnuuPayload {
    const DEVICE_TYPE: DeviceType = DeviceType::Snuu;

    fn into_payload(self) -> DevicePayload {
        DevicePayload::Snuu(self)
    }
}

impl IngestPayload for NoohPayload {
    const DEVICE_TYPE: DeviceType = DeviceType::Nooh;

    fn into_payload(self) -> DevicePayload {
        DevicePayload::Nooh(self)
    }

    fn validate(&self) -> Result<(), String> {
        match self.fall_confidence {
            Some(c) if !(0.0..=1.0).contains(&c) => {
                Err(format!("fall_confidence must be within [0, 1], got {}", c))
            }
            _ => Ok(()),
        }
    }
}

/// Corps reçu d'un device : `device_type` et `ts` optionnels
#[derive(Debug, Deserialize)]
pub struct TelemetryIn<P> {
    pub hub_id: String,
    pub device_id: String,
    #[serde(default)]
    pub device_type: Option<DeviceType>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub ts: Option<OffsetDateTime>,
    #[serde(default)]
    pub rssi_dbm: Option<i32>,
    #[serde(default)]
    pub battery_pct: Option<f64>,
    #[serde(default)]
    pub fw_version: Option<String>,
    #[serde(flatten)]
    pub payload: P,
}

impl<P: IngestPayload> TelemetryIn<P> {
    /// Validation transport puis construction de l'événement (ts rempli si absent)
    pub fn into_event(self, received_at: OffsetDateTime) -> Result<TelemetryEvent, HubError> {
        if let Some(declared) = self.device_type {
            if declared != P::DEVICE_TYPE {
                return Err(HubError::InvalidTelemetry(format!(
                    "device_type {} does not match endpoint {}",
                    declared,
                    P::DEVICE_TYPE
                )));
            }
        }
        if let Some(battery) = self.battery_pct {
            if !(0.0..=100.0).contains(&battery) {
                return Err(HubError::InvalidTelemetry(format!(
                    "battery_pct must be within [0, 100], got {}",
                    battery
                )));
            }
        }
        self.payload.validate().map_err(HubError::InvalidTelemetry)?;

        Ok(TelemetryEvent {
            hub_id: self.hub_id,
            device_id: self.device_id,
            ts: self.ts.unwrap_or(received_at),
            rssi_dbm: self.rssi_dbm,
            battery_pct: self.battery_pct,
            fw_version: self.fw_version,
            payload: self.payload.into_payload(),
        })
    }
}

/// Contrôle du secret partagé ; désactivé quand `ingest_token` est vide
pub async fn require_ingest_token(State(app): State<AppState>, req: Request, next: Next) -> Response {
    let expected = app.cfg.ingest_token.as_str();
    if expected.is_empty() {
        return next.run(req).await;
    }

    let ok = req
        .headers()
        .get(TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|v| v == expected)
        .unwrap_or(false);

    if !ok {
        tracing::warn!(path = %req.uri().path(), "rejected ingest with invalid token");
        return HubError::InvalidToken.into_response();
    }
    next.run(req).await
}

// POST /ingest/{vael,snuu,nooh}
pub async fn ingest<P: IngestPayload>(
    State(app): State<AppState>,
    body: Result<Json<TelemetryIn<P>>, JsonRejection>,
) -> Result<Json<serde_json::Value>, HubError> {
    // corps illisible : même forme `{"detail"}` que les autres erreurs
    let Json(body) = body.map_err(|e| HubError::InvalidTelemetry(e.body_text()))?;
    let evt = body.into_event(OffsetDateTime::now_utc())?;
    accept(&app, evt).await;
    Ok(Json(serde_json::json!({ "ok": true })))
}

/// Upsert + fan-out. L'upsert s'exécute sous le verrou d'ordre du hub : deux
/// ingests concurrents sont livrés aux viewers dans leur ordre d'acceptation.
pub async fn accept(app: &AppState, evt: TelemetryEvent) {
    let report = app
        .broadcast
        .accept_then_broadcast(|| {
            let mut store = app.store.lock();
            store.upsert_telemetry(evt);
            store.last_event().cloned()
        })
        .await;
    if report.pruned > 0 {
        tracing::info!(delivered = report.delivered, pruned = report.pruned, "fan-out pruned dead viewers");
    }
}
