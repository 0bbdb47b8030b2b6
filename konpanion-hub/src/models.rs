/**
 * MODELS - Formats de télémétrie et d'état des devices
 *
 * RÔLE : Types partagés entre l'ingestion, le store et le fan-out WebSocket.
 * Un TelemetryEvent = champs communs + payload spécifique au type de device
 * (union taguée sur `device_type` : VAEL / SNUU / NOOH).
 *
 * FORMAT JSON : identique à ce que les devices poussent, `ts` en RFC3339.
 */

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use time::OffsetDateTime;

/// Les trois familles de devices connues du hub
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceType {
    #[serde(rename = "VAEL")]
    Vael,
    #[serde(rename = "SNUU")]
    Snuu,
    #[serde(rename = "NOOH")]
    Nooh,
}

impl DeviceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceType::Vael => "VAEL",
            DeviceType::Snuu => "SNUU",
            DeviceType::Nooh => "NOOH",
        }
    }

    /// Nombre de canaux FSR attendus (None = pas de capteur de force)
    pub fn expected_fsr_channels(&self) -> Option<usize> {
        match self {
            DeviceType::Vael => None,
            DeviceType::Snuu => Some(6),
            DeviceType::Nooh => Some(4),
        }
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImuData {
    pub ax: f64,
    pub ay: f64,
    pub az: f64,
    pub gx: f64,
    pub gy: f64,
    pub gz: f64,
}

/// Métriques micro légères uniquement (jamais d'audio brut)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MicMetrics {
    pub rms: f64,
    pub peak: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zcr: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VaelPayload {
    #[serde(default)]
    pub imu: Option<ImuData>,
    #[serde(default)]
    pub mic: Option<MicMetrics>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnuuPayload {
    /// 6 canaux attendus
    #[serde(default)]
    pub fsr: Option<Vec<f64>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NoohPayload {
    #[serde(default)]
    pub imu: Option<ImuData>,
    #[serde(default)]
    pub mic: Option<MicMetrics>,
    /// 4 canaux attendus
    #[serde(default)]
    pub fsr: Option<Vec<f64>>,
    #[serde(default)]
    pub fall_event: Option<bool>,
    #[serde(default)]
    pub fall_confidence: Option<f64>,
}

/// Partie spécifique au type, discriminée par `device_type`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "device_type")]
pub enum DevicePayload {
    #[serde(rename = "VAEL")]
    Vael(VaelPayload),
    #[serde(rename = "SNUU")]
    Snuu(SnuuPayload),
    #[serde(rename = "NOOH")]
    Nooh(NoohPayload),
}

impl DevicePayload {
    pub fn device_type(&self) -> DeviceType {
        match self {
            DevicePayload::Vael(_) => DeviceType::Vael,
            DevicePayload::Snuu(_) => DeviceType::Snuu,
            DevicePayload::Nooh(_) => DeviceType::Nooh,
        }
    }

    pub fn fsr(&self) -> Option<&[f64]> {
        match self {
            DevicePayload::Vael(_) => None,
            DevicePayload::Snuu(p) => p.fsr.as_deref(),
            DevicePayload::Nooh(p) => p.fsr.as_deref(),
        }
    }
}

/// Événement de télémétrie accepté par le hub (ts toujours renseigné)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryEvent {
    pub hub_id: String,
    pub device_id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub ts: OffsetDateTime,
    #[serde(default)]
    pub rssi_dbm: Option<i32>,
    #[serde(default)]
    pub battery_pct: Option<f64>,
    #[serde(default)]
    pub fw_version: Option<String>,
    #[serde(flatten)]
    pub payload: DevicePayload,
}

impl TelemetryEvent {
    pub fn device_type(&self) -> DeviceType {
        self.payload.device_type()
    }
}

/// État courant d'un device, une entrée par device_id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceStatus {
    pub hub_id: String,
    pub device_id: String,
    pub device_type: DeviceType,
    pub connected: bool,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub last_seen: Option<OffsetDateTime>,
    pub battery_pct: Option<f64>,
    pub rssi_dbm: Option<i32>,
    pub fw_version: Option<String>,
    #[serde(default)]
    pub issues: Vec<String>,
}

impl DeviceStatus {
    /// Statut initial construit depuis le premier événement d'un device
    pub fn from_event(evt: &TelemetryEvent) -> Self {
        Self {
            hub_id: evt.hub_id.clone(),
            device_id: evt.device_id.clone(),
            device_type: evt.device_type(),
            connected: true,
            last_seen: Some(evt.ts),
            battery_pct: evt.battery_pct,
            rssi_dbm: evt.rssi_dbm,
            fw_version: evt.fw_version.clone(),
            issues: Vec::new(),
        }
    }

    /// Merge champ par champ : on n'écrase jamais une valeur connue par une absence
    pub fn merge_event(&mut self, evt: &TelemetryEvent) {
        self.connected = true;
        self.last_seen = Some(evt.ts);
        if let Some(battery) = evt.battery_pct {
            self.battery_pct = Some(battery);
        }
        if let Some(rssi) = evt.rssi_dbm {
            self.rssi_dbm = Some(rssi);
        }
        if let Some(fw) = &evt.fw_version {
            self.fw_version = Some(fw.clone());
        }
    }
}

/// Projection éphémère renvoyée par GET /api/hub
#[derive(Debug, Clone, Serialize)]
pub struct HubSnapshot {
    pub hub_id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub ts: OffsetDateTime,
    pub devices: BTreeMap<String, DeviceStatus>,
}
