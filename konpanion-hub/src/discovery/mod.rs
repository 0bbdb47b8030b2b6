/**
 * DISCOVERY REGISTRY - Devices vus pendant le scan WiFi (avant télémétrie)
 *
 * RÔLE :
 * Cycle de vie séparé du TelemetryStore : le registre suit les états
 * DISCOVERED → CONNECTING → CONNECTED (ou DISCONNECTED / FAILED) ; le store
 * ne connaît un device qu'une fois sa première télémétrie reçue.
 *
 * La discipline des transitions est à la charge de l'appelant, le registre
 * accepte tout changement d'état.
 */

pub mod scan;

use crate::models::DeviceType;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use time::OffsetDateTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceState {
    Discovered,
    Connecting,
    Connected,
    Disconnected,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveredDevice {
    /// Identifiant annoncé sur le réseau (le SSID)
    pub device_id: String,
    pub device_type: DeviceType,
    pub ssid: String,
    pub rssi: Option<i32>,
    pub state: DeviceState,
    #[serde(with = "time::serde::rfc3339")]
    pub last_seen: OffsetDateTime,
    pub last_error: Option<String>,
}

#[derive(Debug, Default)]
pub struct DiscoveryRegistry {
    devices: HashMap<String, DiscoveredDevice>,
}

impl DiscoveryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insère ou remplace entièrement l'entrée du device
    pub fn upsert(&mut self, device: DiscoveredDevice) {
        self.devices.insert(device.device_id.clone(), device);
    }

    /// Trié par signal décroissant, signal inconnu en dernier
    pub fn list(&self) -> Vec<DiscoveredDevice> {
        let mut devices: Vec<DiscoveredDevice> = self.devices.values().cloned().collect();
        devices.sort_by(|a, b| {
            // None < Some(_) : l'ordre décroissant met les inconnus à la fin
            b.rssi
                .cmp(&a.rssi)
                .then_with(|| a.device_id.cmp(&b.device_id))
        });
        devices
    }

    pub fn get(&self, device_id: &str) -> Option<&DiscoveredDevice> {
        self.devices.get(device_id)
    }

    /// No-op silencieux si le device est inconnu
    pub fn set_state(&mut self, device_id: &str, state: DeviceState, error: Option<String>) {
        let Some(device) = self.devices.get_mut(device_id) else {
            return;
        };
        tracing::debug!(device_id, from = ?device.state, to = ?state, "discovery state change");
        device.state = state;
        device.last_seen = OffsetDateTime::now_utc();
        device.last_error = error;
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}
