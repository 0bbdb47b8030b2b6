/*!
Simulateur de devices Konpanion

Génère une télémétrie synthétique déterministe (ondes sinus sur le numéro de
tick, batterie qui se vide) et la pousse vers un hub via HTTP.
*/

use crate::payloads::TelemetryBuilder;
use anyhow::Result;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimKind {
    Vael,
    Snuu,
    Nooh,
}

/// Un device simulé
#[derive(Debug, Clone)]
pub struct DeviceSimulator {
    pub kind: SimKind,
    pub hub_id: String,
    pub device_id: String,
    tick: u64,
    battery: f64,
    /// Nombre de canaux FSR envoyés (permet de simuler un capteur défaillant)
    fsr_channels: usize,
}

impl DeviceSimulator {
    pub fn new(kind: SimKind, hub_id: &str, device_id: &str) -> Self {
        let fsr_channels = match kind {
            SimKind::Vael => 0,
            SimKind::Snuu => 6,
            SimKind::Nooh => 4,
        };
        Self {
            kind,
            hub_id: hub_id.to_string(),
            device_id: device_id.to_string(),
            tick: 0,
            battery: 100.0,
            fsr_channels,
        }
    }

    /// Force un nombre de canaux FSR anormal
    pub fn with_fsr_channels(mut self, channels: usize) -> Self {
        self.fsr_channels = channels;
        self
    }

    pub fn with_battery(mut self, pct: f64) -> Self {
        self.battery = pct.clamp(0.0, 100.0);
        self
    }

    pub fn battery(&self) -> f64 {
        self.battery
    }

    /// Payload suivant + route cible
    pub fn next_payload(&mut self) -> (String, Value) {
        let t = self.tick as f64;
        self.tick += 1;
        self.battery = (self.battery - 0.05).max(0.0);

        let builder = match self.kind {
            SimKind::Vael => TelemetryBuilder::vael(&self.hub_id, &self.device_id),
            SimKind::Snuu => TelemetryBuilder::snuu(&self.hub_id, &self.device_id),
            SimKind::Nooh => TelemetryBuilder::nooh(&self.hub_id, &self.device_id),
        };
        let mut builder = builder
            .now()
            .battery((self.battery * 10.0).round() / 10.0)
            .rssi(-50 - ((t * 0.3).sin().abs() * 20.0) as i32)
            .firmware("sim-0.1.0");

        if matches!(self.kind, SimKind::Vael | SimKind::Nooh) {
            builder = builder
                .imu([(t * 0.1).sin(), (t * 0.1).cos(), 9.81], [0.01 * t.sin(), 0.0, 0.02])
                .mic(0.1 + 0.05 * (t * 0.5).sin().abs(), 0.4, Some(0.12));
        }
        if self.fsr_channels > 0 {
            let channels = (0..self.fsr_channels)
                .map(|i| ((t + i as f64) * 0.2).sin().abs() * 100.0)
                .collect();
            builder = builder.fsr(channels);
        }
        if self.kind == SimKind::Nooh {
            builder = builder.fall(false, 0.02);
        }

        (builder.endpoint(), builder.build())
    }
}

/// Client HTTP minimal vers un hub
pub struct HubClient {
    base_url: String,
    token: Option<String>,
    http: reqwest::Client,
}

impl HubClient {
    pub fn new(base_url: &str, token: Option<String>) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
            http: reqwest::Client::new(),
        }
    }

    pub async fn push(&self, endpoint: &str, payload: &Value) -> Result<()> {
        let mut req = self.http.post(format!("{}{}", self.base_url, endpoint)).json(payload);
        if let Some(token) = &self.token {
            req = req.header("x-konpanion-token", token);
        }
        let resp = req.send().await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("hub rejected telemetry ({}): {}", status, body);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snuu_sends_six_channels() {
        let mut sim = DeviceSimulator::new(SimKind::Snuu, "HUB-1", "SNUU-01");
        let (endpoint, payload) = sim.next_payload();
        assert_eq!(endpoint, "/ingest/snuu");
        assert_eq!(payload["fsr"].as_array().unwrap().len(), 6);
        assert!(payload.get("imu").is_none());
    }

    #[test]
    fn test_faulty_channel_count() {
        let mut sim = DeviceSimulator::new(SimKind::Nooh, "HUB-1", "NOOH-01").with_fsr_channels(3);
        let (_, payload) = sim.next_payload();
        assert_eq!(payload["fsr"].as_array().unwrap().len(), 3);
        assert_eq!(payload["fall_event"], false);
    }

    #[test]
    fn test_battery_drains() {
        let mut sim = DeviceSimulator::new(SimKind::Vael, "HUB-1", "VAEL-01").with_battery(0.1);
        for _ in 0..5 {
            sim.next_payload();
        }
        assert_eq!(sim.battery(), 0.0);
        let (_, payload) = sim.next_payload();
        assert!(payload.get("fsr").is_none());
        assert!(payload["imu"].is_object());
    }
}
