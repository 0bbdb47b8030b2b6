use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct HubConfig {
    pub host: String,
    pub port: u16,
    /// Identité du hub (unique par hub)
    pub hub_id: String,
    /// Taille des ring buffers par device (1200 = 20 min à 1Hz)
    pub max_samples: usize,
    /// Secret partagé pour les POST des devices ; vide = pas de contrôle
    pub ingest_token: String,
    pub stale_after_secs: u64,
    pub sweep_interval_secs: u64,
    pub users_file: String,
    pub scan: ScanConf,
    pub viewers: ViewerConf,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ScanConf {
    pub interface: String,
    /// 0 = scan uniquement à la demande
    pub interval_secs: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ViewerConf {
    pub queue: usize,
    pub delivery_timeout_ms: u64,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8000,
            hub_id: "HUB-PI-001".into(),
            max_samples: 1200,
            ingest_token: String::new(),
            stale_after_secs: 15,
            sweep_interval_secs: 5,
            users_file: "./users.json".into(),
            scan: ScanConf::default(),
            viewers: ViewerConf::default(),
        }
    }
}

impl Default for ScanConf {
    fn default() -> Self {
        Self { interface: "wlan0".into(), interval_secs: 0 }
    }
}

impl Default for ViewerConf {
    fn default() -> Self {
        Self { queue: 64, delivery_timeout_ms: 2000 }
    }
}

impl HubConfig {
    /// Surcharges KONPANION_* ; `lookup` = std::env::var en prod, une map en test
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("KONPANION_HOST") {
            self.host = v;
        }
        if let Some(v) = lookup("KONPANION_HUB_ID") {
            self.hub_id = v;
        }
        if let Some(v) = lookup("KONPANION_INGEST_TOKEN") {
            self.ingest_token = v;
        }
        if let Some(v) = lookup("KONPANION_USERS_FILE") {
            self.users_file = v;
        }
        parse_override(&lookup, "KONPANION_PORT", &mut self.port);
        parse_override(&lookup, "KONPANION_MAX_SAMPLES", &mut self.max_samples);
        parse_override(&lookup, "KONPANION_STALE_AFTER_SECS", &mut self.stale_after_secs);
    }
}

fn parse_override<F, T>(lookup: &F, key: &str, slot: &mut T)
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    if let Some(raw) = lookup(key) {
        match raw.trim().parse() {
            Ok(v) => *slot = v,
            Err(_) => tracing::warn!("[config] ignoring invalid {}={}", key, raw),
        }
    }
}

pub async fn load_config() -> HubConfig {
    let path = std::env::var("KONPANION_HUB_CONFIG").unwrap_or_else(|_| "hub.yaml".into());
    let mut cfg = load_config_file(&path).await;
    cfg.apply_env_overrides(|k| std::env::var(k).ok());
    cfg
}

async fn load_config_file(path: &str) -> HubConfig {
    if !Path::new(path).exists() {
        tracing::warn!("[config] no {}, using defaults", path);
        return HubConfig::default();
    }
    let txt = fs::read_to_string(path).await.unwrap_or_default();
    if txt.trim().is_empty() {
        return HubConfig::default();
    }
    serde_yaml::from_str(&txt).unwrap_or_else(|e| {
        tracing::error!("[config] invalid {}: {}", path, e);
        HubConfig::default()
    })
}
