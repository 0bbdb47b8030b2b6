//! WiFi scan for Konpanion devices
//!
//! Devices advertise an access point whose SSID starts with their family
//! prefix (`VAEL-`, `SNUU-`, `NOOH-`). The scan tries `nmcli` first and
//! falls back to `iw <iface> scan`; networks matching no known prefix are
//! dropped. No association is performed here.

use super::{DeviceState, DiscoveredDevice, DiscoveryRegistry};
use crate::models::DeviceType;
use crate::state::Shared;
use time::OffsetDateTime;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// SSID prefix → device family
pub const PREFIXES: &[(&str, DeviceType)] = &[
    ("VAEL-", DeviceType::Vael),
    ("SNUU-", DeviceType::Snuu),
    ("NOOH-", DeviceType::Nooh),
];

/// One network seen by the scanner
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanEntry {
    pub ssid: String,
    pub signal: Option<i32>,
}

pub fn classify_ssid(ssid: &str) -> Option<DeviceType> {
    PREFIXES
        .iter()
        .find(|(prefix, _)| ssid.starts_with(prefix))
        .map(|(_, device_type)| *device_type)
}

/// Parse `nmcli -t -f SSID,SIGNAL dev wifi` output
pub fn parse_nmcli(output: &str) -> Vec<ScanEntry> {
    output
        .lines()
        .filter_map(|line| {
            let line = line.trim();
            // nmcli échappe les ':' du SSID, le signal est toujours le dernier champ
            let (ssid, signal) = line.rsplit_once(':')?;
            let ssid = ssid.replace("\\:", ":").trim().to_string();
            if ssid.is_empty() {
                return None;
            }
            Some(ScanEntry {
                ssid,
                signal: signal.trim().parse().ok(),
            })
        })
        .collect()
}

/// Parse `iw <iface> scan` output (signal line precedes SSID within a BSS block)
pub fn parse_iw(output: &str) -> Vec<ScanEntry> {
    let mut entries = Vec::new();
    let mut signal: Option<i32> = None;

    for line in output.lines() {
        let line = line.trim();
        if line.starts_with("BSS ") {
            signal = None;
        } else if let Some(rest) = line.strip_prefix("signal:") {
            signal = rest
                .split_whitespace()
                .next()
                .and_then(|v| v.parse::<f32>().ok())
                .map(|v| v.round() as i32);
        } else if let Some(ssid) = line.strip_prefix("SSID:") {
            let ssid = ssid.trim();
            if !ssid.is_empty() {
                entries.push(ScanEntry {
                    ssid: ssid.to_string(),
                    signal: signal.take(),
                });
            }
        }
    }

    entries
}

async fn try_nmcli_scan() -> Option<Vec<ScanEntry>> {
    let output = Command::new("nmcli")
        .args(["-t", "-f", "SSID,SIGNAL", "dev", "wifi"])
        .output()
        .await
        .map_err(|e| debug!("nmcli unavailable: {}", e))
        .ok()?;
    if !output.status.success() {
        debug!("nmcli exited with {}", output.status);
        return None;
    }
    Some(parse_nmcli(&String::from_utf8_lossy(&output.stdout)))
}

async fn try_iw_scan(interface: &str) -> Option<Vec<ScanEntry>> {
    let output = Command::new("sudo")
        .args(["iw", interface, "scan"])
        .output()
        .await
        .map_err(|e| debug!("iw unavailable: {}", e))
        .ok()?;
    if !output.status.success() {
        debug!("iw scan exited with {}", output.status);
        return None;
    }
    Some(parse_iw(&String::from_utf8_lossy(&output.stdout)))
}

/// Scan networks; None when no scanner could run
pub async fn scan_networks(interface: &str) -> Option<Vec<ScanEntry>> {
    match try_nmcli_scan().await {
        Some(entries) => Some(entries),
        None => try_iw_scan(interface).await,
    }
}

/// Upsert every known-prefix network as DISCOVERED; returns how many matched
pub fn apply_scan(registry: &mut DiscoveryRegistry, entries: &[ScanEntry], now: OffsetDateTime) -> usize {
    let mut matched = 0;
    for entry in entries {
        let Some(device_type) = classify_ssid(&entry.ssid) else {
            continue;
        };
        registry.upsert(DiscoveredDevice {
            device_id: entry.ssid.clone(),
            device_type,
            ssid: entry.ssid.clone(),
            rssi: entry.signal,
            state: DeviceState::Discovered,
            last_seen: now,
            last_error: None,
        });
        matched += 1;
    }
    matched
}

/// Full scan cycle; registry left untouched when no scanner is available
pub async fn scan_and_update(registry: &Shared<DiscoveryRegistry>, interface: &str) -> Vec<DiscoveredDevice> {
    match scan_networks(interface).await {
        Some(entries) => {
            let mut reg = registry.lock();
            let matched = apply_scan(&mut reg, &entries, OffsetDateTime::now_utc());
            info!("Scan found {} networks, {} Konpanion devices", entries.len(), matched);
            reg.list()
        }
        None => {
            warn!("No WiFi scanner available (nmcli / iw), returning known devices");
            registry.lock().list()
        }
    }
}

// interval() panique sur une durée nulle
fn scan_period(interval_secs: u64) -> std::time::Duration {
    std::time::Duration::from_secs(interval_secs.max(1))
}

/// Scan périodique en tâche de fond
pub fn spawn_periodic_scan(registry: Shared<DiscoveryRegistry>, interface: String, interval_secs: u64) {
    let period = scan_period(interval_secs);
    info!("Starting periodic WiFi scan every {}s on {}", period.as_secs(), interface);

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;
            scan_and_update(&registry, &interface).await;
        }
    });
}
