/*!
device-sim : pousse de la télémétrie synthétique vers un hub Konpanion

Variables d'environnement :
- HUB_URL        (défaut http://127.0.0.1:8000)
- HUB_ID         (défaut HUB-PI-001)
- HUB_TOKEN      (optionnel, header x-konpanion-token)
- SIM_INTERVAL_MS (défaut 1000)
- SIM_FAULTY     (si posé : le SNUU envoie 5 canaux FSR)
*/

use hub_devkit::simulator::{DeviceSimulator, HubClient, SimKind};
use std::time::Duration;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let url = std::env::var("HUB_URL").unwrap_or_else(|_| "http://127.0.0.1:8000".into());
    let hub_id = std::env::var("HUB_ID").unwrap_or_else(|_| "HUB-PI-001".into());
    let token = std::env::var("HUB_TOKEN").ok().filter(|t| !t.is_empty());
    let interval_ms = std::env::var("SIM_INTERVAL_MS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(1000u64);

    let snuu = DeviceSimulator::new(SimKind::Snuu, &hub_id, "SNUU-SIM01");
    let snuu = if std::env::var("SIM_FAULTY").is_ok() { snuu.with_fsr_channels(5) } else { snuu };

    let mut devices = vec![
        DeviceSimulator::new(SimKind::Vael, &hub_id, "VAEL-SIM01"),
        snuu,
        DeviceSimulator::new(SimKind::Nooh, &hub_id, "NOOH-SIM01").with_battery(20.0),
    ];

    let client = HubClient::new(&url, token);
    log::info!("Simulating {} devices against {} every {}ms", devices.len(), url, interval_ms);

    let mut interval = tokio::time::interval(Duration::from_millis(interval_ms));
    loop {
        interval.tick().await;
        for device in devices.iter_mut() {
            let (endpoint, payload) = device.next_payload();
            match client.push(&endpoint, &payload).await {
                Ok(()) => log::debug!("pushed {} ({})", device.device_id, endpoint),
                Err(e) => log::warn!("push failed for {}: {}", device.device_id, e),
            }
        }
    }
}
