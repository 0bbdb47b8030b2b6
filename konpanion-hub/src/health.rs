use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use sysinfo::System;
use crate::state::Shared;
use crate::store::TelemetryStore;
use tokio::task;

#[derive(Debug, Serialize, Deserialize)]
pub struct HubHealth {
    pub hub_id: String,
    pub uptime_seconds: u64,
    pub devices_tracked: u32,
    pub devices_connected: u32,
    pub viewers_connected: u32,
    pub discovered_devices: u32,
    pub memory_usage_mb: Option<f32>,
}

#[derive(Clone)]
pub struct HealthTracker {
    start_time: Instant,
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthTracker {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
        }
    }

    pub fn get_health(&self, app: &crate::state::AppState) -> HubHealth {
        let (hub_id, tracked, connected) = {
            let store = app.store.lock();
            (
                store.hub_id().to_string(),
                store.device_count() as u32,
                store.connected_count() as u32,
            )
        };

        HubHealth {
            hub_id,
            uptime_seconds: self.start_time.elapsed().as_secs(),
            devices_tracked: tracked,
            devices_connected: connected,
            viewers_connected: app.broadcast.viewer_count() as u32,
            discovered_devices: app.registry.lock().len() as u32,
            memory_usage_mb: get_memory_usage_mb(),
        }
    }
}

/// Sweep périodique de staleness (en plus de celui fait avant chaque lecture)
pub fn spawn_staleness_monitor(store: Shared<TelemetryStore>, stale_after_secs: u64, interval_secs: u64) {
    tracing::info!(
        "[health] starting staleness monitor (threshold: {}s, every {}s)",
        stale_after_secs,
        interval_secs
    );

    task::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
        loop {
            interval.tick().await;
            if let Err(e) = store.lock().mark_stale_devices(stale_after_secs) {
                tracing::warn!("[health] staleness sweep failed: {}", e);
            }
        }
    });
}

/// RSS du processus hub ; None si la plateforme ne l'expose pas
fn get_memory_usage_mb() -> Option<f32> {
    let pid = sysinfo::get_current_pid().ok()?;
    let mut sys = System::new();
    sys.refresh_process(pid);
    sys.process(pid)
        .map(|p| p.memory() as f32 / (1024.0 * 1024.0))
}
