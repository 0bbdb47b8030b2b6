/**
 * TELEMETRY STORE - Agrégateur central en mémoire du hub
 *
 * RÔLE :
 * Purement événementiel : rien n'apparaît tant qu'un device n'a pas envoyé
 * de télémétrie. Le store tient :
 * - le statut courant par device (merge des champs + issues recalculées)
 * - un ring buffer d'historique par device
 * - le dernier événement accepté (pour le fan-out WebSocket)
 *
 * CONCURRENCE :
 * Le store lui-même est synchrone (&mut self). Il est partagé derrière un
 * seul Mutex (voir state::Shared), ce qui rend `upsert_telemetry` atomique
 * vis-à-vis des snapshots et des lectures de séries.
 *
 * Volatile : aucune persistance entre redémarrages.
 */

use crate::models::{DeviceStatus, DeviceType, HubSnapshot, TelemetryEvent};
use crate::ring_buffer::RingBuffer;
use std::collections::{BTreeMap, HashMap};
use time::{Duration, OffsetDateTime};

pub const LOW_BATTERY_THRESHOLD_PCT: f64 = 15.0;
pub const LOW_BATTERY_ISSUE: &str = "Low battery (<15%).";
pub const NO_FSR_ISSUE: &str = "No FSR payload received.";
pub const STALE_ISSUE: &str = "Device stale/disconnected.";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Invalid staleness threshold: {0}s")]
    InvalidThreshold(u64),
}

pub struct TelemetryStore {
    hub_id: String,
    max_samples: usize,
    status: HashMap<String, DeviceStatus>,
    telemetry: HashMap<String, RingBuffer<TelemetryEvent>>,
    last_event: Option<TelemetryEvent>,
}

impl TelemetryStore {
    pub fn new(hub_id: &str, max_samples: usize) -> Self {
        Self {
            hub_id: hub_id.to_string(),
            max_samples,
            status: HashMap::new(),
            telemetry: HashMap::new(),
            last_event: None,
        }
    }

    pub fn hub_id(&self) -> &str {
        &self.hub_id
    }

    /// Change la capacité globale ; chaque buffer s'aligne à son prochain push
    pub fn set_max_samples(&mut self, max_samples: usize) {
        self.max_samples = max_samples;
    }

    /// Applique un événement accepté : statut, issues, historique, dernier événement
    pub fn upsert_telemetry(&mut self, evt: TelemetryEvent) {
        let issues = compute_issues(&evt);

        let status = self
            .status
            .entry(evt.device_id.clone())
            .and_modify(|s| s.merge_event(&evt))
            .or_insert_with(|| DeviceStatus::from_event(&evt));
        // remplacées à chaque ingest, jamais cumulées
        status.issues = issues;

        let max_samples = self.max_samples;
        let buffer = self
            .telemetry
            .entry(evt.device_id.clone())
            .or_insert_with(|| RingBuffer::new(max_samples));
        if buffer.capacity() != max_samples {
            buffer.set_capacity(max_samples);
        }
        buffer.push(evt.clone());

        tracing::debug!(
            device_id = %evt.device_id,
            device_type = %evt.device_type(),
            samples = buffer.len(),
            "telemetry accepted"
        );

        self.last_event = Some(evt);
    }

    /// Marque déconnectés les devices muets depuis plus de `stale_after_secs`
    pub fn mark_stale_devices(&mut self, stale_after_secs: u64) -> Result<usize, StoreError> {
        self.mark_stale_devices_at(OffsetDateTime::now_utc(), stale_after_secs)
    }

    /// Même chose avec une horloge explicite ; retourne le nombre de devices stale
    pub fn mark_stale_devices_at(
        &mut self,
        now: OffsetDateTime,
        stale_after_secs: u64,
    ) -> Result<usize, StoreError> {
        let secs = i64::try_from(stale_after_secs)
            .map_err(|_| StoreError::InvalidThreshold(stale_after_secs))?;
        let threshold = Duration::seconds(secs);
        let mut stale = 0;

        for s in self.status.values_mut() {
            let is_stale = match s.last_seen {
                None => true,
                Some(seen) => now - seen > threshold,
            };
            if !is_stale {
                continue;
            }
            if s.connected {
                tracing::info!(device_id = %s.device_id, "device marked stale");
            }
            s.connected = false;
            // seul cas où les issues s'accumulent (sans doublon)
            if !s.issues.iter().any(|i| i == STALE_ISSUE) {
                s.issues.push(STALE_ISSUE.to_string());
            }
            stale += 1;
        }

        Ok(stale)
    }

    pub fn snapshot(&self) -> HubSnapshot {
        HubSnapshot {
            hub_id: self.hub_id.clone(),
            ts: OffsetDateTime::now_utc(),
            devices: self
                .status
                .iter()
                .map(|(id, s)| (id.clone(), s.clone()))
                .collect::<BTreeMap<_, _>>(),
        }
    }

    /// Historique d'un device (vide si aucun buffer)
    pub fn get_device_series(&self, device_id: &str) -> Vec<TelemetryEvent> {
        self.telemetry
            .get(device_id)
            .map(|rb| rb.to_vec())
            .unwrap_or_default()
    }

    pub fn get_status(&self, device_id: &str) -> Option<&DeviceStatus> {
        self.status.get(device_id)
    }

    pub fn knows_device(&self, device_id: &str) -> bool {
        self.status.contains_key(device_id)
    }

    pub fn last_event(&self) -> Option<&TelemetryEvent> {
        self.last_event.as_ref()
    }

    pub fn device_count(&self) -> usize {
        self.status.len()
    }

    pub fn connected_count(&self) -> usize {
        self.status.values().filter(|s| s.connected).count()
    }
}

/// Issues calculées uniquement à partir de l'événement courant
fn compute_issues(evt: &TelemetryEvent) -> Vec<String> {
    let mut issues = Vec::new();
    let device_type = evt.device_type();

    match (device_type, evt.payload.fsr()) {
        (DeviceType::Snuu, None) => issues.push(NO_FSR_ISSUE.to_string()),
        // absence tolérée pour NOOH, seul un mauvais compte est signalé
        (DeviceType::Snuu | DeviceType::Nooh, Some(fsr)) => {
            if let Some(expected) = device_type.expected_fsr_channels() {
                if fsr.len() != expected {
                    issues.push(format!(
                        "Expected {} FSR channels, got {}.",
                        expected,
                        fsr.len()
                    ));
                }
            }
        }
        _ => {}
    }

    if evt
        .battery_pct
        .is_some_and(|b| b < LOW_BATTERY_THRESHOLD_PCT)
    {
        issues.push(LOW_BATTERY_ISSUE.to_string());
    }

    issues
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DevicePayload, NoohPayload, SnuuPayload, VaelPayload};
    use time::macros::datetime;

    fn base_ts() -> OffsetDateTime {
        datetime!(2026-03-01 12:00:00 UTC)
    }

    fn snuu(device_id: &str, secs: i64, fsr: Option<Vec<f64>>, battery: Option<f64>) -> TelemetryEvent {
        TelemetryEvent {
            hub_id: "HUB-T".into(),
            device_id: device_id.into(),
            ts: base_ts() + Duration::seconds(secs),
            rssi_dbm: None,
            battery_pct: battery,
            fw_version: None,
            payload: DevicePayload::Snuu(SnuuPayload { fsr }),
        }
    }

    fn vael(device_id: &str, secs: i64, battery: Option<f64>) -> TelemetryEvent {
        TelemetryEvent {
            hub_id: "HUB-T".into(),
            device_id: device_id.into(),
            ts: base_ts() + Duration::seconds(secs),
            rssi_dbm: Some(-55),
            battery_pct: battery,
            fw_version: Some("0.9.1".into()),
            payload: DevicePayload::Vael(VaelPayload::default()),
        }
    }

    fn nooh(device_id: &str, fsr: Option<Vec<f64>>) -> TelemetryEvent {
        TelemetryEvent {
            hub_id: "HUB-T".into(),
            device_id: device_id.into(),
            ts: base_ts(),
            rssi_dbm: None,
            battery_pct: Some(90.0),
            fw_version: None,
            payload: DevicePayload::Nooh(NoohPayload {
                fsr,
                ..Default::default()
            }),
        }
    }

    #[test]
    fn test_series_keeps_last_n_in_order() {
        let mut store = TelemetryStore::new("HUB-T", 4);
        for i in 0..10 {
            store.upsert_telemetry(vael("VAEL-01", i, None));
        }

        let series = store.get_device_series("VAEL-01");
        assert_eq!(series.len(), 4);
        let secs: Vec<i64> = series
            .iter()
            .map(|e| (e.ts - base_ts()).whole_seconds())
            .collect();
        assert_eq!(secs, vec![6, 7, 8, 9]);
    }

    #[test]
    fn test_series_shorter_than_capacity() {
        let mut store = TelemetryStore::new("HUB-T", 100);
        for i in 0..3 {
            store.upsert_telemetry(vael("VAEL-01", i, None));
        }
        assert_eq!(store.get_device_series("VAEL-01").len(), 3);
        assert!(store.get_device_series("VAEL-99").is_empty());
    }

    #[test]
    fn test_snuu_bad_channels_and_low_battery() {
        let mut store = TelemetryStore::new("HUB-T", 10);
        store.upsert_telemetry(snuu("SNUU-01", 0, Some(vec![0.0; 5]), Some(10.0)));

        let status = store.get_status("SNUU-01").unwrap();
        assert!(status.connected);
        assert_eq!(
            status.issues,
            vec![
                "Expected 6 FSR channels, got 5.".to_string(),
                "Low battery (<15%).".to_string()
            ]
        );
    }

    #[test]
    fn test_snuu_missing_payload() {
        let mut store = TelemetryStore::new("HUB-T", 10);
        store.upsert_telemetry(snuu("SNUU-01", 0, None, None));
        assert_eq!(store.get_status("SNUU-01").unwrap().issues, vec![NO_FSR_ISSUE]);
    }

    #[test]
    fn test_nooh_fsr_rules() {
        let mut store = TelemetryStore::new("HUB-T", 10);
        store.upsert_telemetry(nooh("NOOH-01", None));
        assert!(store.get_status("NOOH-01").unwrap().issues.is_empty());

        store.upsert_telemetry(nooh("NOOH-01", Some(vec![1.0; 6])));
        assert_eq!(
            store.get_status("NOOH-01").unwrap().issues,
            vec!["Expected 4 FSR channels, got 6."]
        );

        store.upsert_telemetry(nooh("NOOH-01", Some(vec![1.0; 4])));
        assert!(store.get_status("NOOH-01").unwrap().issues.is_empty());
    }

    #[test]
    fn test_issues_replaced_not_accumulated() {
        let mut store = TelemetryStore::new("HUB-T", 10);
        store.upsert_telemetry(snuu("SNUU-01", 0, Some(vec![0.0; 3]), Some(5.0)));
        assert_eq!(store.get_status("SNUU-01").unwrap().issues.len(), 2);

        store.upsert_telemetry(snuu("SNUU-01", 1, Some(vec![0.0; 6]), Some(80.0)));
        assert!(store.get_status("SNUU-01").unwrap().issues.is_empty());
    }

    #[test]
    fn test_absent_battery_preserves_previous() {
        let mut store = TelemetryStore::new("HUB-T", 10);
        store.upsert_telemetry(vael("VAEL-01", 0, Some(42.0)));
        store.upsert_telemetry(vael("VAEL-01", 1, None));
        assert_eq!(store.get_status("VAEL-01").unwrap().battery_pct, Some(42.0));
    }

    #[test]
    fn test_stale_marking_is_idempotent() {
        let mut store = TelemetryStore::new("HUB-T", 10);
        store.upsert_telemetry(vael("VAEL-01", 0, None));

        let now = base_ts() + Duration::seconds(20);
        assert_eq!(store.mark_stale_devices_at(now, 15).unwrap(), 1);
        assert_eq!(store.mark_stale_devices_at(now, 15).unwrap(), 1);

        let status = store.get_status("VAEL-01").unwrap();
        assert!(!status.connected);
        assert_eq!(status.issues.iter().filter(|i| *i == STALE_ISSUE).count(), 1);
    }

    #[test]
    fn test_stale_keeps_existing_issues() {
        let mut store = TelemetryStore::new("HUB-T", 10);
        store.upsert_telemetry(vael("VAEL-01", 0, Some(3.0)));
        store
            .mark_stale_devices_at(base_ts() + Duration::seconds(60), 15)
            .unwrap();
        assert_eq!(
            store.get_status("VAEL-01").unwrap().issues,
            vec![LOW_BATTERY_ISSUE, STALE_ISSUE]
        );
    }

    #[test]
    fn test_fresh_device_untouched() {
        let mut store = TelemetryStore::new("HUB-T", 10);
        store.upsert_telemetry(vael("VAEL-01", 0, None));
        let stale = store
            .mark_stale_devices_at(base_ts() + Duration::seconds(10), 15)
            .unwrap();
        assert_eq!(stale, 0);
        let status = store.get_status("VAEL-01").unwrap();
        assert!(status.connected);
        assert!(status.issues.is_empty());
    }

    #[test]
    fn test_next_ingest_clears_staleness() {
        let mut store = TelemetryStore::new("HUB-T", 10);
        store.upsert_telemetry(vael("VAEL-01", 0, None));
        store
            .mark_stale_devices_at(base_ts() + Duration::seconds(30), 15)
            .unwrap();
        store.upsert_telemetry(vael("VAEL-01", 31, None));

        let status = store.get_status("VAEL-01").unwrap();
        assert!(status.connected);
        assert!(status.issues.is_empty());
    }

    #[test]
    fn test_invalid_threshold_is_an_error() {
        let mut store = TelemetryStore::new("HUB-T", 10);
        store.upsert_telemetry(vael("VAEL-01", 0, None));
        assert!(store.mark_stale_devices(u64::MAX).is_err());
        // l'état n'a pas bougé
        assert!(store.get_status("VAEL-01").unwrap().connected);
    }

    #[test]
    fn test_last_event_tracks_latest_ingest() {
        let mut store = TelemetryStore::new("HUB-T", 10);
        assert!(store.last_event().is_none());
        store.upsert_telemetry(vael("VAEL-01", 0, None));
        store.upsert_telemetry(snuu("SNUU-02", 1, None, None));
        assert_eq!(store.last_event().unwrap().device_id, "SNUU-02");
    }

    #[test]
    fn test_snapshot_is_detached() {
        let mut store = TelemetryStore::new("HUB-T", 10);
        store.upsert_telemetry(vael("VAEL-01", 0, Some(50.0)));
        let snap = store.snapshot();

        store.upsert_telemetry(vael("VAEL-01", 1, Some(60.0)));
        assert_eq!(snap.hub_id, "HUB-T");
        assert_eq!(snap.devices["VAEL-01"].battery_pct, Some(50.0));
    }

    #[test]
    fn test_capacity_change_applies_on_next_push() {
        let mut store = TelemetryStore::new("HUB-T", 5);
        for i in 0..5 {
            store.upsert_telemetry(vael("VAEL-01", i, None));
        }
        store.set_max_samples(2);
        assert_eq!(store.get_device_series("VAEL-01").len(), 5);

        store.upsert_telemetry(vael("VAEL-01", 5, None));
        assert_eq!(store.get_device_series("VAEL-01").len(), 2);
    }

    #[test]
    fn test_readers_never_see_partial_upsert() {
        use crate::state::new_state;
        use std::thread;

        let store = new_state(TelemetryStore::new("HUB-T", 50));
        let writers: Vec<_> = (0..4)
            .map(|w| {
                let store = store.clone();
                thread::spawn(move || {
                    for i in 0..500 {
                        let device = if i % 2 == 0 { "VAEL-01" } else { "VAEL-02" };
                        store.lock().upsert_telemetry(vael(device, w * 1000 + i, None));
                    }
                })
            })
            .collect();

        let readers: Vec<_> = (0..2)
            .map(|_| {
                let store = store.clone();
                thread::spawn(move || {
                    for _ in 0..500 {
                        let guard = store.lock();
                        let snap = guard.snapshot();
                        for (id, status) in &snap.devices {
                            let series = guard.get_device_series(id);
                            let last = series.last().expect("status without history");
                            assert_eq!(status.last_seen, Some(last.ts));
                        }
                    }
                })
            })
            .collect();

        for handle in writers.into_iter().chain(readers) {
            handle.join().unwrap();
        }

        let guard = store.lock();
        assert_eq!(guard.device_count(), 2);
        assert_eq!(guard.get_device_series("VAEL-01").len(), 50);
    }
}
