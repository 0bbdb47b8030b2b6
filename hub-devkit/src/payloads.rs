/*!
Builders de payloads de télémétrie

Produit le JSON exact attendu par `POST /ingest/{vael,snuu,nooh}`.
`ts` n'est posé que si demandé : le hub le remplit à la réception sinon.
*/

use serde_json::{json, Map, Value};

/// Construit un événement de télémétrie pour un device
#[derive(Debug, Clone)]
pub struct TelemetryBuilder {
    device_type: &'static str,
    fields: Map<String, Value>,
}

impl TelemetryBuilder {
    fn new(device_type: &'static str, hub_id: &str, device_id: &str) -> Self {
        let mut fields = Map::new();
        fields.insert("hub_id".into(), json!(hub_id));
        fields.insert("device_id".into(), json!(device_id));
        fields.insert("device_type".into(), json!(device_type));
        Self { device_type, fields }
    }

    pub fn vael(hub_id: &str, device_id: &str) -> Self {
        Self::new("VAEL", hub_id, device_id)
    }

    pub fn snuu(hub_id: &str, device_id: &str) -> Self {
        Self::new("SNUU", hub_id, device_id)
    }

    pub fn nooh(hub_id: &str, device_id: &str) -> Self {
        Self::new("NOOH", hub_id, device_id)
    }

    /// Route d'ingestion correspondant au type
    pub fn endpoint(&self) -> String {
        format!("/ingest/{}", self.device_type.to_lowercase())
    }

    pub fn ts(mut self, rfc3339: &str) -> Self {
        self.fields.insert("ts".into(), json!(rfc3339));
        self
    }

    pub fn now(self) -> Self {
        let ts = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true);
        self.ts(&ts)
    }

    pub fn battery(mut self, pct: f64) -> Self {
        self.fields.insert("battery_pct".into(), json!(pct));
        self
    }

    pub fn rssi(mut self, dbm: i32) -> Self {
        self.fields.insert("rssi_dbm".into(), json!(dbm));
        self
    }

    pub fn firmware(mut self, version: &str) -> Self {
        self.fields.insert("fw_version".into(), json!(version));
        self
    }

    pub fn imu(mut self, accel: [f64; 3], gyro: [f64; 3]) -> Self {
        self.fields.insert(
            "imu".into(),
            json!({
                "ax": accel[0], "ay": accel[1], "az": accel[2],
                "gx": gyro[0], "gy": gyro[1], "gz": gyro[2]
            }),
        );
        self
    }

    pub fn mic(mut self, rms: f64, peak: f64, zcr: Option<f64>) -> Self {
        let mut mic = json!({ "rms": rms, "peak": peak });
        if let Some(zcr) = zcr {
            mic["zcr"] = json!(zcr);
        }
        self.fields.insert("mic".into(), mic);
        self
    }

    pub fn fsr(mut self, channels: Vec<f64>) -> Self {
        self.fields.insert("fsr".into(), json!(channels));
        self
    }

    pub fn fall(mut self, detected: bool, confidence: f64) -> Self {
        self.fields.insert("fall_event".into(), json!(detected));
        self.fields.insert("fall_confidence".into(), json!(confidence));
        self
    }

    pub fn build(self) -> Value {
        Value::Object(self.fields)
    }
}
