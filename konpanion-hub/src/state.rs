use crate::auth::{SessionStore, UserDb};
use crate::broadcast::SharedBroadcastHub;
use crate::config::HubConfig;
use crate::discovery::DiscoveryRegistry;
use crate::health::HealthTracker;
use crate::store::TelemetryStore;
use parking_lot::Mutex;
use std::sync::Arc;

pub type Shared<T> = Arc<Mutex<T>>;

pub fn new_state<T>(value: T) -> Shared<T> {
    Arc::new(Mutex::new(value))
}

/// État unique injecté dans Axum ; tout est construit par main()
#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<HubConfig>,
    pub store: Shared<TelemetryStore>,
    pub broadcast: SharedBroadcastHub,
    pub registry: Shared<DiscoveryRegistry>,
    pub sessions: Shared<SessionStore>,
    pub users: Arc<UserDb>,
    pub health_tracker: HealthTracker,
}

impl AppState {
    pub fn new(cfg: HubConfig, users: UserDb) -> Self {
        let delivery_timeout = std::time::Duration::from_millis(cfg.viewers.delivery_timeout_ms);
        Self {
            store: new_state(TelemetryStore::new(&cfg.hub_id, cfg.max_samples)),
            broadcast: Arc::new(crate::broadcast::BroadcastHub::new(delivery_timeout)),
            registry: new_state(DiscoveryRegistry::new()),
            sessions: new_state(SessionStore::new()),
            users: Arc::new(users),
            health_tracker: HealthTracker::new(),
            cfg: Arc::new(cfg),
        }
    }
}
