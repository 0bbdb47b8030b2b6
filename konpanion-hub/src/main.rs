/**
 * KONPANION HUB - Point d'entrée principal du hub
 *
 * RÔLE : Orchestration de tous les modules : config, store, broadcast, découverte, HTTP.
 * Toutes les structures partagées sont construites ici puis injectées (pas de globals).
 *
 * ARCHITECTURE : Ingestion HTTP → store en mémoire → fan-out WebSocket + sweep staleness périodique.
 */

use konpanion_hub::auth::UserDb;
use konpanion_hub::config::load_config;
use konpanion_hub::discovery::scan;
use konpanion_hub::health::spawn_staleness_monitor;
use konpanion_hub::http;
use konpanion_hub::state::AppState;

use anyhow::Context;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Charger les variables d'environnement depuis .env (si présent)
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("konpanion_hub=info")),
        )
        .init();

    let cfg = load_config().await;

    let users = match UserDb::load(&cfg.users_file).await {
        Ok(db) => {
            tracing::info!("[hub] loaded {} users", db.len());
            db
        }
        Err(e) => {
            tracing::error!("[hub] failed to load users from {}: {}", cfg.users_file, e);
            UserDb::default()
        }
    };

    let addr: SocketAddr = format!("{}:{}", cfg.host, cfg.port)
        .parse()
        .with_context(|| format!("invalid listen address {}:{}", cfg.host, cfg.port))?;

    let app_state = AppState::new(cfg, users);
    let cfg = app_state.cfg.clone();
    tracing::info!(
        hub_id = %cfg.hub_id,
        max_samples = cfg.max_samples,
        ingest_auth = !cfg.ingest_token.is_empty(),
        "[hub] store ready"
    );

    // sweep staleness en tâche de fond
    spawn_staleness_monitor(app_state.store.clone(), cfg.stale_after_secs, cfg.sweep_interval_secs);

    if cfg.scan.interval_secs > 0 {
        scan::spawn_periodic_scan(app_state.registry.clone(), cfg.scan.interface.clone(), cfg.scan.interval_secs);
    }

    let app = http::build_router(app_state);

    tracing::info!("[hub] listening on http://{addr}");
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    axum::serve(listener, app).await?;
    Ok(())
}
