//! Konpanion Hub - local telemetry hub for VAEL / SNUU / NOOH wearables.
//!
//! Ingests device telemetry into a volatile in-memory store (bounded history
//! per device, derived health), fans accepted events out to live dashboard
//! viewers and tracks devices seen during WiFi scans.

pub mod auth;
pub mod broadcast;
pub mod config;
pub mod discovery;
pub mod error;
pub mod health;
pub mod http;
pub mod ingest;
pub mod models;
pub mod ring_buffer;
pub mod state;
pub mod store;
pub mod ws;
