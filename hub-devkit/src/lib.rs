/*!
# Konpanion DevKit - Builders et simulateur pour le développement du hub

Bibliothèque facilitant le développement et les tests avec:
- Builders de payloads JSON pour les trois familles (VAEL / SNUU / NOOH)
- Générateur de télémétrie synthétique (signaux plausibles, batterie qui descend)
- Client HTTP minimal pour pousser vers un hub qui tourne
*/

pub mod payloads;
pub mod simulator;

pub use payloads::TelemetryBuilder;
pub use simulator::{DeviceSimulator, HubClient};
