// SPDX-License-Identifier: AGPL-3.0
// Nirbhay Core - Offline signal queue and ledger delivery
//
// This crate provides:
// - PendingSos / PendingEvidence signal types and AppError
// - SignalQueue for durable offline buffering of emergency signals
// - ConnectivityMonitor for online/offline detection
// - FlushEngine for draining the queue on reconnect
// - LedgerGateway for reporting incidents to the ledger gateway
// - DeliveryLog and SettingsStore for local persistence
//
// Frontend-specific code lives in separate crates.

pub mod connectivity;
pub mod flush;
pub mod history;
pub mod queue;
pub mod reporter;
pub mod settings;
pub mod types;

// Re-export commonly used items
pub use connectivity::{probe, spawn_probe, ConnectivityMonitor};
pub use flush::{FlushEngine, FlushOutcome, SkipReason};
pub use history::{DeliveredIncident, DeliveryLog};
pub use queue::SignalQueue;
pub use reporter::{geo_hash, IncidentReporter, LedgerGateway};
pub use settings::SettingsStore;
pub use types::{AppError, AppSettings, PendingEvidence, PendingSos};
