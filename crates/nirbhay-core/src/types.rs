// SPDX-License-Identifier: AGPL-3.0
// Nirbhay Core - Type definitions

use serde::{Deserialize, Serialize};

/// An SOS alert that could not be delivered immediately.
///
/// Immutable once created: records are only ever appended to or removed from
/// the queue as a whole, never mutated in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingSos {
    /// Latitude in floating-point degrees
    pub lat: f64,
    /// Longitude in floating-point degrees
    pub lng: f64,
    /// Ledger selection: true for Algorand, false for Ethereum
    pub use_algorand: bool,
    /// Creation time, epoch milliseconds
    pub created_at: i64,
}

impl PendingSos {
    pub fn new(lat: f64, lng: f64, use_algorand: bool) -> Self {
        Self {
            lat,
            lng,
            use_algorand,
            created_at: chrono::Utc::now().timestamp_millis(),
        }
    }
}

/// A deferred evidence upload.
///
/// Declared and persisted, but wired to no producer or flush consumer yet:
/// the evidence category is a reserved extension point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingEvidence {
    pub file_name: String,
    pub mime_type: String,
    /// Creation time, epoch milliseconds
    pub created_at: i64,
    /// Ledger selection: true for Algorand, false for Ethereum
    pub use_algorand: bool,
}

/// Application settings (frontend-agnostic)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppSettings {
    /// Device name included in incident payloads
    pub device_name: String,
    /// Report to Algorand by default instead of Ethereum
    #[serde(default)]
    pub use_algorand: bool,
    /// Gateway endpoint for Ethereum incident reports
    #[serde(default = "default_ethereum_gateway")]
    pub ethereum_gateway: String,
    /// Gateway endpoint for Algorand incident reports
    #[serde(default = "default_algorand_gateway")]
    pub algorand_gateway: String,
    /// Host:port probed to detect connectivity
    #[serde(default = "default_probe_target")]
    pub probe_target: String,
    /// Seconds between connectivity probes
    #[serde(default = "default_probe_interval_secs")]
    pub probe_interval_secs: u64,
}

fn default_ethereum_gateway() -> String {
    "https://gateway.nirbhay.app/eth/incidents".to_string()
}

fn default_algorand_gateway() -> String {
    "https://gateway.nirbhay.app/algo/incidents".to_string()
}

fn default_probe_target() -> String {
    "gateway.nirbhay.app:443".to_string()
}

fn default_probe_interval_secs() -> u64 {
    15
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            device_name: hostname::get()
                .map(|h| h.to_string_lossy().to_string())
                .unwrap_or_else(|_| "Nirbhay Device".to_string()),
            use_algorand: false,
            ethereum_gateway: default_ethereum_gateway(),
            algorand_gateway: default_algorand_gateway(),
            probe_target: default_probe_target(),
            probe_interval_secs: default_probe_interval_secs(),
        }
    }
}

impl AppSettings {
    /// Gateway URL for the given ledger flag
    pub fn gateway_for(&self, use_algorand: bool) -> &str {
        if use_algorand {
            &self.algorand_gateway
        } else {
            &self.ethereum_gateway
        }
    }
}

/// Error types for the application
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("File I/O error: {0}")]
    FileIo(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Delivery failed: {0}")]
    Delivery(String),

    #[error("Gateway error: {0}")]
    Gateway(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::FileIo(err.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::Gateway(err.to_string())
    }
}
