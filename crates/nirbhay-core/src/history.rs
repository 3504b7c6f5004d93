// SPDX-License-Identifier: AGPL-3.0
// Nirbhay Core - Delivery log persistence
//
// Stores delivered incident reports in a local JSON file, most recent first.

use crate::types::AppError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::sync::RwLock;

/// Maximum number of log entries to keep
const MAX_LOG_ENTRIES: usize = 200;

/// One incident report that reached the ledger
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveredIncident {
    pub id: String,
    pub tx_hash: String,
    pub lat: f64,
    pub lng: f64,
    /// "algorand" or "ethereum"
    pub chain: String,
    pub delivered_at: chrono::DateTime<chrono::Utc>,
}

impl DeliveredIncident {
    pub fn new(tx_hash: String, lat: f64, lng: f64, use_algorand: bool) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            tx_hash,
            lat,
            lng,
            chain: if use_algorand { "algorand" } else { "ethereum" }.to_string(),
            delivered_at: chrono::Utc::now(),
        }
    }
}

/// File-based delivery log
pub struct DeliveryLog {
    records: RwLock<Vec<DeliveredIncident>>,
    file_path: PathBuf,
}

#[derive(Serialize, Deserialize)]
struct LogFile {
    records: Vec<DeliveredIncident>,
}

impl DeliveryLog {
    /// Create a new delivery log, loading from disk if available
    pub fn new() -> Result<Self, AppError> {
        Self::at_path(Self::default_path()?)
    }

    /// Create a delivery log backed by an explicit file path
    pub fn at_path(file_path: PathBuf) -> Result<Self, AppError> {
        let records = if file_path.exists() {
            let content = fs::read_to_string(&file_path)
                .map_err(|e| AppError::FileIo(format!("Failed to read delivery log: {}", e)))?;

            let file: LogFile = serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!("Failed to parse delivery log, starting fresh: {}", e);
                LogFile {
                    records: Vec::new(),
                }
            });

            file.records
        } else {
            Vec::new()
        };

        Ok(Self {
            records: RwLock::new(records),
            file_path,
        })
    }

    fn default_path() -> Result<PathBuf, AppError> {
        let data_dir = directories::ProjectDirs::from("com", "nirbhay", "safety")
            .ok_or_else(|| AppError::FileIo("Could not determine data directory".to_string()))?
            .data_dir()
            .to_path_buf();

        fs::create_dir_all(&data_dir)
            .map_err(|e| AppError::FileIo(format!("Failed to create data dir: {}", e)))?;

        Ok(data_dir.join("delivery_log.json"))
    }

    /// Persist the log to disk
    fn persist(&self) -> Result<(), AppError> {
        let records = self.records.read().unwrap();
        let file = LogFile {
            records: records.clone(),
        };

        let content = serde_json::to_string_pretty(&file).map_err(|e| {
            AppError::Serialization(format!("Failed to serialize delivery log: {}", e))
        })?;

        fs::write(&self.file_path, content)
            .map_err(|e| AppError::FileIo(format!("Failed to write delivery log: {}", e)))?;

        Ok(())
    }

    /// All logged deliveries, most recent first
    pub fn list(&self) -> Vec<DeliveredIncident> {
        self.records.read().unwrap().clone()
    }

    /// Record a delivered incident
    pub fn add(&self, record: DeliveredIncident) -> Result<(), AppError> {
        {
            let mut records = self.records.write().unwrap();

            records.insert(0, record);

            if records.len() > MAX_LOG_ENTRIES {
                records.truncate(MAX_LOG_ENTRIES);
            }
        }

        self.persist()
    }

    /// Get the count of log entries
    pub fn count(&self) -> usize {
        self.records.read().unwrap().len()
    }
}
