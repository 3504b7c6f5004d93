// SPDX-License-Identifier: AGPL-3.0
// Nirbhay Core - Offline signal queue
//
// Durably buffers emergency signals that cannot be sent while offline.
// Each category is one JSON file holding the whole ordered list; every
// operation is a read-modify-write of that whole value.

use crate::types::{AppError, PendingEvidence, PendingSos};
use serde::{de::DeserializeOwned, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const SOS_FILE: &str = "pending_sos.json";
const EVIDENCE_FILE: &str = "pending_evidence.json";

/// File-backed queue of signals awaiting upstream delivery.
///
/// Single writer by design: the alert producer appends, the flush routine
/// reads and clears. Enqueue order is delivery order.
pub struct SignalQueue {
    dir: PathBuf,
}

impl SignalQueue {
    /// Open the queue in the default data directory
    pub fn new() -> Result<Self, AppError> {
        Ok(Self {
            dir: Self::default_dir()?,
        })
    }

    /// Open the queue in an explicit directory
    pub fn with_dir(dir: impl Into<PathBuf>) -> Result<Self, AppError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .map_err(|e| AppError::FileIo(format!("Failed to create queue dir: {}", e)))?;
        Ok(Self { dir })
    }

    fn default_dir() -> Result<PathBuf, AppError> {
        let data_dir = directories::ProjectDirs::from("com", "nirbhay", "safety")
            .ok_or_else(|| AppError::FileIo("Could not determine data directory".to_string()))?
            .data_dir()
            .to_path_buf();

        fs::create_dir_all(&data_dir)
            .map_err(|e| AppError::FileIo(format!("Failed to create data dir: {}", e)))?;

        Ok(data_dir)
    }

    /// Append an SOS signal to the persisted queue
    pub fn enqueue_sos(&self, signal: PendingSos) -> Result<(), AppError> {
        self.append(SOS_FILE, signal)
    }

    /// All queued SOS signals, oldest first.
    ///
    /// Missing or malformed storage reads as empty; this never fails.
    pub fn read_sos(&self) -> Vec<PendingSos> {
        self.read(SOS_FILE)
    }

    /// Drop the entire SOS queue. Only called after a fully successful drain.
    pub fn clear_sos(&self) -> Result<(), AppError> {
        self.remove(SOS_FILE)
    }

    /// Append an evidence signal to the persisted queue
    pub fn enqueue_evidence(&self, signal: PendingEvidence) -> Result<(), AppError> {
        self.append(EVIDENCE_FILE, signal)
    }

    /// All queued evidence signals, oldest first
    pub fn read_evidence(&self) -> Vec<PendingEvidence> {
        self.read(EVIDENCE_FILE)
    }

    /// Drop the entire evidence queue
    pub fn clear_evidence(&self) -> Result<(), AppError> {
        self.remove(EVIDENCE_FILE)
    }

    fn path(&self, file: &str) -> PathBuf {
        self.dir.join(file)
    }

    fn append<T: Serialize + DeserializeOwned>(
        &self,
        file: &str,
        signal: T,
    ) -> Result<(), AppError> {
        let mut list = self.read::<T>(file);
        list.push(signal);

        let content = serde_json::to_string_pretty(&list)
            .map_err(|e| AppError::Serialization(format!("Failed to serialize queue: {}", e)))?;

        fs::write(self.path(file), content)
            .map_err(|e| AppError::FileIo(format!("Failed to write queue: {}", e)))?;

        Ok(())
    }

    fn read<T: DeserializeOwned>(&self, file: &str) -> Vec<T> {
        let path = self.path(file);
        if !path.exists() {
            return Vec::new();
        }

        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!("Failed to read queue {:?}, treating as empty: {}", path, e);
                return Vec::new();
            }
        };

        serde_json::from_str(&content).unwrap_or_else(|e| {
            tracing::warn!("Malformed queue {:?}, treating as empty: {}", path, e);
            Vec::new()
        })
    }

    fn remove(&self, file: &str) -> Result<(), AppError> {
        let path = self.path(file);
        if path.exists() {
            fs::remove_file(&path)
                .map_err(|e| AppError::FileIo(format!("Failed to clear queue: {}", e)))?;
        }
        Ok(())
    }

    /// Directory holding the queue files
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}
