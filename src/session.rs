//! Versioned session snapshots for pausing and resuming a scan
//!
//! A snapshot lists exactly the orchestration state needed to resume:
//! the pending targets and directories (in-flight ones first), the pass
//! set, the dictionary with its cursor, job counters, elapsed runtime and
//! the operator output shown so far. Open transport sessions, workers and
//! locks are never persisted.

use crate::error::{DirhoundError, Result};
use crate::models::ScanConfig;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Current snapshot schema version
pub const SESSION_VERSION: u32 = 1;

pub const DEFAULT_SESSION_FILE: &str = "dirhound.session";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub version: u32,
    pub saved_at: DateTime<Local>,
    pub config: ScanConfig,
    /// Targets still to scan, the interrupted one first
    pub targets: Vec<String>,
    /// Directories of the interrupted target, the interrupted one first
    pub directories: Vec<String>,
    /// Every directory queued for the interrupted target
    pub passed_directories: Vec<String>,
    pub dictionary: Vec<String>,
    pub dictionary_index: usize,
    /// Rounds started before the interrupted one
    pub current_job: usize,
    pub jobs_count: usize,
    /// Runtime consumed before the pause, counted against the maximum runtime
    pub elapsed_secs: f64,
    pub last_output: String,
}

impl SessionSnapshot {
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        info!("Session saved to {}", path.display());
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            DirhoundError::SessionError(format!("Cannot read {}: {e}", path.display()))
        })?;
        Self::decode(&content)
    }

    pub fn decode(content: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(content)?;
        let version = value
            .get("version")
            .and_then(serde_json::Value::as_u64)
            .ok_or_else(|| DirhoundError::SessionError("missing schema version".to_string()))?;
        if version == 0 || version > u64::from(SESSION_VERSION) {
            return Err(DirhoundError::SessionError(format!(
                "unsupported session version {version} (expected at most {SESSION_VERSION})"
            )));
        }

        let snapshot: SessionSnapshot = serde_json::from_value(value)?;
        if snapshot.dictionary_index > snapshot.dictionary.len() {
            return Err(DirhoundError::SessionError(format!(
                "dictionary position {} is past the end ({} entries)",
                snapshot.dictionary_index,
                snapshot.dictionary.len()
            )));
        }
        Ok(snapshot)
    }
}
