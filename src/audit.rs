//! Optional audit log of every probe result

use crate::error::Result;
use crate::models::ProbeResponse;
use chrono::Local;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::warn;

/// Appends timestamped lines to the log file; one lock per line so
/// concurrent callbacks never interleave output
#[derive(Debug)]
pub struct AuditLog {
    path: PathBuf,
    file: Mutex<File>,
}

impl AuditLog {
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write(&self, message: &str) {
        let line = format!("{}{message}\n", Local::now().format("[%y-%m-%d %H:%M:%S] "));
        let mut file = self.file.lock().unwrap_or_else(|e| e.into_inner());
        if let Err(e) = file.write_all(line.as_bytes()) {
            warn!("Failed to write to {}: {e}", self.path.display());
        }
    }

    /// `<ip-or-0> <status> <method> <url>[ - REDIRECT TO: <target>] (LENGTH: <n>)`
    pub fn result(&self, ip: Option<&str>, method: &str, origin: &str, response: &ProbeResponse) {
        let mut message = format!(
            "{} {} {} {}{}",
            ip.unwrap_or("0"),
            response.status,
            method,
            origin,
            response.path
        );
        if response.has_redirect() {
            message.push_str(&format!(" - REDIRECT TO: {}", response.redirect));
        }
        message.push_str(&format!(" (LENGTH: {})", response.length));
        self.write(&message);
    }

    /// `ERROR: <method> <url>` followed by the indented reason
    pub fn error(&self, method: &str, url: &str, reason: &str) {
        self.write(&format!("ERROR: {method} {url}\n    {reason}"));
    }
}
