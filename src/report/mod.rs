//! Accepted results per target and their persistence

pub mod csv;
pub mod json;
pub mod jsonl;
pub mod plain;

use crate::error::{DirhoundError, Result};
use crate::http::TargetUrl;
use crate::models::{OutputFormat, ProbeResponse, ScanConfig};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;
use url::Url;

/// A single accepted result
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReportEntry {
    /// Path relative to the target base path (directory + entry)
    pub path: String,
    pub url: String,
    pub status: u16,
    pub length: usize,
    pub redirect: Option<String>,
}

/// Accepted results for one target
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub target: String,
    pub started_at: DateTime<Local>,
    pub results: Vec<ReportEntry>,
    pub completed: bool,
}

impl Report {
    pub fn new(target: &TargetUrl) -> Self {
        Self {
            target: target.url(),
            started_at: Local::now(),
            results: Vec::new(),
            completed: false,
        }
    }

    pub fn add_result(&mut self, path: &str, response: &ProbeResponse) {
        self.results.push(ReportEntry {
            path: path.to_string(),
            url: format!("{}{path}", self.target),
            status: response.status,
            length: response.length,
            redirect: response.has_redirect().then(|| response.redirect.clone()),
        });
    }

    pub fn mark_completed(&mut self) {
        self.completed = true;
    }

    fn same_scan(&self, other: &Report) -> bool {
        self.target == other.target && self.started_at == other.started_at
    }
}

/// Persists every report of the run to a single file in the configured format
#[derive(Debug)]
pub struct ReportManager {
    format: OutputFormat,
    path: PathBuf,
    reports: Vec<Report>,
}

impl ReportManager {
    pub fn new(format: OutputFormat, path: PathBuf) -> Self {
        Self {
            format,
            path,
            reports: Vec::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Records the latest state of `report` and rewrites the report file
    pub fn update(&mut self, report: &Report) -> Result<()> {
        match self.reports.iter_mut().find(|r| r.same_scan(report)) {
            Some(existing) => *existing = report.clone(),
            None => self.reports.push(report.clone()),
        }
        self.write()
    }

    fn write(&self) -> Result<()> {
        debug!("Writing {} report to {}", self.format, self.path.display());
        match self.format {
            OutputFormat::Plain => plain::export(&self.reports, &self.path),
            OutputFormat::Simple => plain::export_simple(&self.reports, &self.path),
            OutputFormat::Json => json::export(&self.reports, &self.path),
            OutputFormat::Jsonl => jsonl::export(&self.reports, &self.path),
            OutputFormat::Csv => csv::export(&self.reports, &self.path),
        }
    }
}

/// Works out the report file for this run, creating its directory
///
/// An explicit output file wins. Otherwise a single target is saved as
/// `<location>/<netloc>/<path>_<timestamp><ext>` and several targets as
/// `<location>/BATCH-<timestamp>/BATCH<ext>`. Existing files are never
/// overwritten: `_2`, `_3`, ... is appended instead.
pub fn resolve_report_path(config: &ScanConfig, targets: &[String]) -> Result<Option<PathBuf>> {
    if let Some(ref file) = config.output_file {
        let path = absolute(Path::new(file))?;
        if let Some(parent) = path.parent() {
            crate::config::ensure_directory(parent)?;
        }
        return Ok(Some(path));
    }
    if !config.autosave_report {
        return Ok(None);
    }

    let location = PathBuf::from(config.output_location.as_deref().unwrap_or("reports"));
    let timestamp = Local::now().format("%y-%m-%d_%H-%M-%S").to_string();
    let extension = config.output_format.extension();

    let (directory, filename) = if targets.len() > 1 {
        (location.join(format!("BATCH-{timestamp}")), format!("BATCH{extension}"))
    } else {
        let first = targets.first().map(String::as_str).unwrap_or_default();
        let (netloc, path) = split_target(first, &config.scheme);
        (
            location.join(valid_filename(&netloc)),
            valid_filename(&format!("{path}_{timestamp}{extension}")),
        )
    };

    crate::config::ensure_directory(&directory)?;
    Ok(Some(unique_path(directory.join(filename))))
}

fn split_target(target: &str, scheme: &str) -> (String, String) {
    let with_scheme = if target.contains("://") {
        target.to_string()
    } else {
        format!("{scheme}://{target}")
    };
    match Url::parse(&with_scheme) {
        Ok(url) => {
            let netloc = match url.port() {
                Some(port) => format!("{}:{port}", url.host_str().unwrap_or_default()),
                None => url.host_str().unwrap_or_default().to_string(),
            };
            (netloc, url.path().to_string())
        }
        Err(_) => (target.to_string(), String::new()),
    }
}

/// Replaces characters that are not allowed in file names
pub fn valid_filename(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '-',
            other => other,
        })
        .collect()
}

fn unique_path(path: PathBuf) -> PathBuf {
    if !path.exists() {
        return path;
    }
    let base = path.to_string_lossy().into_owned();
    let mut i = 2;
    while Path::new(&format!("{base}_{i}")).exists() {
        i += 1;
    }
    PathBuf::from(format!("{base}_{i}"))
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir()
        .map_err(|e| DirhoundError::Filesystem(format!("Cannot resolve working directory: {e}")))?;
    Ok(cwd.join(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report() -> Report {
        let target = TargetUrl::parse("http://x/", "http").expect("url");
        let mut report = Report::new(&target);
        report.add_result(
            "admin/",
            &ProbeResponse {
                path: "/admin/".to_string(),
                status: 200,
                length: 12,
                content: "hello admin!".to_string(),
                redirect: String::new(),
            },
        );
        report
    }

    #[test]
    fn test_add_result() {
        let report = report();
        assert_eq!(report.results.len(), 1);
        assert_eq!(report.results[0].url, "http://x/admin/");
        assert_eq!(report.results[0].redirect, None);
    }

    #[test]
    fn test_manager_replaces_updated_report() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut manager = ReportManager::new(OutputFormat::Json, dir.path().join("out.json"));
        let mut report = report();
        manager.update(&report).expect("write");
        report.mark_completed();
        manager.update(&report).expect("write");

        let written = std::fs::read_to_string(manager.path()).expect("read");
        let parsed: serde_json::Value = serde_json::from_str(&written).expect("json");
        assert_eq!(parsed["reports"].as_array().map(Vec::len), Some(1));
        assert_eq!(parsed["reports"][0]["completed"], true);
    }

    #[test]
    fn test_single_target_path() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = ScanConfig {
            output_location: Some(dir.path().to_string_lossy().into_owned()),
            ..ScanConfig::default()
        };
        let path = resolve_report_path(&config, &["http://example.com:8080/app".to_string()])
            .expect("path")
            .expect("enabled");
        assert_eq!(path.parent(), Some(dir.path().join("example.com-8080").as_path()));
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("-app_"), "{name}");
        assert!(name.ends_with(".txt"));
    }

    #[test]
    fn test_batch_path_and_uniqueness() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = ScanConfig {
            output_location: Some(dir.path().to_string_lossy().into_owned()),
            output_format: OutputFormat::Csv,
            ..ScanConfig::default()
        };
        let targets = vec!["http://a/".to_string(), "http://b/".to_string()];
        let first = resolve_report_path(&config, &targets).expect("path").expect("enabled");
        assert!(first.ends_with("BATCH.csv"));
        std::fs::write(&first, "").expect("write");
        assert_eq!(unique_path(first.clone()).to_string_lossy(), format!("{}_2", first.display()));
    }

    #[test]
    fn test_reports_disabled() {
        let config = ScanConfig {
            autosave_report: false,
            ..ScanConfig::default()
        };
        assert_eq!(resolve_report_path(&config, &["http://a/".to_string()]).expect("ok"), None);
    }
}
