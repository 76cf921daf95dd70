//! JSON report export

use crate::error::Result;
use crate::report::Report;
use chrono::Local;
use serde::Serialize;
use std::path::Path;

#[derive(Serialize)]
struct JsonReport<'a> {
    generated_at: String,
    reports: &'a [Report],
}

/// Exports all reports as a single JSON document
pub fn export(reports: &[Report], output_path: &Path) -> Result<()> {
    let document = JsonReport {
        generated_at: Local::now().to_rfc3339(),
        reports,
    };
    let json = serde_json::to_string_pretty(&document)?;
    std::fs::write(output_path, json)?;
    Ok(())
}
