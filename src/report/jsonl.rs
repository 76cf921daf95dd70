//! JSONL (JSON Lines) report export, one result per line

use crate::error::Result;
use crate::report::{Report, ReportEntry};
use serde::Serialize;
use std::io::Write;
use std::path::Path;

#[derive(Serialize)]
struct Line<'a> {
    target: &'a str,
    #[serde(flatten)]
    entry: &'a ReportEntry,
}

/// Exports every accepted result as its own JSON object
pub fn export(reports: &[Report], output_path: &Path) -> Result<()> {
    let file = std::fs::File::create(output_path)?;
    let mut writer = std::io::BufWriter::new(file);

    for report in reports {
        for entry in &report.results {
            let line = serde_json::to_string(&Line {
                target: &report.target,
                entry,
            })?;
            writeln!(writer, "{}", line)?;
        }
    }

    writer.flush()?;
    Ok(())
}
