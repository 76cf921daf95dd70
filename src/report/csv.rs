//! CSV report export (RFC 4180 compliant)

use crate::error::Result;
use crate::report::Report;
use std::io::Write;
use std::path::Path;

/// Escapes a field for CSV according to RFC 4180
fn escape_csv(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') || field.contains('\r') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Exports all accepted results as a CSV file
pub fn export(reports: &[Report], output_path: &Path) -> Result<()> {
    let file = std::fs::File::create(output_path)?;
    let mut writer = std::io::BufWriter::new(file);

    writeln!(writer, "url,status,length,redirect")?;

    for report in reports {
        for entry in &report.results {
            writeln!(
                writer,
                "{},{},{},{}",
                escape_csv(&entry.url),
                entry.status,
                entry.length,
                escape_csv(entry.redirect.as_deref().unwrap_or("")),
            )?;
        }
    }

    writer.flush()?;
    Ok(())
}
