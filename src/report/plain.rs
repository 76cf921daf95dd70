//! Plain text and simple (URL per line) report export

use crate::controller::validator::human_size;
use crate::error::Result;
use crate::report::Report;
use chrono::Local;
use std::io::Write;
use std::path::Path;

/// Exports results as aligned `STATUS SIZE URL` lines
pub fn export(reports: &[Report], output_path: &Path) -> Result<()> {
    let file = std::fs::File::create(output_path)?;
    let mut writer = std::io::BufWriter::new(file);

    writeln!(
        writer,
        "# dirhound report, {}",
        Local::now().format("%Y-%m-%d %H:%M:%S")
    )?;

    for report in reports {
        writeln!(writer)?;
        writeln!(writer, "# {}", report.target)?;
        for entry in &report.results {
            write!(
                writer,
                "{} {:>6}  {}",
                entry.status,
                human_size(entry.length),
                entry.url
            )?;
            if let Some(ref redirect) = entry.redirect {
                write!(writer, "    -> REDIRECTS TO: {redirect}")?;
            }
            writeln!(writer)?;
        }
    }

    writer.flush()?;
    Ok(())
}

/// Exports one URL per line
pub fn export_simple(reports: &[Report], output_path: &Path) -> Result<()> {
    let file = std::fs::File::create(output_path)?;
    let mut writer = std::io::BufWriter::new(file);

    for entry in reports.iter().flat_map(|r| &r.results) {
        writeln!(writer, "{}", entry.url)?;
    }

    writer.flush()?;
    Ok(())
}
