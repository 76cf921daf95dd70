//! Operator-facing terminal output
//!
//! Status lines and warnings are printed above a live progress line. Lines
//! printed with `save` are kept so a resumed session can replay what the
//! operator saw before pausing.

use crate::controller::validator::human_size;
use crate::models::{ProbeResponse, ScanConfig};
use crate::report::Report;
use chrono::Local;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::collections::BTreeMap;
use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, RwLock};
use tabled::builder::Builder;
use tabled::settings::Style;

pub const BANNER: &str = r#"
     _ _      _                           _
  __| (_)_ __| |__   ___  _   _ _ __   __| |
 / _` | | '__| '_ \ / _ \| | | | '_ \ / _` |
| (_| | | |  | | | | (_) | |_| | | | | (_| |
 \__,_|_|_|  |_| |_|\___/ \__,_|_| |_|\__,_|  v0.1.0
"#;

/// Terminal output shared by the controller and result callbacks
pub struct Output {
    progress: ProgressBar,
    history: Mutex<Vec<String>>,
    target_url: RwLock<String>,
    errors: AtomicU64,
}

impl Output {
    pub fn new() -> Self {
        Self::with_progress(ProgressBar::with_draw_target(None, ProgressDrawTarget::stderr()))
    }

    /// Output that draws nothing, for tests and non-interactive runs
    pub fn hidden() -> Self {
        Self::with_progress(ProgressBar::hidden())
    }

    fn with_progress(progress: ProgressBar) -> Self {
        progress.set_style(
            ProgressStyle::default_spinner()
                .template("{msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        Self {
            progress,
            history: Mutex::new(Vec::new()),
            target_url: RwLock::new(String::new()),
            errors: AtomicU64::new(0),
        }
    }

    pub fn header(&self, banner: &str) {
        self.print(banner.cyan().to_string(), false);
    }

    /// Echoes the effective configuration
    pub fn config(&self, config: &ScanConfig, wordlist_size: usize) {
        let extensions = if config.extensions.is_empty() {
            "-".to_string()
        } else {
            config.extensions.join(", ")
        };
        let line = format!(
            "{} {} | {} {} | {} {} | {} {}",
            "Extensions:".bold(),
            extensions.cyan(),
            "HTTP method:".bold(),
            config.http_method.to_uppercase().cyan(),
            "Threads:".bold(),
            config.threads.to_string().cyan(),
            "Wordlist size:".bold(),
            wordlist_size.to_string().cyan(),
        );
        self.print(line, false);
    }

    pub fn set_target(&self, url: &str) {
        self.set_target_url(url);
        self.print(format!("\n{} {}\n", "Target:".bold(), url.green()), true);
    }

    /// Base used for full URLs in status lines, without a trailing slash
    pub fn set_target_url(&self, url: &str) {
        let mut target = self.target_url.write().unwrap_or_else(|e| e.into_inner());
        *target = url.trim_end_matches('/').to_string();
    }

    pub fn output_file(&self, path: &str) {
        self.print(format!("{} {}", "Output file:".bold(), path.green()), false);
    }

    pub fn log_file(&self, path: &str) {
        self.print(format!("{} {}", "Log file:".bold(), path.green()), false);
    }

    pub fn warning(&self, message: &str, save: bool) {
        self.print(message.yellow().bold().to_string(), save);
    }

    pub fn error(&self, message: &str) {
        self.print(message.white().on_red().bold().to_string(), true);
    }

    /// One line per accepted result
    pub fn status_report(&self, response: &ProbeResponse, full_url: bool, added_to_queue: bool) {
        let shown_path = if full_url {
            let base = self.target_url.read().unwrap_or_else(|e| e.into_inner());
            let origin = base
                .find("://")
                .and_then(|i| base[i + 3..].find('/').map(|j| &base[..i + 3 + j]))
                .unwrap_or(base.as_str());
            format!("{origin}{}", response.path)
        } else {
            response.path.clone()
        };

        let mut line = format!(
            "[{}] {} - {:>6} - {}",
            Local::now().format("%H:%M:%S"),
            response.status,
            human_size(response.length),
            shown_path
        );
        if response.has_redirect() {
            line.push_str(&format!("  ->  {}", response.redirect));
        }
        if added_to_queue {
            line.push_str("     (Added to queue)");
        }

        let colored = match response.status {
            200..=299 => line.green().to_string(),
            401 | 403 => line.blue().to_string(),
            300..=399 => line.cyan().to_string(),
            500..=599 => line.red().to_string(),
            _ => line.magenta().to_string(),
        };
        self.print(colored, true);
    }

    /// Accepted results of a finished target, counted by status
    pub fn summary(&self, report: &Report) {
        let mut counts: BTreeMap<u16, usize> = BTreeMap::new();
        for entry in &report.results {
            *counts.entry(entry.status).or_default() += 1;
        }

        let mut builder = Builder::default();
        builder.push_record(["Status", "Count"]);
        for (status, count) in &counts {
            builder.push_record([status.to_string(), count.to_string()]);
        }
        builder.push_record(["Total".to_string(), report.results.len().to_string()]);

        let mut table = builder.build();
        table.with(Style::rounded());
        self.print(
            format!("\n{} {}\n{table}", "Summary for".bold(), report.target.green()),
            false,
        );
    }

    /// Refreshes the progress line
    pub fn last_path(&self, index: usize, total: usize, job: usize, jobs: usize, rate: u64) {
        let percent = if total == 0 {
            100.0
        } else {
            index as f64 * 100.0 / total as f64
        };
        self.progress.set_message(format!(
            "{percent:>5.1}% {index}/{total}  job:{job}/{jobs}  errors:{}  {rate}/s",
            self.errors.load(Ordering::Relaxed)
        ));
        self.progress.tick();
    }

    pub fn add_connection_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    /// Prints a prompt without a trailing newline
    pub fn in_line(&self, message: &str) {
        self.progress.suspend(|| {
            print!("{message}");
            let _ = std::io::stdout().flush();
        });
    }

    /// Saved lines, replayed verbatim when a session resumes
    pub fn export(&self) -> String {
        let history = self.history.lock().unwrap_or_else(|e| e.into_inner());
        history.join("\n")
    }

    /// Prints the output of a previous run and keeps it for the next export
    pub fn replay(&self, last_output: &str) {
        if !last_output.is_empty() {
            self.print(last_output.to_string(), true);
        }
    }

    pub fn finish(&self) {
        self.progress.finish_and_clear();
    }

    fn print(&self, line: String, save: bool) {
        if save {
            let mut history = self.history.lock().unwrap_or_else(|e| e.into_inner());
            history.push(line.clone());
        }
        if self.progress.is_hidden() {
            return;
        }
        self.progress.suspend(|| println!("{line}"));
    }
}

impl Default for Output {
    fn default() -> Self {
        Self::new()
    }
}
