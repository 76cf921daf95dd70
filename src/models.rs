//! Core data models for dirhound

use crate::http::AuthConfig;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

/// Report file format
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Plain,
    Simple,
    Json,
    Jsonl,
    Csv,
}

impl OutputFormat {
    /// File extension used when the report path is derived automatically
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Plain | OutputFormat::Simple => ".txt",
            OutputFormat::Json => ".json",
            OutputFormat::Jsonl => ".jsonl",
            OutputFormat::Csv => ".csv",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Plain => write!(f, "plain"),
            OutputFormat::Simple => write!(f, "simple"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Jsonl => write!(f, "jsonl"),
            OutputFormat::Csv => write!(f, "csv"),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "plain" => Ok(OutputFormat::Plain),
            "simple" => Ok(OutputFormat::Simple),
            "json" => Ok(OutputFormat::Json),
            "jsonl" => Ok(OutputFormat::Jsonl),
            "csv" => Ok(OutputFormat::Csv),
            other => Err(format!(
                "unknown output format '{other}' (plain, simple, json, jsonl, csv)"
            )),
        }
    }
}

/// Outcome of a single probe
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeResponse {
    /// Absolute URL path that was requested, with its leading slash
    pub path: String,
    /// HTTP status code
    pub status: u16,
    /// Body length in bytes
    pub length: usize,
    /// Response body
    pub content: String,
    /// Raw `Location` header, empty when the response is not a redirect
    pub redirect: String,
}

impl ProbeResponse {
    pub fn has_redirect(&self) -> bool {
        !self.redirect.is_empty()
    }
}

/// Configuration for a scan, persisted verbatim in session files
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Base URLs to scan, in order
    pub urls: Vec<String>,
    /// Wordlist files
    pub wordlists: Vec<String>,
    /// Extensions substituted for `%EXT%` in wordlist entries
    pub extensions: Vec<String>,
    /// Number of concurrent probe workers
    pub threads: usize,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Retries per request on connection failure
    pub max_retries: u32,
    /// HTTP method used for every probe
    pub http_method: String,
    /// Request body
    pub data: Option<String>,
    /// Extra request headers, merged over the defaults
    pub headers: BTreeMap<String, String>,
    pub user_agent: Option<String>,
    pub cookie: Option<String>,
    /// User agents rotated per request (loaded from `random_agents_file`)
    pub random_agents: Vec<String>,
    /// Scheme applied to targets given without one
    pub scheme: String,
    /// Connect to this IP address instead of resolving the target host
    pub ip: Option<String>,
    /// HTTP/SOCKS proxy URL
    pub proxy: Option<String>,
    /// Proxy that accepted results are replayed through
    pub replay_proxy: Option<String>,
    pub follow_redirects: bool,
    /// Authentication applied to every target session
    pub auth: AuthConfig,
    /// Delay in seconds each worker waits before a request
    pub delay_secs: f64,
    /// Maximum requests per second across all workers (0 = unlimited)
    pub max_rate: u32,
    /// Maximum scan runtime in seconds (0 = unlimited)
    pub max_time_secs: u64,
    pub exit_on_error: bool,
    /// Status codes that abandon the current target
    pub skip_on_status: BTreeSet<u16>,
    /// Status codes to report (empty = all)
    pub include_status_codes: BTreeSet<u16>,
    pub exclude_status_codes: BTreeSet<u16>,
    /// Human readable sizes to exclude, e.g. `0B` or `4KB`
    pub exclude_sizes: Vec<String>,
    pub minimum_response_size: usize,
    /// Maximum response size (0 = unlimited)
    pub maximum_response_size: usize,
    pub exclude_texts: Vec<String>,
    pub exclude_regex: Option<String>,
    pub exclude_redirect: Option<String>,
    /// Path whose response marks other responses as not found
    pub exclude_response: Option<String>,
    /// Blacklist file per status code
    pub blacklist_files: BTreeMap<u16, String>,
    /// Paths ignored for a given status code, expanded from `blacklist_files`
    pub blacklists: BTreeMap<u16, Vec<String>>,
    pub recursive: bool,
    pub deep_recursive: bool,
    pub force_recursive: bool,
    /// Maximum `/` count of a recursed directory (0 = unlimited)
    pub recursion_depth: usize,
    /// Status codes that trigger recursion
    pub recursion_status_codes: BTreeSet<u16>,
    /// Subdirectory prefixes never recursed into
    pub exclude_subdirs: Vec<String>,
    /// Directories scanned first for every target
    pub scan_subdirs: Vec<String>,
    /// Print full URLs in status lines
    pub full_url: bool,
    pub output_file: Option<String>,
    pub output_format: OutputFormat,
    /// Save reports under `output_location` automatically
    pub autosave_report: bool,
    pub output_location: Option<String>,
    pub log_file: Option<String>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            urls: Vec::new(),
            wordlists: Vec::new(),
            extensions: Vec::new(),
            threads: 25,
            timeout_secs: 10,
            max_retries: 1,
            http_method: "GET".to_string(),
            data: None,
            headers: BTreeMap::new(),
            user_agent: None,
            cookie: None,
            random_agents: Vec::new(),
            scheme: "http".to_string(),
            ip: None,
            proxy: None,
            replay_proxy: None,
            follow_redirects: false,
            auth: AuthConfig::None,
            delay_secs: 0.0,
            max_rate: 0,
            max_time_secs: 0,
            exit_on_error: false,
            skip_on_status: BTreeSet::new(),
            include_status_codes: BTreeSet::new(),
            exclude_status_codes: BTreeSet::new(),
            exclude_sizes: Vec::new(),
            minimum_response_size: 0,
            maximum_response_size: 0,
            exclude_texts: Vec::new(),
            exclude_regex: None,
            exclude_redirect: None,
            exclude_response: None,
            blacklist_files: BTreeMap::new(),
            blacklists: BTreeMap::new(),
            recursive: false,
            deep_recursive: false,
            force_recursive: false,
            recursion_depth: 0,
            recursion_status_codes: (100..1000).collect(),
            exclude_subdirs: Vec::new(),
            scan_subdirs: vec![String::new()],
            full_url: false,
            output_file: None,
            output_format: OutputFormat::Plain,
            autosave_report: true,
            output_location: None,
            log_file: None,
        }
    }
}
