//! Configuration management for dirhound

use crate::dictionary;
use crate::error::{DirhoundError, Result};
use crate::http::AuthConfig;
use crate::models::{OutputFormat, ScanConfig};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// File-based configuration structure matching `config/default.toml`
#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    scan: Option<ScanSection>,
    connection: Option<ConnectionSection>,
    filters: Option<FiltersSection>,
    recursion: Option<RecursionSection>,
    output: Option<OutputSection>,
}

#[derive(Debug, Deserialize)]
struct ScanSection {
    wordlists: Option<Vec<String>>,
    extensions: Option<Vec<String>>,
    threads: Option<usize>,
    http_method: Option<String>,
    delay_secs: Option<f64>,
    max_rate: Option<u32>,
    max_time_secs: Option<u64>,
    exit_on_error: Option<bool>,
    scan_subdirs: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct ConnectionSection {
    timeout_secs: Option<u64>,
    max_retries: Option<u32>,
    scheme: Option<String>,
    user_agent: Option<String>,
    cookie: Option<String>,
    follow_redirects: Option<bool>,
    proxy: Option<String>,
    replay_proxy: Option<String>,
    ip: Option<String>,
    random_agents_file: Option<String>,
    headers: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Deserialize)]
struct FiltersSection {
    include_status: Option<String>,
    exclude_status: Option<String>,
    skip_on_status: Option<String>,
    exclude_sizes: Option<Vec<String>>,
    minimum_response_size: Option<usize>,
    maximum_response_size: Option<usize>,
    exclude_texts: Option<Vec<String>>,
    exclude_regex: Option<String>,
    exclude_redirect: Option<String>,
    exclude_response: Option<String>,
    /// Status code to blacklist file
    blacklists: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Deserialize)]
struct RecursionSection {
    recursive: Option<bool>,
    deep: Option<bool>,
    force: Option<bool>,
    depth: Option<usize>,
    status_codes: Option<String>,
    exclude_subdirs: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct OutputSection {
    format: Option<String>,
    file: Option<String>,
    location: Option<String>,
    autosave: Option<bool>,
    log_file: Option<String>,
    full_url: Option<bool>,
}

/// Values given on the command line; `None` keeps the configured value
#[derive(Debug, Default, Clone)]
pub struct CliOverrides {
    pub urls: Vec<String>,
    pub wordlists: Vec<String>,
    pub extensions: Option<Vec<String>>,
    pub threads: Option<usize>,
    pub timeout_secs: Option<u64>,
    pub max_retries: Option<u32>,
    pub http_method: Option<String>,
    pub data: Option<String>,
    pub headers: Vec<String>,
    pub user_agent: Option<String>,
    pub cookie: Option<String>,
    pub random_agents_file: Option<String>,
    pub proxy: Option<String>,
    pub replay_proxy: Option<String>,
    pub ip: Option<String>,
    pub follow_redirects: bool,
    pub auth: Option<AuthConfig>,
    pub delay_secs: Option<f64>,
    pub max_rate: Option<u32>,
    pub max_time_secs: Option<u64>,
    pub exit_on_error: bool,
    pub include_status: Option<String>,
    pub exclude_status: Option<String>,
    pub skip_on_status: Option<String>,
    pub exclude_sizes: Option<Vec<String>>,
    pub minimum_response_size: Option<usize>,
    pub maximum_response_size: Option<usize>,
    pub exclude_texts: Option<Vec<String>>,
    pub exclude_regex: Option<String>,
    pub exclude_redirect: Option<String>,
    pub exclude_response: Option<String>,
    pub recursive: bool,
    pub deep_recursive: bool,
    pub force_recursive: bool,
    pub recursion_depth: Option<usize>,
    pub recursion_status: Option<String>,
    pub exclude_subdirs: Option<Vec<String>>,
    pub scan_subdirs: Option<Vec<String>>,
    pub full_url: bool,
    pub output_file: Option<String>,
    pub output_format: Option<OutputFormat>,
    pub output_location: Option<String>,
    pub no_autosave: bool,
    pub log_file: Option<String>,
}

/// Loads configuration from a TOML file and merges with defaults
pub fn load_config(path: &Path) -> Result<ScanConfig> {
    let content = std::fs::read_to_string(path).map_err(DirhoundError::IoError)?;
    let file_config: FileConfig = toml::from_str(&content)?;
    let mut config = ScanConfig::default();

    if let Some(scan) = file_config.scan {
        set(&mut config.wordlists, scan.wordlists);
        set(&mut config.extensions, scan.extensions);
        set(&mut config.threads, scan.threads);
        set(&mut config.http_method, scan.http_method);
        set(&mut config.delay_secs, scan.delay_secs);
        set(&mut config.max_rate, scan.max_rate);
        set(&mut config.max_time_secs, scan.max_time_secs);
        set(&mut config.exit_on_error, scan.exit_on_error);
        set(&mut config.scan_subdirs, scan.scan_subdirs.map(normalize_subdirs));
    }

    if let Some(conn) = file_config.connection {
        set(&mut config.timeout_secs, conn.timeout_secs);
        set(&mut config.max_retries, conn.max_retries);
        set(&mut config.scheme, conn.scheme);
        set(&mut config.follow_redirects, conn.follow_redirects);
        config.user_agent = conn.user_agent.or(config.user_agent);
        config.cookie = conn.cookie.or(config.cookie);
        config.proxy = conn.proxy.or(config.proxy);
        config.replay_proxy = conn.replay_proxy.or(config.replay_proxy);
        config.ip = conn.ip.or(config.ip);
        if let Some(headers) = conn.headers {
            config.headers.extend(headers);
        }
        if let Some(file) = conn.random_agents_file {
            config.random_agents = read_lines(Path::new(&file))?;
        }
    }

    if let Some(filters) = file_config.filters {
        if let Some(codes) = filters.include_status {
            config.include_status_codes = parse_status_codes(&codes)?;
        }
        if let Some(codes) = filters.exclude_status {
            config.exclude_status_codes = parse_status_codes(&codes)?;
        }
        if let Some(codes) = filters.skip_on_status {
            config.skip_on_status = parse_status_codes(&codes)?;
        }
        set(&mut config.exclude_sizes, filters.exclude_sizes);
        set(&mut config.minimum_response_size, filters.minimum_response_size);
        set(&mut config.maximum_response_size, filters.maximum_response_size);
        set(&mut config.exclude_texts, filters.exclude_texts);
        config.exclude_regex = filters.exclude_regex.or(config.exclude_regex);
        config.exclude_redirect = filters.exclude_redirect.or(config.exclude_redirect);
        config.exclude_response = filters.exclude_response.or(config.exclude_response);
        if let Some(files) = filters.blacklists {
            for (status, file) in files {
                let status: u16 = status.trim().parse().map_err(|_| {
                    DirhoundError::ConfigError(format!("Invalid blacklist status code: {status}"))
                })?;
                config.blacklist_files.insert(status, file);
            }
        }
    }

    if let Some(recursion) = file_config.recursion {
        set(&mut config.recursive, recursion.recursive);
        set(&mut config.deep_recursive, recursion.deep);
        set(&mut config.force_recursive, recursion.force);
        set(&mut config.recursion_depth, recursion.depth);
        set(&mut config.exclude_subdirs, recursion.exclude_subdirs);
        if let Some(codes) = recursion.status_codes {
            config.recursion_status_codes = parse_status_codes(&codes)?;
        }
    }

    if let Some(output) = file_config.output {
        if let Some(format) = output.format {
            config.output_format = format.parse().map_err(DirhoundError::ConfigError)?;
        }
        config.output_file = output.file.or(config.output_file);
        config.output_location = output.location.or(config.output_location);
        config.log_file = output.log_file.or(config.log_file);
        set(&mut config.autosave_report, output.autosave);
        set(&mut config.full_url, output.full_url);
    }

    load_blacklists(&mut config)?;
    Ok(config)
}

/// Merges CLI arguments into an existing ScanConfig
pub fn merge_cli_args(config: &mut ScanConfig, cli: CliOverrides) -> Result<()> {
    config.urls = cli.urls;
    if !cli.wordlists.is_empty() {
        config.wordlists = cli.wordlists;
    }

    set(&mut config.extensions, cli.extensions);
    set(&mut config.threads, cli.threads);
    set(&mut config.timeout_secs, cli.timeout_secs);
    set(&mut config.max_retries, cli.max_retries);
    set(&mut config.http_method, cli.http_method);
    set(&mut config.delay_secs, cli.delay_secs);
    set(&mut config.max_rate, cli.max_rate);
    set(&mut config.max_time_secs, cli.max_time_secs);
    set(&mut config.minimum_response_size, cli.minimum_response_size);
    set(&mut config.maximum_response_size, cli.maximum_response_size);
    set(&mut config.exclude_sizes, cli.exclude_sizes);
    set(&mut config.exclude_texts, cli.exclude_texts);
    set(&mut config.recursion_depth, cli.recursion_depth);
    set(&mut config.exclude_subdirs, cli.exclude_subdirs);
    set(&mut config.scan_subdirs, cli.scan_subdirs.map(normalize_subdirs));
    set(&mut config.output_format, cli.output_format);
    set(&mut config.auth, cli.auth);

    config.data = cli.data.or(config.data.take());
    config.user_agent = cli.user_agent.or(config.user_agent.take());
    config.cookie = cli.cookie.or(config.cookie.take());
    config.proxy = cli.proxy.or(config.proxy.take());
    config.replay_proxy = cli.replay_proxy.or(config.replay_proxy.take());
    config.ip = cli.ip.or(config.ip.take());
    config.exclude_regex = cli.exclude_regex.or(config.exclude_regex.take());
    config.exclude_redirect = cli.exclude_redirect.or(config.exclude_redirect.take());
    config.exclude_response = cli.exclude_response.or(config.exclude_response.take());
    config.output_file = cli.output_file.or(config.output_file.take());
    config.output_location = cli.output_location.or(config.output_location.take());
    config.log_file = cli.log_file.or(config.log_file.take());

    config.follow_redirects |= cli.follow_redirects;
    config.exit_on_error |= cli.exit_on_error;
    config.recursive |= cli.recursive;
    config.deep_recursive |= cli.deep_recursive;
    config.force_recursive |= cli.force_recursive;
    config.full_url |= cli.full_url;
    if cli.no_autosave {
        config.autosave_report = false;
    }

    if let Some(codes) = cli.include_status {
        config.include_status_codes = parse_status_codes(&codes)?;
    }
    if let Some(codes) = cli.exclude_status {
        config.exclude_status_codes = parse_status_codes(&codes)?;
    }
    if let Some(codes) = cli.skip_on_status {
        config.skip_on_status = parse_status_codes(&codes)?;
    }
    if let Some(codes) = cli.recursion_status {
        config.recursion_status_codes = parse_status_codes(&codes)?;
    }

    for header in cli.headers {
        let Some((key, value)) = header.split_once(':') else {
            return Err(DirhoundError::ConfigError(format!(
                "Invalid header \"{header}\", expected \"Key: Value\""
            )));
        };
        config
            .headers
            .insert(key.trim().to_string(), value.trim().to_string());
    }

    if let Some(file) = cli.random_agents_file {
        config.random_agents = read_lines(Path::new(&file))?;
    }

    // %EXT% in blacklists follows the final extension set
    load_blacklists(config)
}

fn load_blacklists(config: &mut ScanConfig) -> Result<()> {
    config.blacklists = dictionary::load_blacklists(&config.blacklist_files, &config.extensions)?;
    Ok(())
}

/// Checks that the configuration can drive a scan
pub fn validate(config: &ScanConfig) -> Result<()> {
    if config.urls.is_empty() {
        return Err(DirhoundError::ConfigError("No target URL given".to_string()));
    }
    if config.wordlists.is_empty() {
        return Err(DirhoundError::ConfigError("No wordlist given".to_string()));
    }
    if config.threads == 0 {
        return Err(DirhoundError::ConfigError(
            "Thread count must be at least 1".to_string(),
        ));
    }
    Ok(())
}

/// Parses `200,301-303` style status code lists
pub fn parse_status_codes(raw: &str) -> Result<BTreeSet<u16>> {
    let invalid = || DirhoundError::ConfigError(format!("Invalid status code list: {raw}"));
    let mut codes = BTreeSet::new();

    for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        match part.split_once('-') {
            Some((start, end)) => {
                let start: u16 = start.trim().parse().map_err(|_| invalid())?;
                let end: u16 = end.trim().parse().map_err(|_| invalid())?;
                if start > end {
                    return Err(invalid());
                }
                codes.extend(start..=end);
            }
            None => {
                codes.insert(part.parse().map_err(|_| invalid())?);
            }
        }
    }

    Ok(codes)
}

/// Creates `path` and its parents, failing if it is not a writable directory
pub fn ensure_directory(path: &Path) -> Result<()> {
    if path.as_os_str().is_empty() {
        return Ok(());
    }
    if path.exists() && !path.is_dir() {
        return Err(DirhoundError::Filesystem(format!(
            "{} is a file, should be a directory",
            path.display()
        )));
    }

    std::fs::create_dir_all(path).map_err(|e| {
        DirhoundError::Filesystem(format!("Couldn't create directory {}: {e}", path.display()))
    })?;

    let probe = path.join(".dirhound-write-check");
    std::fs::write(&probe, b"")
        .and_then(|_| std::fs::remove_file(&probe))
        .map_err(|_| {
            DirhoundError::Filesystem(format!("Directory {} is not writable", path.display()))
        })
}

/// Subdirectories always end in `/`, the root is the empty string
fn normalize_subdirs(dirs: Vec<String>) -> Vec<String> {
    dirs.into_iter()
        .map(|d| {
            let d = d.trim().trim_start_matches('/');
            if d.is_empty() || d.ends_with('/') {
                d.to_string()
            } else {
                format!("{d}/")
            }
        })
        .collect()
}

fn read_lines(path: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        DirhoundError::ConfigError(format!("Cannot read {}: {e}", path.display()))
    })?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect())
}

fn set<T>(field: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *field = value;
    }
}
