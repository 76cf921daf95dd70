//! Response filters deciding what counts as a finding

use crate::error::Result;
use crate::models::{ProbeResponse, ScanConfig};
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use tracing::debug;

/// A single filter. Every rule is a pure predicate; a response is valid
/// when all of them pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    ExcludedStatus,
    IncludedStatus,
    Blacklist,
    ExcludedSize,
    MinimumLength,
    MaximumLength,
    ExcludedText,
    ExcludedRegex,
    ExcludedRedirect,
}

/// Evaluation order; cheap status checks first
pub const RULES: [Rule; 9] = [
    Rule::ExcludedStatus,
    Rule::IncludedStatus,
    Rule::Blacklist,
    Rule::ExcludedSize,
    Rule::MinimumLength,
    Rule::MaximumLength,
    Rule::ExcludedText,
    Rule::ExcludedRegex,
    Rule::ExcludedRedirect,
];

/// Inclusion and exclusion rules compiled from the scan configuration
#[derive(Debug, Clone, Default)]
pub struct Validator {
    exclude_status_codes: BTreeSet<u16>,
    include_status_codes: BTreeSet<u16>,
    blacklists: BTreeMap<u16, HashSet<String>>,
    exclude_sizes: HashSet<String>,
    minimum_size: usize,
    maximum_size: usize,
    exclude_texts: Vec<String>,
    exclude_regex: Option<Regex>,
    exclude_redirect: Option<String>,
    exclude_redirect_regex: Option<Regex>,
}

impl Validator {
    pub fn from_config(config: &ScanConfig) -> Result<Self> {
        let exclude_regex = config
            .exclude_regex
            .as_deref()
            .map(Regex::new)
            .transpose()?;

        let exclude_redirect_regex = match config.exclude_redirect.as_deref() {
            Some(pattern) => match Regex::new(pattern) {
                Ok(re) => Some(re),
                Err(e) => {
                    debug!("Redirect exclusion {pattern:?} is not a regex ({e}), matching literally");
                    None
                }
            },
            None => None,
        };

        Ok(Self {
            exclude_status_codes: config.exclude_status_codes.clone(),
            include_status_codes: config.include_status_codes.clone(),
            blacklists: config
                .blacklists
                .iter()
                .map(|(status, paths)| (*status, paths.iter().cloned().collect()))
                .collect(),
            exclude_sizes: config
                .exclude_sizes
                .iter()
                .map(|s| normalize_size(s))
                .collect(),
            minimum_size: config.minimum_response_size,
            maximum_size: config.maximum_response_size,
            exclude_texts: config.exclude_texts.clone(),
            exclude_regex,
            exclude_redirect: config.exclude_redirect.clone(),
            exclude_redirect_regex,
        })
    }

    /// Whether `response` for dictionary entry `path` is a reportable finding
    pub fn is_valid(&self, path: &str, response: &ProbeResponse) -> bool {
        RULES.iter().all(|rule| self.passes(*rule, path, response))
    }

    /// Evaluates a single rule
    pub fn passes(&self, rule: Rule, path: &str, response: &ProbeResponse) -> bool {
        match rule {
            Rule::ExcludedStatus => !self.exclude_status_codes.contains(&response.status),
            Rule::IncludedStatus => {
                if self.include_status_codes.is_empty() {
                    (100..1000).contains(&response.status)
                } else {
                    self.include_status_codes.contains(&response.status)
                }
            }
            Rule::Blacklist => !self
                .blacklists
                .get(&response.status)
                .is_some_and(|paths| paths.contains(path)),
            Rule::ExcludedSize => !self.exclude_sizes.contains(&human_size(response.length)),
            Rule::MinimumLength => response.length >= self.minimum_size,
            // 0 disables the cap
            Rule::MaximumLength => self.maximum_size == 0 || response.length <= self.maximum_size,
            Rule::ExcludedText => !self
                .exclude_texts
                .iter()
                .any(|text| response.content.contains(text.as_str())),
            Rule::ExcludedRegex => !self
                .exclude_regex
                .as_ref()
                .is_some_and(|re| re.is_match(&response.content)),
            Rule::ExcludedRedirect => {
                let Some(ref excluded) = self.exclude_redirect else {
                    return true;
                };
                if !response.has_redirect() {
                    return true;
                }
                let literal = response.redirect.contains(excluded.as_str());
                let pattern = self
                    .exclude_redirect_regex
                    .as_ref()
                    .is_some_and(|re| re.is_match(&response.redirect));
                !(literal || pattern)
            }
        }
    }
}

/// Compact human readable size: `512B`, `4KB`, `12MB`
pub fn human_size(bytes: usize) -> String {
    let mut num = bytes as f64;
    for unit in ["B", "KB", "MB", "GB"] {
        if num < 1024.0 {
            return format!("{}{unit}", num.round() as u64);
        }
        num /= 1024.0;
    }
    format!("{}TB", num.round() as u64)
}

fn normalize_size(size: &str) -> String {
    size.split_whitespace().collect::<String>().to_uppercase()
}
