//! Decides which directories a finding adds to the scan

use crate::controller::queue::DirectoryQueue;
use crate::http::TargetUrl;
use crate::models::{ProbeResponse, ScanConfig};
use std::collections::BTreeSet;
use url::Url;

/// Recursion policy compiled from the scan configuration
#[derive(Debug, Clone, Default)]
pub struct RecursionPlanner {
    recursive: bool,
    deep: bool,
    force: bool,
    /// Maximum `/` count of a queued directory (0 = unlimited)
    max_depth: usize,
    status_codes: BTreeSet<u16>,
    exclude_subdirs: Vec<String>,
}

impl RecursionPlanner {
    pub fn from_config(config: &ScanConfig) -> Self {
        Self {
            recursive: config.recursive,
            deep: config.deep_recursive,
            force: config.force_recursive,
            max_depth: config.recursion_depth,
            status_codes: config.recursion_status_codes.clone(),
            exclude_subdirs: config
                .exclude_subdirs
                .iter()
                .filter(|d| !d.is_empty())
                .cloned()
                .collect(),
        }
    }

    /// Whether a response with `status` is considered for recursion at all
    pub fn triggers(&self, status: u16) -> bool {
        (self.recursive || self.deep || self.force) && self.status_codes.contains(&status)
    }

    /// Queues the directories implied by a finding; returns the number added
    pub fn plan(
        &self,
        queue: &mut DirectoryQueue,
        target: &TargetUrl,
        current_directory: &str,
        path: &str,
        response: &ProbeResponse,
    ) -> usize {
        if response.has_redirect() {
            match self.redirect_path(target, current_directory, response) {
                Some(path) => self.enqueue(queue, self.candidates(current_directory, &path)),
                None => 0,
            }
        } else {
            self.enqueue(queue, self.candidates(current_directory, path))
        }
    }

    /// Directories a match on `path` (relative to `current_directory`) implies
    pub fn candidates(&self, current_directory: &str, path: &str) -> Vec<String> {
        let path = path.split('?').next().unwrap_or_default();
        let path = path.split('#').next().unwrap_or_default();

        if self
            .exclude_subdirs
            .iter()
            .any(|excluded| path.starts_with(excluded.as_str()))
        {
            return Vec::new();
        }

        let mut path = path.to_string();
        if self.force && !path.ends_with('/') {
            path.push('/');
        }

        if self.deep {
            path.match_indices('/')
                .map(|(i, _)| format!("{current_directory}{}", &path[..=i]))
                .collect()
        } else if (self.recursive || self.force) && path.ends_with('/') {
            vec![format!("{current_directory}{path}")]
        } else {
            Vec::new()
        }
    }

    /// Path relative to the scanned prefix when `response` redirects to its own
    /// slash-terminated form, the only redirect treated as a directory signal
    pub fn redirect_path(
        &self,
        target: &TargetUrl,
        current_directory: &str,
        response: &ProbeResponse,
    ) -> Option<String> {
        let requested = Url::parse(&target.base_url())
            .ok()?
            .join(response.path.trim_start_matches('/'))
            .ok()?;
        let resolved = requested.join(&response.redirect).ok()?;
        let redirect_path = resolved.path();

        if redirect_path != format!("{}/", response.path) {
            return None;
        }

        let scanned = 1 + target.base_path.len() + current_directory.len();
        redirect_path.get(scanned..).map(str::to_string)
    }

    fn within_depth(&self, directory: &str) -> bool {
        self.max_depth == 0 || directory.matches('/').count() <= self.max_depth
    }

    fn enqueue(&self, queue: &mut DirectoryQueue, candidates: Vec<String>) -> usize {
        let mut added = 0;
        for dir in candidates {
            if queue.has_passed(&dir) || !self.within_depth(&dir) {
                continue;
            }
            if queue.enqueue(&dir) {
                added += 1;
            }
        }
        added
    }
}
