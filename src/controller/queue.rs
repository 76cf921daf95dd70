//! Per-target directory queue and the set of directories ever queued

use std::collections::{HashSet, VecDeque};

/// Directories waiting for a probe round, deduplicated by the pass set
#[derive(Debug, Default, Clone)]
pub struct DirectoryQueue {
    pending: VecDeque<String>,
    /// Every directory queued for the current target, in queueing order
    passed: Vec<String>,
    passed_index: HashSet<String>,
}

impl DirectoryQueue {
    /// Rebuilds a queue from a session snapshot
    pub fn restore(pending: Vec<String>, passed: Vec<String>) -> Self {
        let passed_index = passed.iter().cloned().collect();
        Self {
            pending: pending.into(),
            passed,
            passed_index,
        }
    }

    /// Queues the initial directories of a target and records them as passed
    pub fn seed(&mut self, directories: &[String]) {
        for directory in directories {
            self.pending.push_back(directory.clone());
            self.mark_passed(directory);
        }
    }

    /// Queues `directory` unless it was ever queued before
    pub fn enqueue(&mut self, directory: &str) -> bool {
        if self.passed_index.contains(directory) {
            return false;
        }
        self.mark_passed(directory);
        self.pending.push_back(directory.to_string());
        true
    }

    pub fn has_passed(&self, directory: &str) -> bool {
        self.passed_index.contains(directory)
    }

    pub fn pop(&mut self) -> Option<String> {
        self.pending.pop_front()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Discards pending directories, returning how many were dropped
    pub fn discard_pending(&mut self) -> usize {
        let dropped = self.pending.len();
        self.pending.clear();
        dropped
    }

    /// Starts over for a new target
    pub fn reset(&mut self) {
        self.pending.clear();
        self.passed.clear();
        self.passed_index.clear();
    }

    pub fn pending(&self) -> Vec<String> {
        self.pending.iter().cloned().collect()
    }

    pub fn passed(&self) -> &[String] {
        &self.passed
    }

    fn mark_passed(&mut self, directory: &str) {
        if self.passed_index.insert(directory.to_string()) {
            self.passed.push(directory.to_string());
        }
    }
}
