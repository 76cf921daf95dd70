//! dirhound - concurrent web path discovery
//!
//! Probes one or more targets with a wordlist, reports what exists,
//! recursively scans discovered directories and can pause a scan to a
//! session file and resume it later from the same dictionary position.

pub mod audit;
pub mod config;
pub mod controller;
pub mod dictionary;
pub mod error;
pub mod fuzzer;
pub mod http;
pub mod models;
pub mod output;
pub mod report;
pub mod session;
