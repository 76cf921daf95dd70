//! Transport sessions used to probe a target

pub mod auth;
pub mod client;
pub use auth::AuthConfig;
pub use client::{HttpClient, HttpConnector};

use crate::error::Result;
use crate::models::{ProbeResponse, ScanConfig};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use url::Url;

/// Resolved components of a target URL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetUrl {
    pub scheme: String,
    pub host: String,
    pub port: u16,
    /// Path under the host without a leading slash, empty or ending in `/`
    pub base_path: String,
}

impl TargetUrl {
    /// Parses a target, applying `default_scheme` when the URL has none
    pub fn parse(raw: &str, default_scheme: &str) -> Result<Self> {
        let with_scheme = if raw.contains("://") {
            raw.to_string()
        } else {
            format!("{default_scheme}://{raw}")
        };
        let url = Url::parse(&with_scheme)?;
        let host = url
            .host_str()
            .ok_or(url::ParseError::EmptyHost)?
            .to_string();
        let port = url
            .port_or_known_default()
            .ok_or(url::ParseError::InvalidPort)?;

        let mut base_path = url.path().trim_start_matches('/').to_string();
        if !base_path.is_empty() && !base_path.ends_with('/') {
            base_path.push('/');
        }

        Ok(Self {
            scheme: url.scheme().to_string(),
            host,
            port,
            base_path,
        })
    }

    /// `scheme://host[:port]/`, the port only when it is not the scheme default
    pub fn base_url(&self) -> String {
        let default_port = match self.scheme.as_str() {
            "https" => 443,
            _ => 80,
        };
        if self.port == default_port {
            format!("{}://{}/", self.scheme, self.host)
        } else {
            format!("{}://{}:{}/", self.scheme, self.host, self.port)
        }
    }

    /// Base URL plus base path
    pub fn url(&self) -> String {
        format!("{}{}", self.base_url(), self.base_path)
    }

    /// Absolute URL for a path relative to the base path
    pub fn url_for(&self, path: &str) -> String {
        format!("{}{}", self.url(), path)
    }
}

/// An open session against one target
#[async_trait]
pub trait Requester: Send + Sync {
    fn target(&self) -> &TargetUrl;

    /// IP address connections are pinned to, if any
    fn ip(&self) -> Option<&str> {
        None
    }

    /// Probes `path`, relative to the target's base path
    async fn request(&self, path: &str) -> Result<ProbeResponse>;

    /// Sends `path` through the replay proxy, when one is configured
    async fn replay(&self, _path: &str) -> Result<()> {
        Ok(())
    }
}

/// Opens transport sessions for targets
#[async_trait]
pub trait Connector: Send + Sync {
    async fn open(&self, url: &str, config: &ScanConfig) -> Result<Arc<dyn Requester>>;
}
