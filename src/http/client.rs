//! reqwest-backed transport session with retries and request tracking

use crate::error::{DirhoundError, Result};
use crate::http::{Connector, Requester, TargetUrl};
use crate::models::{ProbeResponse, ScanConfig};
use async_trait::async_trait;
use rand::seq::IndexedRandom;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, LOCATION, USER_AGENT};
use reqwest::{Client, Method};
use std::collections::BTreeMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Headers sent with every request unless overridden
pub const DEFAULT_HEADERS: &[(&str, &str)] = &[
    ("User-Agent", "Mozilla/5.0 (compatible; dirhound/0.1.0)"),
    ("Accept", "*/*"),
    ("Accept-Language", "*"),
    ("Cache-Control", "max-age=0"),
];

/// HTTP session bound to one target
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    replay_client: Option<Client>,
    target: TargetUrl,
    method: Method,
    data: Option<String>,
    ip: Option<String>,
    max_retries: u32,
    random_agents: Arc<Vec<String>>,
}

impl HttpClient {
    /// Opens a session for `url` using the scan configuration
    pub fn open(url: &str, config: &ScanConfig) -> Result<Self> {
        let target = TargetUrl::parse(url, &config.scheme)?;
        let headers = header_map(&merged_headers(config))?;

        let mut builder = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(headers.clone())
            .pool_max_idle_per_host(config.threads)
            .redirect(if config.follow_redirects {
                reqwest::redirect::Policy::limited(10)
            } else {
                reqwest::redirect::Policy::none()
            })
            .cookie_store(true)
            .danger_accept_invalid_certs(true);

        if let Some(ref proxy_url) = config.proxy {
            let proxy = reqwest::Proxy::all(proxy_url)
                .map_err(|e| DirhoundError::ConfigError(format!("Invalid proxy URL: {e}")))?;
            builder = builder.proxy(proxy);
        }

        if let Some(ref ip) = config.ip {
            let addr: IpAddr = ip
                .parse()
                .map_err(|_| DirhoundError::ConfigError(format!("Invalid IP address: {ip}")))?;
            builder = builder.resolve(&target.host, SocketAddr::new(addr, target.port));
        }

        let client = builder.build()?;

        let replay_client = match config.replay_proxy {
            Some(ref proxy_url) => {
                let proxy = reqwest::Proxy::all(proxy_url).map_err(|e| {
                    DirhoundError::ConfigError(format!("Invalid replay proxy URL: {e}"))
                })?;
                Some(
                    Client::builder()
                        .timeout(Duration::from_secs(config.timeout_secs))
                        .default_headers(headers)
                        .redirect(reqwest::redirect::Policy::none())
                        .danger_accept_invalid_certs(true)
                        .proxy(proxy)
                        .build()?,
                )
            }
            None => None,
        };

        let method = Method::from_bytes(config.http_method.to_uppercase().as_bytes())
            .map_err(|_| {
                DirhoundError::ConfigError(format!("Invalid HTTP method: {}", config.http_method))
            })?;

        Ok(Self {
            client,
            replay_client,
            target,
            method,
            data: config.data.clone(),
            ip: config.ip.clone(),
            max_retries: config.max_retries,
            random_agents: Arc::new(config.random_agents.clone()),
        })
    }

    fn build(&self, client: &Client, url: &str) -> reqwest::RequestBuilder {
        let mut req = client.request(self.method.clone(), url);
        if let Some(agent) = self.random_agents.choose(&mut rand::rng()) {
            req = req.header(USER_AGENT, agent.as_str());
        }
        if let Some(ref data) = self.data {
            req = req.body(data.clone());
        }
        req
    }

    async fn send_with_retry(&self, url: &str) -> Result<reqwest::Response> {
        const INITIAL_BACKOFF_MS: u64 = 250;
        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let backoff = Duration::from_millis(INITIAL_BACKOFF_MS * 2u64.pow(attempt - 1));
                debug!("Retry attempt {attempt} for {url}, waiting {backoff:?}");
                sleep(backoff).await;
            }

            match self.build(&self.client, url).send().await {
                Ok(response) => return Ok(response),
                Err(e) => {
                    debug!("Request failed (attempt {attempt}): {e}");
                    last_error = Some(e);
                }
            }
        }

        Err(connectivity_error(&self.target, last_error))
    }
}

#[async_trait]
impl Requester for HttpClient {
    fn target(&self) -> &TargetUrl {
        &self.target
    }

    fn ip(&self) -> Option<&str> {
        self.ip.as_deref()
    }

    async fn request(&self, path: &str) -> Result<ProbeResponse> {
        let url = self.target.url_for(path);
        let request_path = url::Url::parse(&url)
            .map(|u| u.path().to_string())
            .unwrap_or_else(|_| format!("/{}{path}", self.target.base_path));

        let response = self.send_with_retry(&url).await?;
        let status = response.status().as_u16();
        let redirect = response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let body = response
            .bytes()
            .await
            .map_err(|e| DirhoundError::Connectivity(format!("Failed to read response body: {e}")))?;

        Ok(ProbeResponse {
            path: request_path,
            status,
            length: body.len(),
            content: String::from_utf8_lossy(&body).into_owned(),
            redirect,
        })
    }

    async fn replay(&self, path: &str) -> Result<()> {
        let Some(ref client) = self.replay_client else {
            return Ok(());
        };
        let url = self.target.url_for(path);
        if let Err(e) = self.build(client, &url).send().await {
            warn!("Replay of {url} failed: {e}");
        }
        Ok(())
    }
}

/// Opens reqwest sessions
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpConnector;

#[async_trait]
impl Connector for HttpConnector {
    async fn open(&self, url: &str, config: &ScanConfig) -> Result<Arc<dyn Requester>> {
        Ok(Arc::new(HttpClient::open(url, config)?))
    }
}

/// Default headers, then user headers, then the cookie / user agent shortcuts and auth
fn merged_headers(config: &ScanConfig) -> BTreeMap<String, String> {
    let mut headers: BTreeMap<String, String> = DEFAULT_HEADERS
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    headers.extend(config.headers.clone());
    if let Some(ref cookie) = config.cookie {
        headers.insert("Cookie".to_string(), cookie.clone());
    }
    if let Some(ref agent) = config.user_agent {
        headers.insert("User-Agent".to_string(), agent.clone());
    }
    headers.extend(config.auth.headers());
    headers
}

fn header_map(headers: &BTreeMap<String, String>) -> Result<HeaderMap> {
    let mut map = HeaderMap::new();
    for (key, value) in headers {
        let name = HeaderName::from_bytes(key.as_bytes())
            .map_err(|_| DirhoundError::ConfigError(format!("Invalid header name: {key}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|_| DirhoundError::ConfigError(format!("Invalid value for header {key}")))?;
        map.insert(name, value);
    }
    Ok(map)
}

fn connectivity_error(target: &TargetUrl, error: Option<reqwest::Error>) -> DirhoundError {
    let reason = match error {
        Some(e) if e.is_timeout() => format!("Request timeout: {}", target.base_url()),
        Some(e) if e.is_connect() => {
            format!("Cannot connect to: {}:{}", target.host, target.port)
        }
        Some(e) => format!("There was a problem in the request to: {} ({e})", target.base_url()),
        None => format!("There was a problem in the request to: {}", target.base_url()),
    };
    DirhoundError::Connectivity(reason)
}
