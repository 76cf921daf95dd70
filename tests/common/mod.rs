//! Common test utilities

#![allow(dead_code)]

use async_trait::async_trait;
use dirhound::controller::pause::Prompt;
use dirhound::controller::Console;
use dirhound::error::{DirhoundError, Result};
use dirhound::http::{Connector, Requester, TargetUrl};
use dirhound::models::{ProbeResponse, ScanConfig};
use dirhound::output::Output;
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// Writes a wordlist file and returns its path
pub fn write_wordlist(dir: &Path, entries: &[&str]) -> String {
    let path = dir.join("wordlist.txt");
    std::fs::write(&path, entries.join("\n")).expect("Failed to write wordlist");
    path.to_string_lossy().into_owned()
}

/// Config for a small scan that writes no report unless asked to
pub fn test_config(urls: &[String], wordlist: String) -> ScanConfig {
    ScanConfig {
        urls: urls.to_vec(),
        wordlists: vec![wordlist],
        threads: 2,
        timeout_secs: 5,
        max_retries: 0,
        autosave_report: false,
        ..ScanConfig::default()
    }
}

/// Answers the pause menu from a fixed script
pub struct ScriptedPrompt {
    answers: VecDeque<String>,
}

impl ScriptedPrompt {
    pub fn new(answers: &[&str]) -> Self {
        Self {
            answers: answers.iter().map(|a| a.to_string()).collect(),
        }
    }
}

#[async_trait]
impl Prompt for ScriptedPrompt {
    async fn read_line(&mut self) -> Result<String> {
        self.answers.pop_front().ok_or(DirhoundError::InputClosed)
    }
}

/// Operator who never answers
pub struct SilentPrompt;

#[async_trait]
impl Prompt for SilentPrompt {
    async fn read_line(&mut self) -> Result<String> {
        std::future::pending().await
    }
}

/// Console with hidden output; the sender delivers CTRL+C presses
pub fn console(answers: &[&str]) -> (Console, Arc<Output>, mpsc::Sender<()>) {
    console_with(Box::new(ScriptedPrompt::new(answers)))
}

pub fn console_with(prompt: Box<dyn Prompt>) -> (Console, Arc<Output>, mpsc::Sender<()>) {
    let output = Arc::new(Output::hidden());
    let (tx, rx) = mpsc::channel(4);
    let console = Console {
        output: Arc::clone(&output),
        interrupts: rx,
        prompt,
    };
    (console, output, tx)
}

/// Sends one CTRL+C once `site` has seen `after` requests
pub fn interrupt_after(site: &FakeSite, after: usize, interrupts: mpsc::Sender<()>) {
    let requests = site.requests.clone();
    tokio::spawn(async move {
        while requests.lock().unwrap().len() < after {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        let _ = interrupts.send(()).await;
    });
}

/// In-memory site: every path is 404 unless listed
#[derive(Clone, Default)]
pub struct FakeSite {
    pub pages: HashMap<String, u16>,
    /// Paths whose request fails with a connection error
    pub broken: Vec<String>,
    /// Targets that refuse connections
    pub offline: Vec<String>,
    pub delay: Duration,
    /// Every requested `host/path`, in order
    pub requests: Arc<Mutex<Vec<String>>>,
}

impl FakeSite {
    pub fn with_pages(pages: &[(&str, u16)]) -> Self {
        Self {
            pages: pages.iter().map(|(p, s)| (p.to_string(), *s)).collect(),
            ..Self::default()
        }
    }

    pub fn requested(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

struct FakeRequester {
    target: TargetUrl,
    site: FakeSite,
}

#[async_trait]
impl Requester for FakeRequester {
    fn target(&self) -> &TargetUrl {
        &self.target
    }

    async fn request(&self, path: &str) -> Result<ProbeResponse> {
        let full_path = format!("{}{path}", self.target.base_path);
        self.site
            .requests
            .lock()
            .unwrap()
            .push(format!("{}/{full_path}", self.target.host));

        if !self.site.delay.is_zero() {
            tokio::time::sleep(self.site.delay).await;
        }
        if self.site.offline.contains(&self.target.host) {
            return Err(DirhoundError::Connectivity(format!(
                "Cannot connect to: {}",
                self.target.host
            )));
        }
        if self.site.broken.iter().any(|b| *b == full_path) {
            return Err(DirhoundError::Connectivity("Connection reset".to_string()));
        }

        let status = self.site.pages.get(&full_path).copied().unwrap_or(404);
        Ok(ProbeResponse {
            path: format!("/{full_path}"),
            status,
            length: 7,
            content: format!("page {status}"),
            redirect: String::new(),
        })
    }
}

#[async_trait]
impl Connector for FakeSite {
    async fn open(&self, url: &str, config: &ScanConfig) -> Result<Arc<dyn Requester>> {
        Ok(Arc::new(FakeRequester {
            target: TargetUrl::parse(url, &config.scheme)?,
            site: self.clone(),
        }))
    }
}
