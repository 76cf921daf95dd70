//! Probe engine: a pool of workers draining the shared dictionary
//!
//! Workers pull entries from the [`Dictionary`] cursor, probe
//! `directory + entry` through the target's [`Requester`], and invoke the
//! configured callback chains directly from worker context. Pausing is
//! cooperative: workers finish their in-flight probe and then park until
//! resumed or stopped.

use crate::dictionary::Dictionary;
use crate::error::Result;
use crate::http::Requester;
use crate::models::ProbeResponse;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::{sleep, sleep_until, Instant};
use tracing::{debug, error};

/// Callback receiving the dictionary entry and its response
pub type ResponseCallback = Arc<dyn Fn(&str, &ProbeResponse) + Send + Sync>;
/// Callback receiving the dictionary entry and an error message
pub type ErrorCallback = Arc<dyn Fn(&str, &str) + Send + Sync>;

/// Callback chains, invoked in order for every result
#[derive(Clone, Default)]
pub struct Callbacks {
    pub on_match: Vec<ResponseCallback>,
    pub on_miss: Vec<ResponseCallback>,
    pub on_error: Vec<ErrorCallback>,
}

/// Dispatch settings, applied as configured
#[derive(Debug, Clone)]
pub struct FuzzerSettings {
    pub threads: usize,
    /// Per-worker delay before each request
    pub delay: Duration,
    /// Maximum requests per second across workers (0 = unlimited)
    pub max_rate: u32,
    /// Path whose response marks similar responses as misses
    pub exclude_response: Option<String>,
}

/// Response fingerprint that identifies "not found" pages served with another status
#[derive(Debug, Clone)]
struct Baseline {
    status: u16,
    content: String,
}

impl Baseline {
    fn matches(&self, response: &ProbeResponse) -> bool {
        self.status == response.status && body_similarity(&self.content, &response.content) > 0.85
    }
}

struct RateLimiter {
    interval: Duration,
    next: tokio::sync::Mutex<Instant>,
}

impl RateLimiter {
    fn new(max_rate: u32) -> Option<Self> {
        (max_rate > 0).then(|| Self {
            interval: Duration::from_secs_f64(1.0 / f64::from(max_rate)),
            next: tokio::sync::Mutex::new(Instant::now()),
        })
    }

    async fn acquire(&self) {
        let mut next = self.next.lock().await;
        let now = Instant::now();
        if *next > now {
            sleep_until(*next).await;
        }
        *next = (*next).max(now) + self.interval;
    }
}

struct Shared {
    requester: Arc<dyn Requester>,
    dictionary: Arc<Dictionary>,
    callbacks: Callbacks,
    settings: FuzzerSettings,
    limiter: Option<RateLimiter>,
    play: watch::Sender<bool>,
    stopped: AtomicBool,
    active: AtomicUsize,
    baselines: RwLock<Vec<Baseline>>,
}

impl Shared {
    fn is_miss(&self, response: &ProbeResponse) -> bool {
        if response.status == 404 {
            return true;
        }
        let baselines = self.baselines.read().unwrap_or_else(|e| e.into_inner());
        baselines.iter().any(|b| b.matches(response))
    }
}

/// Concurrent probe engine for one target session
pub struct Fuzzer {
    shared: Arc<Shared>,
    workers: JoinSet<()>,
}

impl Fuzzer {
    pub fn new(
        requester: Arc<dyn Requester>,
        dictionary: Arc<Dictionary>,
        settings: FuzzerSettings,
        callbacks: Callbacks,
    ) -> Self {
        let (play, _) = watch::channel(true);
        let limiter = RateLimiter::new(settings.max_rate);
        Self {
            shared: Arc::new(Shared {
                requester,
                dictionary,
                callbacks,
                settings,
                limiter,
                play,
                stopped: AtomicBool::new(false),
                active: AtomicUsize::new(0),
                baselines: RwLock::new(Vec::new()),
            }),
            workers: JoinSet::new(),
        }
    }

    /// Calibrates the round and spawns the workers for `directory`
    pub async fn start(&mut self, directory: &str) -> Result<()> {
        self.calibrate(directory).await?;

        let shared = &self.shared;
        shared.stopped.store(false, Ordering::SeqCst);
        shared.play.send_replace(true);

        let threads = shared.settings.threads.max(1);
        shared.active.store(threads, Ordering::SeqCst);
        let directory: Arc<str> = Arc::from(directory);
        for _ in 0..threads {
            self.workers
                .spawn(worker(Arc::clone(&self.shared), Arc::clone(&directory)));
        }
        Ok(())
    }

    /// Stops dispatching new probes; in-flight probes complete
    pub fn pause(&self) {
        self.shared.play.send_replace(false);
    }

    pub fn resume(&self) {
        self.shared.play.send_replace(true);
    }

    /// Ends the round: workers exit after their current probe
    pub fn stop(&self) {
        self.shared.stopped.store(true, Ordering::SeqCst);
        self.shared.play.send_replace(true);
    }

    /// True when no worker is executing a probe
    pub fn is_stopped(&self) -> bool {
        self.shared.active.load(Ordering::SeqCst) == 0
    }

    /// Waits up to `timeout` for the round to finish; true if it did
    pub async fn wait(&mut self, timeout: Duration) -> bool {
        let workers = &mut self.workers;
        tokio::time::timeout(timeout, async {
            while let Some(joined) = workers.join_next().await {
                if let Err(e) = joined {
                    error!("Probe worker panicked: {e}");
                }
            }
        })
        .await
        .is_ok()
    }

    /// Stops the round and waits for in-flight probes to settle
    pub async fn shutdown(&mut self) {
        self.stop();
        while let Some(joined) = self.workers.join_next().await {
            if let Err(e) = joined {
                error!("Probe worker panicked: {e}");
            }
        }
    }

    async fn calibrate(&self, directory: &str) -> Result<()> {
        let mut baselines = Vec::new();

        let probe = format!("{directory}{}", uuid::Uuid::new_v4().simple());
        let response = self.shared.requester.request(&probe).await?;
        if response.status != 404 {
            debug!(
                "Wildcard response for {directory:?}: {} ({} bytes)",
                response.status, response.length
            );
            baselines.push(Baseline {
                status: response.status,
                content: response.content,
            });
        }

        if let Some(ref path) = self.shared.settings.exclude_response {
            let response = self.shared.requester.request(path).await?;
            baselines.push(Baseline {
                status: response.status,
                content: response.content,
            });
        }

        *self
            .shared
            .baselines
            .write()
            .unwrap_or_else(|e| e.into_inner()) = baselines;
        Ok(())
    }
}

async fn worker(shared: Arc<Shared>, directory: Arc<str>) {
    let mut play = shared.play.subscribe();

    loop {
        if shared.stopped.load(Ordering::SeqCst) {
            break;
        }

        if !*play.borrow_and_update() {
            shared.active.fetch_sub(1, Ordering::SeqCst);
            let resumed = play.wait_for(|playing| *playing).await.is_ok();
            shared.active.fetch_add(1, Ordering::SeqCst);
            if !resumed {
                break;
            }
            continue;
        }

        let Some(entry) = shared.dictionary.next_entry().map(str::to_string) else {
            break;
        };

        if !shared.settings.delay.is_zero() {
            sleep(shared.settings.delay).await;
        }
        if let Some(ref limiter) = shared.limiter {
            limiter.acquire().await;
        }

        match shared.requester.request(&format!("{directory}{entry}")).await {
            Ok(response) => {
                let chain = if shared.is_miss(&response) {
                    &shared.callbacks.on_miss
                } else {
                    &shared.callbacks.on_match
                };
                for callback in chain {
                    callback(&entry, &response);
                }
            }
            Err(e) => {
                let message = e.to_string();
                for callback in &shared.callbacks.on_error {
                    callback(&entry, &message);
                }
            }
        }
    }

    shared.active.fetch_sub(1, Ordering::SeqCst);
}

/// Simple similarity ratio between two bodies (0.0 to 1.0)
fn body_similarity(a: &str, b: &str) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let len_a = a.len();
    let len_b = b.len();
    let len_ratio = len_a.min(len_b) as f64 / len_a.max(len_b) as f64;
    if len_ratio < 0.8 {
        return len_ratio;
    }

    let sample_a: Vec<char> = a.chars().take(2000).collect();
    let sample_b: Vec<char> = b.chars().take(2000).collect();
    let matching = sample_a
        .iter()
        .zip(sample_b.iter())
        .filter(|(ca, cb)| ca == cb)
        .count();

    matching as f64 / sample_a.len().max(sample_b.len()) as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DirhoundError;
    use crate::http::TargetUrl;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct StaticRequester {
        target: TargetUrl,
        pages: HashMap<String, u16>,
        fail: Vec<String>,
    }

    #[async_trait]
    impl Requester for StaticRequester {
        fn target(&self) -> &TargetUrl {
            &self.target
        }

        async fn request(&self, path: &str) -> Result<ProbeResponse> {
            if self.fail.iter().any(|f| f == path) {
                return Err(DirhoundError::Connectivity("connection reset".to_string()));
            }
            let status = self.pages.get(path).copied().unwrap_or(404);
            Ok(ProbeResponse {
                path: format!("/{path}"),
                status,
                length: 2,
                content: "ok".to_string(),
                redirect: String::new(),
            })
        }
    }

    fn requester(pages: &[(&str, u16)], fail: &[&str]) -> Arc<dyn Requester> {
        Arc::new(StaticRequester {
            target: TargetUrl::parse("http://localhost/", "http").expect("url"),
            pages: pages.iter().map(|(p, s)| (p.to_string(), *s)).collect(),
            fail: fail.iter().map(|f| f.to_string()).collect(),
        })
    }

    fn settings(threads: usize) -> FuzzerSettings {
        FuzzerSettings {
            threads,
            delay: Duration::ZERO,
            max_rate: 0,
            exclude_response: None,
        }
    }

    fn recording_callbacks() -> (Callbacks, Arc<Mutex<Vec<String>>>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let (m, n, e) = (events.clone(), events.clone(), events.clone());
        let callbacks = Callbacks {
            on_match: vec![Arc::new(move |path: &str, res: &ProbeResponse| {
                m.lock().unwrap().push(format!("match {path} {}", res.status))
            })],
            on_miss: vec![Arc::new(move |path: &str, _: &ProbeResponse| {
                n.lock().unwrap().push(format!("miss {path}"))
            })],
            on_error: vec![Arc::new(move |path: &str, _: &str| {
                e.lock().unwrap().push(format!("error {path}"))
            })],
        };
        (callbacks, events)
    }

    #[tokio::test]
    async fn test_round_dispatches_every_entry() {
        let dictionary = Arc::new(Dictionary::new(vec![
            "admin".to_string(),
            "backup".to_string(),
            "broken".to_string(),
        ]));
        let (callbacks, events) = recording_callbacks();
        let mut fuzzer = Fuzzer::new(
            requester(&[("sub/admin", 200)], &["sub/broken"]),
            dictionary.clone(),
            settings(2),
            callbacks,
        );

        fuzzer.start("sub/").await.expect("start");
        assert!(fuzzer.wait(Duration::from_secs(5)).await);
        assert!(fuzzer.is_stopped());

        let mut events = events.lock().unwrap().clone();
        events.sort();
        assert_eq!(
            events,
            vec!["error broken", "match admin 200", "miss backup"]
        );
        assert_eq!(dictionary.index(), 3);
    }

    #[tokio::test]
    async fn test_pause_parks_workers_and_stop_ends_round() {
        let entries = (0..500).map(|i| format!("entry{i}")).collect();
        let dictionary = Arc::new(Dictionary::new(entries));
        let mut config = settings(4);
        config.delay = Duration::from_millis(5);
        let mut fuzzer = Fuzzer::new(
            requester(&[], &[]),
            dictionary.clone(),
            config,
            Callbacks::default(),
        );

        fuzzer.start("").await.expect("start");
        fuzzer.pause();
        let mut waited = 0;
        while !fuzzer.is_stopped() && waited < 100 {
            sleep(Duration::from_millis(10)).await;
            waited += 1;
        }
        assert!(fuzzer.is_stopped());

        let parked_at = dictionary.index();
        sleep(Duration::from_millis(50)).await;
        assert_eq!(dictionary.index(), parked_at);
        assert!(!fuzzer.wait(Duration::from_millis(20)).await);

        fuzzer.stop();
        assert!(fuzzer.wait(Duration::from_secs(5)).await);
        assert!(dictionary.index() < 500);
    }

    #[test]
    fn test_body_similarity() {
        assert_eq!(body_similarity("", ""), 1.0);
        assert_eq!(body_similarity("abc", ""), 0.0);
        assert!(body_similarity("not found: /a", "not found: /b") > 0.85);
        assert!(body_similarity("short", "a much longer body entirely") < 0.85);
    }

    #[tokio::test]
    async fn test_wildcard_responses_are_misses() {
        struct Wildcard(TargetUrl);

        #[async_trait]
        impl Requester for Wildcard {
            fn target(&self) -> &TargetUrl {
                &self.0
            }

            async fn request(&self, path: &str) -> Result<ProbeResponse> {
                let (status, content) = if path == "real" {
                    (200, "a real page with different content".to_string())
                } else {
                    (200, "Sorry, nothing here".to_string())
                };
                Ok(ProbeResponse {
                    path: format!("/{path}"),
                    status,
                    length: content.len(),
                    content,
                    redirect: String::new(),
                })
            }
        }

        let dictionary = Arc::new(Dictionary::new(vec!["real".into(), "fake".into()]));
        let (callbacks, events) = recording_callbacks();
        let mut fuzzer = Fuzzer::new(
            Arc::new(Wildcard(TargetUrl::parse("http://localhost/", "http").expect("url"))),
            dictionary,
            settings(1),
            callbacks,
        );
        fuzzer.start("").await.expect("start");
        assert!(fuzzer.wait(Duration::from_secs(5)).await);

        let events = events.lock().unwrap().clone();
        assert_eq!(events, vec!["match real 200", "miss fake"]);
    }
}
