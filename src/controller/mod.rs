//! Scan orchestration
//!
//! The [`Controller`] walks the target queue, opens a transport session per
//! target and drains that target's directory queue one probe round at a
//! time. Results flow from the probe workers through the callbacks built in
//! [`Controller::callbacks`] into the validator, the recursion planner, the
//! terminal output, the report and the audit log.

pub mod monitor;
pub mod pause;
pub mod queue;
pub mod recursion;
pub mod validator;

use crate::audit::AuditLog;
use crate::dictionary::Dictionary;
use crate::error::Result;
use crate::fuzzer::{Callbacks, Fuzzer, FuzzerSettings};
use crate::http::{Connector, Requester};
use crate::models::{ProbeResponse, ScanConfig};
use crate::output::{Output, BANNER};
use crate::report::{resolve_report_path, Report, ReportManager};
use crate::session::{SessionSnapshot, SESSION_VERSION};
use chrono::Local;
use pause::Prompt;
use queue::DirectoryQueue;
use recursion::RecursionPlanner;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use validator::Validator;

/// How a round or a target ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// Abandon the current target and move on to the next one
    SkipTarget(String),
    /// Stop the whole scan
    FullAbort(String),
    /// Stop the whole scan; the session was saved to this file
    Suspend(PathBuf),
}

/// How the whole scan ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    Completed,
    Aborted(String),
}

/// Operator-facing side of a controller
pub struct Console {
    pub output: Arc<Output>,
    /// One message per CTRL+C
    pub interrupts: mpsc::Receiver<()>,
    pub prompt: Box<dyn Prompt>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// State touched by result callbacks from worker context
struct ScanState {
    queue: Mutex<DirectoryQueue>,
    jobs_count: AtomicUsize,
    current_job: AtomicUsize,
    current_directory: RwLock<String>,
    skip: Mutex<Option<String>>,
    exit: Mutex<Option<String>>,
    report: Mutex<Option<Report>>,
    reports: Option<Mutex<ReportManager>>,
    requests: AtomicU64,
    round_started: Mutex<Instant>,
}

impl ScanState {
    fn queue(&self) -> MutexGuard<'_, DirectoryQueue> {
        lock(&self.queue)
    }

    fn current_directory(&self) -> String {
        self.current_directory
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn set_current_directory(&self, directory: &str) {
        *self
            .current_directory
            .write()
            .unwrap_or_else(|e| e.into_inner()) = directory.to_string();
    }

    fn jobs_count(&self) -> usize {
        self.jobs_count.load(Ordering::SeqCst)
    }

    fn current_job(&self) -> usize {
        self.current_job.load(Ordering::SeqCst)
    }

    fn add_jobs(&self, count: usize) {
        self.jobs_count.fetch_add(count, Ordering::SeqCst);
    }

    fn remove_jobs(&self, count: usize) {
        let _ = self
            .jobs_count
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |jobs| {
                Some(jobs.saturating_sub(count))
            });
    }

    /// The first reason armed wins
    fn arm_skip(&self, reason: String) {
        lock(&self.skip).get_or_insert(reason);
    }

    fn skip_reason(&self) -> Option<String> {
        lock(&self.skip).clone()
    }

    fn is_skipping(&self) -> bool {
        lock(&self.skip).is_some()
    }

    fn arm_exit(&self, reason: String) {
        lock(&self.exit).get_or_insert(reason);
    }

    fn exit_reason(&self) -> Option<String> {
        lock(&self.exit).clone()
    }

    fn clear_flags(&self) {
        *lock(&self.skip) = None;
        *lock(&self.exit) = None;
    }

    fn begin_round(&self) {
        self.requests.store(0, Ordering::Relaxed);
        *lock(&self.round_started) = Instant::now();
    }

    /// Requests per second in the current round
    fn rate(&self) -> u64 {
        let elapsed = lock(&self.round_started).elapsed().as_secs_f64();
        if elapsed < 1.0 {
            return self.requests.load(Ordering::Relaxed);
        }
        (self.requests.load(Ordering::Relaxed) as f64 / elapsed) as u64
    }

    fn start_report(&self, report: Report) {
        *lock(&self.report) = Some(report);
    }

    /// Adds an accepted result and rewrites the report file
    fn record(&self, path: &str, response: &ProbeResponse) {
        let mut report = lock(&self.report);
        if let Some(report) = report.as_mut() {
            report.add_result(path, response);
            self.persist(report);
        }
    }

    /// Marks the current report complete, persists it and hands it back
    fn finish_report(&self) -> Option<Report> {
        let mut report = lock(&self.report).take()?;
        report.mark_completed();
        self.persist(&report);
        Some(report)
    }

    fn persist(&self, report: &Report) {
        if let Some(ref manager) = self.reports {
            if let Err(e) = lock(manager).update(report) {
                warn!("Failed to update the report: {e}");
            }
        }
    }
}

/// Restorable progress: fresh for a new scan, or taken from a session
struct Checkpoint {
    targets: VecDeque<String>,
    queue: DirectoryQueue,
    dictionary: Dictionary,
    current_job: usize,
    jobs_count: usize,
    elapsed: Duration,
    last_output: Option<String>,
}

/// Orchestrates the scan of every target
pub struct Controller {
    config: Arc<ScanConfig>,
    connector: Arc<dyn Connector>,
    output: Arc<Output>,
    interrupts: mpsc::Receiver<()>,
    prompt: Box<dyn Prompt>,
    targets: VecDeque<String>,
    current_target: Option<String>,
    dictionary: Arc<Dictionary>,
    validator: Arc<Validator>,
    planner: Arc<RecursionPlanner>,
    audit: Option<Arc<AuditLog>>,
    state: Arc<ScanState>,
    started: Instant,
    elapsed_before: Duration,
    /// Output of the interrupted run, replayed for the first resumed target
    resume_output: Option<String>,
    skip_banner: bool,
    /// Whether the current target's directories were queued
    seeded: bool,
}

impl Controller {
    /// Prepares a fresh scan of every configured target
    pub fn new(
        mut config: ScanConfig,
        connector: Arc<dyn Connector>,
        console: Console,
    ) -> Result<Self> {
        crate::config::validate(&config)?;
        if config.scan_subdirs.is_empty() {
            config.scan_subdirs.push(String::new());
        }

        let dictionary = Dictionary::from_wordlists(&config.wordlists, &config.extensions)?;
        let checkpoint = Checkpoint {
            targets: config.urls.iter().cloned().collect(),
            queue: DirectoryQueue::default(),
            dictionary,
            current_job: 0,
            jobs_count: config.urls.len() * config.scan_subdirs.len(),
            elapsed: Duration::ZERO,
            last_output: None,
        };
        Self::build(config, connector, console, checkpoint)
    }

    /// Restores a scan saved from the pause menu
    pub fn from_session(
        snapshot: SessionSnapshot,
        connector: Arc<dyn Connector>,
        console: Console,
    ) -> Result<Self> {
        info!(
            "Resuming session saved at {} ({} targets left)",
            snapshot.saved_at.format("%Y-%m-%d %H:%M:%S"),
            snapshot.targets.len()
        );
        let checkpoint = Checkpoint {
            targets: snapshot.targets.into(),
            queue: DirectoryQueue::restore(snapshot.directories, snapshot.passed_directories),
            dictionary: Dictionary::import(snapshot.dictionary, snapshot.dictionary_index),
            current_job: snapshot.current_job,
            jobs_count: snapshot.jobs_count,
            elapsed: Duration::try_from_secs_f64(snapshot.elapsed_secs).unwrap_or_default(),
            last_output: Some(snapshot.last_output),
        };
        Self::build(snapshot.config, connector, console, checkpoint)
    }

    fn build(
        config: ScanConfig,
        connector: Arc<dyn Connector>,
        console: Console,
        checkpoint: Checkpoint,
    ) -> Result<Self> {
        let validator = Validator::from_config(&config)?;
        let planner = RecursionPlanner::from_config(&config);
        let output = console.output;

        output.header(BANNER);
        output.config(&config, checkpoint.dictionary.len());

        let targets: Vec<String> = checkpoint.targets.iter().cloned().collect();
        let reports = match resolve_report_path(&config, &targets)? {
            Some(path) => {
                output.output_file(&path.display().to_string());
                Some(Mutex::new(ReportManager::new(config.output_format, path)))
            }
            None => None,
        };

        let audit = match config.log_file {
            Some(ref file) => {
                let log = open_audit_log(Path::new(file))?;
                output.log_file(&log.path().display().to_string());
                Some(Arc::new(log))
            }
            None => None,
        };

        let state = ScanState {
            queue: Mutex::new(checkpoint.queue),
            jobs_count: AtomicUsize::new(checkpoint.jobs_count),
            current_job: AtomicUsize::new(checkpoint.current_job),
            current_directory: RwLock::new(String::new()),
            skip: Mutex::new(None),
            exit: Mutex::new(None),
            report: Mutex::new(None),
            reports,
            requests: AtomicU64::new(0),
            round_started: Mutex::new(Instant::now()),
        };

        Ok(Self {
            config: Arc::new(config),
            connector,
            output,
            interrupts: console.interrupts,
            prompt: console.prompt,
            targets: checkpoint.targets,
            current_target: None,
            dictionary: Arc::new(checkpoint.dictionary),
            validator: Arc::new(validator),
            planner: Arc::new(planner),
            audit,
            state: Arc::new(state),
            started: Instant::now(),
            elapsed_before: checkpoint.elapsed,
            resume_output: checkpoint.last_output,
            skip_banner: false,
            seeded: false,
        })
    }

    /// Expected probe rounds across the whole scan
    pub fn jobs_count(&self) -> usize {
        self.state.jobs_count()
    }

    pub fn report_path(&self) -> Option<PathBuf> {
        self.state
            .reports
            .as_ref()
            .map(|manager| lock(manager).path().to_path_buf())
    }

    /// Runtime counted against the maximum, including time before a resume
    pub fn elapsed(&self) -> Duration {
        self.elapsed_before + self.started.elapsed()
    }

    /// Scans every queued target
    pub async fn run(&mut self) -> Result<ScanOutcome> {
        while let Some(url) = self.targets.pop_front() {
            self.current_target = Some(url.clone());
            self.seeded = !self.state.queue().is_empty();

            match self.scan_target(&url).await {
                Flow::Continue => self.finish_target(),
                Flow::SkipTarget(reason) => {
                    self.output.error(&reason);
                    self.skip_target();
                }
                Flow::FullAbort(reason) => return Ok(self.abort(reason)),
                Flow::Suspend(path) => {
                    return Ok(self.abort(format!("Session saved to: {}", path.display())))
                }
            }
        }

        self.current_target = None;
        self.output.warning("\nTask Completed", false);
        self.output.finish();
        Ok(ScanOutcome::Completed)
    }

    async fn scan_target(&mut self, url: &str) -> Flow {
        let requester = match self.establish_session(url).await {
            Ok(requester) => requester,
            Err(e) => return Flow::SkipTarget(e.to_string()),
        };

        {
            let mut queue = self.state.queue();
            if queue.is_empty() {
                queue.seed(&self.config.scan_subdirs);
            }
        }
        self.seeded = true;

        let mut fuzzer = Fuzzer::new(
            Arc::clone(&requester),
            Arc::clone(&self.dictionary),
            self.fuzzer_settings(),
            self.callbacks(&requester),
        );
        self.run_directories(&mut fuzzer).await
    }

    /// Opens the transport session and checks the target answers
    async fn establish_session(&mut self, url: &str) -> Result<Arc<dyn Requester>> {
        debug!("Opening session for {url}");
        let requester = self.connector.open(url, &self.config).await?;
        let target = requester.target().clone();

        match self.resume_output.take() {
            Some(last_output) => {
                self.output.set_target_url(&target.url());
                self.output.replay(&last_output);
                self.skip_banner = true;
            }
            None => self.output.set_target(&target.url()),
        }

        requester.request("").await?;
        if let Some(ref audit) = self.audit {
            audit.write(&format!("Test request sent for: {}", target.base_url()));
        }

        self.state.start_report(Report::new(&target));
        Ok(requester)
    }

    /// Runs one probe round per queued directory
    async fn run_directories(&mut self, fuzzer: &mut Fuzzer) -> Flow {
        let mut first = true;

        loop {
            let next = self.state.queue().pop();
            let Some(directory) = next else {
                return Flow::Continue;
            };
            self.state.current_job.fetch_add(1, Ordering::SeqCst);
            self.state.set_current_directory(&directory);

            if !std::mem::take(&mut self.skip_banner) {
                let newline = if first { "\n" } else { "" };
                self.output.warning(
                    &format!(
                        "{newline}[{}] Starting: {directory}",
                        Local::now().format("%H:%M:%S")
                    ),
                    true,
                );
            }
            first = false;

            self.state.begin_round();
            if let Err(e) = fuzzer.start(&directory).await {
                return Flow::SkipTarget(e.to_string());
            }

            let flow = self.supervise(fuzzer).await;
            fuzzer.shutdown().await;

            // results that landed while the round wound down may still arm a flag
            let flow = match flow {
                Flow::Continue => self.cancellation().unwrap_or(Flow::Continue),
                other => other,
            };
            if flow != Flow::Continue {
                return flow;
            }
            self.dictionary.reset();
        }
    }

    fn finish_target(&mut self) {
        if let Some(report) = self.state.finish_report() {
            self.output.summary(&report);
        }
        self.reset_target();
    }

    /// Drops the rest of the target and corrects the job count
    fn skip_target(&mut self) {
        let discarded = if self.seeded {
            self.state.queue().discard_pending()
        } else {
            self.config.scan_subdirs.len()
        };
        self.state.remove_jobs(discarded);
        debug!("Discarded {discarded} directories");

        self.state.finish_report();
        self.dictionary.reset();
        self.reset_target();
    }

    fn reset_target(&mut self) {
        self.state.queue().reset();
        self.state.clear_flags();
        self.seeded = false;
        self.skip_banner = false;
    }

    fn abort(&mut self, reason: String) -> ScanOutcome {
        self.output.error(&reason);
        self.state.finish_report();
        self.output.finish();
        ScanOutcome::Aborted(reason)
    }

    /// Captures the state needed to replay the interrupted round
    pub fn snapshot(&self) -> SessionSnapshot {
        let mut targets: Vec<String> = self.current_target.iter().cloned().collect();
        targets.extend(self.targets.iter().cloned());

        let queue = self.state.queue();
        let mut directories = Vec::with_capacity(queue.len() + 1);
        if self.current_target.is_some() {
            directories.push(self.state.current_directory());
        }
        directories.extend(queue.pending());
        let (dictionary, dictionary_index) = self.dictionary.export();

        SessionSnapshot {
            version: SESSION_VERSION,
            saved_at: Local::now(),
            config: (*self.config).clone(),
            targets,
            directories,
            passed_directories: queue.passed().to_vec(),
            dictionary,
            dictionary_index,
            // the interrupted round is counted again when it restarts
            current_job: self.state.current_job().saturating_sub(1),
            jobs_count: self.state.jobs_count(),
            elapsed_secs: self.elapsed().as_secs_f64(),
            last_output: self.output.export(),
        }
    }

    fn fuzzer_settings(&self) -> FuzzerSettings {
        FuzzerSettings {
            threads: self.config.threads,
            delay: Duration::try_from_secs_f64(self.config.delay_secs).unwrap_or_default(),
            max_rate: self.config.max_rate,
            exclude_response: self.config.exclude_response.clone(),
        }
    }

    /// Result handling for one target session
    fn callbacks(&self, requester: &Arc<dyn Requester>) -> Callbacks {
        let mut callbacks = Callbacks::default();

        let on_match = {
            let state = Arc::clone(&self.state);
            let validator = Arc::clone(&self.validator);
            let planner = Arc::clone(&self.planner);
            let output = Arc::clone(&self.output);
            let requester = Arc::clone(requester);
            let skip_on_status = self.config.skip_on_status.clone();
            let replay = self.config.replay_proxy.is_some();
            let full_url = self.config.full_url;

            move |path: &str, response: &ProbeResponse| {
                state.requests.fetch_add(1, Ordering::Relaxed);
                if state.is_skipping() {
                    return;
                }
                if skip_on_status.contains(&response.status) {
                    state.arm_skip(format!(
                        "Skipped the target due to {} status code",
                        response.status
                    ));
                    return;
                }
                if !validator.is_valid(path, response) {
                    return;
                }

                let directory = state.current_directory();
                let added = if planner.triggers(response.status) {
                    planner.plan(
                        &mut state.queue(),
                        requester.target(),
                        &directory,
                        path,
                        response,
                    )
                } else {
                    0
                };
                state.add_jobs(added);

                let full_path = format!("{directory}{path}");
                if replay {
                    let requester = Arc::clone(&requester);
                    let full_path = full_path.clone();
                    tokio::spawn(async move {
                        if let Err(e) = requester.replay(&full_path).await {
                            debug!("Replay of {full_path} failed: {e}");
                        }
                    });
                }

                output.status_report(response, full_url, added > 0);
                state.record(&full_path, response);
            }
        };
        callbacks.on_match.push(Arc::new(on_match));

        let on_miss = {
            let state = Arc::clone(&self.state);
            let output = Arc::clone(&self.output);
            let dictionary = Arc::clone(&self.dictionary);

            move |_: &str, _: &ProbeResponse| {
                state.requests.fetch_add(1, Ordering::Relaxed);
                output.last_path(
                    dictionary.index(),
                    dictionary.len(),
                    state.current_job(),
                    state.jobs_count(),
                    state.rate(),
                );
            }
        };
        callbacks.on_miss.push(Arc::new(on_miss));

        let on_error = {
            let state = Arc::clone(&self.state);
            let output = Arc::clone(&self.output);
            let exit_on_error = self.config.exit_on_error;

            move |path: &str, message: &str| {
                state.requests.fetch_add(1, Ordering::Relaxed);
                debug!("Request for {path} failed: {message}");
                if exit_on_error {
                    state.arm_exit("Canceled due to an error".to_string());
                }
                output.add_connection_error();
            }
        };
        callbacks.on_error.push(Arc::new(on_error));

        if let Some(ref audit) = self.audit {
            let target = requester.target().clone();
            let origin = target.base_url().trim_end_matches('/').to_string();
            let ip = requester.ip().map(str::to_string);
            let method = self.config.http_method.to_uppercase();

            let log_result = {
                let audit = Arc::clone(audit);
                let method = method.clone();
                move |_: &str, response: &ProbeResponse| {
                    audit.result(ip.as_deref(), &method, &origin, response);
                }
            };
            let log_result = Arc::new(log_result);
            callbacks.on_match.push(log_result.clone());
            callbacks.on_miss.push(log_result);

            let log_error = {
                let audit = Arc::clone(audit);
                let state = Arc::clone(&self.state);
                move |path: &str, message: &str| {
                    let url = target.url_for(&format!("{}{path}", state.current_directory()));
                    audit.error(&method, &url, message);
                }
            };
            callbacks.on_error.push(Arc::new(log_error));
        }

        callbacks
    }
}

/// Creates the log file's directory, failing when it cannot be written
fn open_audit_log(path: &Path) -> Result<AuditLog> {
    if let Some(parent) = path.parent() {
        crate::config::ensure_directory(parent)?;
    }
    AuditLog::open(path)
}
