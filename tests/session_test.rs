//! Integration tests for pausing, saving and resuming a scan

mod common;

use common::{
    console, console_with, interrupt_after, test_config, write_wordlist, FakeSite, SilentPrompt,
};
use dirhound::controller::{Controller, ScanOutcome};
use dirhound::session::SessionSnapshot;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

/// Requested wordlist entries, in order, ignoring liveness and calibration probes
fn requested_words(site: &FakeSite, words: &HashSet<String>) -> Vec<String> {
    site.requested()
        .into_iter()
        .filter_map(|r| r.strip_prefix("x/").map(str::to_string))
        .filter(|p| words.contains(p))
        .collect()
}

#[tokio::test]
async fn test_saved_session_resumes_at_the_same_position() {
    let dir = tempfile::tempdir().expect("tempdir");
    let words: Vec<String> = (0..40).map(|i| format!("word{i:02}")).collect();
    let word_refs: Vec<&str> = words.iter().map(String::as_str).collect();
    let wordlist = write_wordlist(dir.path(), &word_refs);
    let session_path = dir.path().join("scan.session");
    let word_set: HashSet<String> = words.iter().cloned().collect();

    let mut site = FakeSite::with_pages(&[("word03", 200)]);
    site.delay = Duration::from_millis(10);

    let mut config = test_config(&["http://x/".to_string()], wordlist);
    config.threads = 1;

    let session_arg = session_path.to_string_lossy().into_owned();
    let (console, _output, interrupts) = console(&["q", "s", &session_arg]);
    let mut controller = Controller::new(config, Arc::new(site.clone()), console).expect("controller");

    // press CTRL+C once a few entries went out
    let requests = site.requests.clone();
    tokio::spawn(async move {
        while requests.lock().unwrap().len() < 8 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        let _ = interrupts.send(()).await;
    });

    let outcome = controller.run().await.expect("run");
    assert_eq!(
        outcome,
        ScanOutcome::Aborted(format!("Session saved to: {}", session_path.display()))
    );

    let snapshot = SessionSnapshot::load(&session_path).expect("session");
    let position = snapshot.dictionary_index;
    assert!(position > 0 && position < words.len(), "position {position}");
    assert_eq!(snapshot.targets, vec!["http://x/"]);
    assert_eq!(snapshot.directories, vec![""]);
    assert_eq!(snapshot.current_job, 0);
    assert_eq!(snapshot.jobs_count, 1);
    assert!(snapshot.last_output.contains("word03"));

    let first_run = requested_words(&site, &word_set);
    assert_eq!(first_run, words[..position].to_vec());

    let resumed_site = FakeSite::default();
    let (console, output, interrupts) = common::console(&[]);
    drop(interrupts);
    let mut controller =
        Controller::from_session(snapshot, Arc::new(resumed_site.clone()), console)
            .expect("resumed controller");
    let outcome = controller.run().await.expect("resumed run");
    assert_eq!(outcome, ScanOutcome::Completed);

    let second_run = requested_words(&resumed_site, &word_set);
    assert_eq!(second_run, words[position..].to_vec());

    let shown = output.export();
    assert!(shown.contains("word03"), "previous output is replayed");
    assert_eq!(
        shown.matches("Starting:").count(),
        1,
        "the resumed round does not announce itself again"
    );
}

#[tokio::test]
async fn test_continue_and_next_from_pause_menu() {
    let dir = tempfile::tempdir().expect("tempdir");
    let words: Vec<String> = (0..30).map(|i| format!("item{i:02}")).collect();
    let mut entries: Vec<&str> = vec!["api/"];
    entries.extend(words.iter().map(String::as_str));
    let wordlist = write_wordlist(dir.path(), &entries);

    let mut site = FakeSite::with_pages(&[("api/", 200)]);
    site.delay = Duration::from_millis(10);

    let mut config = test_config(&["http://x/".to_string()], wordlist);
    config.threads = 1;
    config.recursive = true;

    // an unknown answer re-prompts; "n" is offered because api/ is queued
    let (console, _output, interrupts) = console(&["z", "c", "n"]);
    let mut controller = Controller::new(config, Arc::new(site.clone()), console).expect("controller");

    let requests = site.requests.clone();
    tokio::spawn(async move {
        while requests.lock().unwrap().len() < 5 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        let _ = interrupts.send(()).await;
        while requests.lock().unwrap().len() < 10 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        let _ = interrupts.send(()).await;
    });

    let outcome = controller.run().await.expect("run");
    assert_eq!(outcome, ScanOutcome::Completed);
    assert_eq!(controller.jobs_count(), 2);

    let requested = site.requested();
    assert!(
        !requested.contains(&"x/item29".to_string()),
        "the root round was ended early"
    );
    assert!(
        requested.contains(&"x/api/item29".to_string()),
        "api/ was scanned in full after skipping ahead"
    );
}

#[tokio::test]
async fn test_quit_without_saving() {
    let dir = tempfile::tempdir().expect("tempdir");
    let words: Vec<String> = (0..30).map(|i| format!("w{i}")).collect();
    let word_refs: Vec<&str> = words.iter().map(String::as_str).collect();
    let wordlist = write_wordlist(dir.path(), &word_refs);

    let mut site = FakeSite::default();
    site.delay = Duration::from_millis(10);
    let config = test_config(&["http://x/".to_string()], wordlist);

    let (console, output, interrupts) = console(&["q", "q"]);
    interrupts.send(()).await.expect("send");
    let mut controller = Controller::new(config, Arc::new(site), console).expect("controller");

    let outcome = controller.run().await.expect("run");
    assert_eq!(outcome, ScanOutcome::Aborted("Canceled by the user".to_string()));
    assert!(output.export().contains("Canceled by the user"));
}

#[tokio::test]
async fn test_session_keeps_recursion_queue() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut entries: Vec<String> = vec!["api/".to_string(), "admin/".to_string()];
    entries.extend((0..30).map(|i| format!("item{i:02}")));
    let entry_refs: Vec<&str> = entries.iter().map(String::as_str).collect();
    let wordlist = write_wordlist(dir.path(), &entry_refs);
    let session_path = dir.path().join("recursive.session");
    let entry_set: HashSet<String> = entries.iter().cloned().collect();

    let pages = [("api/", 200), ("admin/", 200)];
    let mut site = FakeSite::with_pages(&pages);
    site.delay = Duration::from_millis(10);

    let mut config = test_config(&["http://x/".to_string()], wordlist);
    config.threads = 1;
    config.recursive = true;

    let session_arg = session_path.to_string_lossy().into_owned();
    let (console, _output, interrupts) = console(&["q", "s", &session_arg]);
    let mut controller = Controller::new(config, Arc::new(site.clone()), console).expect("controller");
    interrupt_after(&site, 8, interrupts);

    controller.run().await.expect("run");

    let snapshot = SessionSnapshot::load(&session_path).expect("session");
    let position = snapshot.dictionary_index;
    assert!(position > 2 && position < entries.len(), "position {position}");
    assert_eq!(snapshot.directories, vec!["", "api/", "admin/"]);
    assert_eq!(snapshot.passed_directories, vec!["", "api/", "admin/"]);
    assert_eq!(snapshot.jobs_count, 3);
    assert_eq!(requested_words(&site, &entry_set), entries[..position].to_vec());

    let resumed_site = FakeSite::with_pages(&pages);
    let (console, _output, interrupts) = common::console(&[]);
    drop(interrupts);
    let mut controller =
        Controller::from_session(snapshot, Arc::new(resumed_site.clone()), console)
            .expect("resumed controller");
    assert_eq!(controller.run().await.expect("run"), ScanOutcome::Completed);
    assert_eq!(controller.jobs_count(), 3);

    assert_eq!(requested_words(&resumed_site, &entry_set), entries[position..].to_vec());
    let requested = resumed_site.requested();
    for directory in ["api/", "admin/"] {
        let first = format!("x/{directory}item00");
        assert_eq!(
            requested.iter().filter(|r| **r == first).count(),
            1,
            "{directory} is scanned exactly once"
        );
        assert!(requested.contains(&format!("x/{directory}item29")));
    }
}

#[tokio::test]
async fn test_skip_target_from_pause_menu() {
    let dir = tempfile::tempdir().expect("tempdir");
    let words: Vec<String> = (0..30).map(|i| format!("item{i:02}")).collect();
    let mut entries: Vec<&str> = vec!["api/"];
    entries.extend(words.iter().map(String::as_str));
    let wordlist = write_wordlist(dir.path(), &entries);

    let mut site = FakeSite::with_pages(&[("api/", 200)]);
    site.delay = Duration::from_millis(10);

    let targets = vec!["http://x/".to_string(), "http://y/".to_string()];
    let mut config = test_config(&targets, wordlist);
    config.threads = 1;
    config.recursive = true;

    let (console, output, interrupts) = console(&["s"]);
    let mut controller = Controller::new(config, Arc::new(site.clone()), console).expect("controller");
    assert_eq!(controller.jobs_count(), 2);
    interrupt_after(&site, 5, interrupts);

    let outcome = controller.run().await.expect("run");
    assert_eq!(outcome, ScanOutcome::Completed);
    // x/api/ was queued then discarded, y/api/ was queued and scanned
    assert_eq!(controller.jobs_count(), 3);

    let requested = site.requested();
    assert!(!requested.contains(&"x/item29".to_string()));
    assert!(
        requested.iter().all(|r| !r.starts_with("x/api/")),
        "pending directories of the skipped target are dropped"
    );
    assert!(requested.contains(&"y/item29".to_string()));
    assert!(requested.contains(&"y/api/item29".to_string()));
    assert!(output.export().contains("Target skipped by the user"));
}

#[tokio::test]
async fn test_failed_save_returns_to_the_menu() {
    let dir = tempfile::tempdir().expect("tempdir");
    let words: Vec<String> = (0..40).map(|i| format!("w{i:02}")).collect();
    let word_refs: Vec<&str> = words.iter().map(String::as_str).collect();
    let wordlist = write_wordlist(dir.path(), &word_refs);
    let report_path = dir.path().join("report.json");

    let occupied = dir.path().join("occupied");
    std::fs::write(&occupied, "not a directory").expect("write");
    let unwritable = occupied.join("scan.session");

    let mut site = FakeSite::with_pages(&[("w01", 200)]);
    site.delay = Duration::from_millis(10);

    let mut config = test_config(&["http://x/".to_string()], wordlist);
    config.threads = 1;
    config.output_file = Some(report_path.to_string_lossy().into_owned());
    config.output_format = dirhound::models::OutputFormat::Json;

    let bad_path = unwritable.to_string_lossy().into_owned();
    let (console, output, interrupts) = console(&["q", "s", &bad_path, "q", "q"]);
    let mut controller = Controller::new(config, Arc::new(site.clone()), console).expect("controller");
    interrupt_after(&site, 6, interrupts);

    let outcome = controller.run().await.expect("run");
    assert_eq!(outcome, ScanOutcome::Aborted("Canceled by the user".to_string()));
    assert!(!unwritable.exists());
    assert!(output.export().contains("Couldn't save the session"));

    let report: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&report_path).expect("report"))
            .expect("json");
    assert_eq!(report["reports"][0]["completed"], true);
    assert_eq!(report["reports"][0]["results"][0]["path"], "w01");
}

#[tokio::test]
async fn test_interrupt_at_the_prompt_quits() {
    let dir = tempfile::tempdir().expect("tempdir");
    let words: Vec<String> = (0..30).map(|i| format!("w{i}")).collect();
    let word_refs: Vec<&str> = words.iter().map(String::as_str).collect();
    let wordlist = write_wordlist(dir.path(), &word_refs);

    let mut site = FakeSite::default();
    site.delay = Duration::from_millis(10);
    let config = test_config(&["http://x/".to_string()], wordlist);

    let (console, _output, interrupts) = console_with(Box::new(SilentPrompt));
    interrupts.send(()).await.expect("send");
    interrupts.send(()).await.expect("send");
    let mut controller = Controller::new(config, Arc::new(site), console).expect("controller");

    let outcome = controller.run().await.expect("run");
    assert_eq!(outcome, ScanOutcome::Aborted("Canceled by the user".to_string()));
}
