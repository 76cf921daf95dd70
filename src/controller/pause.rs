//! Interactive pause menu entered on CTRL+C

use crate::controller::Controller;
use crate::error::{DirhoundError, Result};
use crate::fuzzer::Fuzzer;
use crate::session::DEFAULT_SESSION_FILE;
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader, Stdin};
use tracing::debug;

/// Grace period for in-flight probes, checked in short steps
const SETTLE_STEP: Duration = Duration::from_millis(350);
const SETTLE_STEPS: usize = 7;

/// Source of operator answers
#[async_trait]
pub trait Prompt: Send {
    /// Reads one answer without its line terminator
    async fn read_line(&mut self) -> Result<String>;
}

/// Reads answers from standard input
pub struct StdinPrompt {
    reader: BufReader<Stdin>,
}

impl StdinPrompt {
    pub fn new() -> Self {
        Self {
            reader: BufReader::new(tokio::io::stdin()),
        }
    }
}

impl Default for StdinPrompt {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Prompt for StdinPrompt {
    async fn read_line(&mut self) -> Result<String> {
        let mut line = String::new();
        if self.reader.read_line(&mut line).await? == 0 {
            return Err(DirhoundError::InputClosed);
        }
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }
}

/// What the operator chose in the pause menu
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PauseDecision {
    Continue,
    /// End the current round and move to the next directory
    Next,
    SkipTarget,
    /// Quit; `session_file` is set when the session was saved there
    Quit { session_file: Option<PathBuf> },
}

impl Controller {
    /// Pauses dispatch and asks the operator what to do next
    pub(super) async fn handle_pause(&mut self, fuzzer: &Fuzzer) -> Result<PauseDecision> {
        self.output
            .warning("CTRL+C detected: Pausing threads, please wait...", false);
        fuzzer.pause();

        for _ in 0..SETTLE_STEPS {
            if fuzzer.is_stopped() {
                break;
            }
            tokio::time::sleep(SETTLE_STEP).await;
        }
        if !fuzzer.is_stopped() {
            debug!("Probes still in flight after the grace period");
        }

        loop {
            let next_directory = !self.state.queue().is_empty();
            let skip_target = !self.targets.is_empty();

            let mut menu = "[q]uit / [c]ontinue".to_string();
            if next_directory {
                menu.push_str(" / [n]ext");
            }
            if skip_target {
                menu.push_str(" / [s]kip target");
            }
            self.output.in_line(&format!("{menu}: "));

            let Some(answer) = self.ask().await? else {
                return Ok(PauseDecision::Quit { session_file: None });
            };
            match answer.trim().to_lowercase().as_str() {
                "q" => {
                    if let Some(decision) = self.quit_menu(fuzzer).await? {
                        return Ok(decision);
                    }
                }
                "c" => {
                    fuzzer.resume();
                    return Ok(PauseDecision::Continue);
                }
                "n" if next_directory => return Ok(PauseDecision::Next),
                "s" if skip_target => return Ok(PauseDecision::SkipTarget),
                _ => {}
            }
        }
    }

    /// `None` re-offers the main menu
    async fn quit_menu(&mut self, fuzzer: &Fuzzer) -> Result<Option<PauseDecision>> {
        self.output.in_line("[s]ave / [q]uit without saving: ");

        let Some(answer) = self.ask().await? else {
            return Ok(Some(PauseDecision::Quit { session_file: None }));
        };
        match answer.trim().to_lowercase().as_str() {
            "q" => Ok(Some(PauseDecision::Quit { session_file: None })),
            "s" => {
                self.output
                    .in_line(&format!("Save to file [{DEFAULT_SESSION_FILE}]: "));
                let Some(answer) = self.ask().await? else {
                    return Ok(Some(PauseDecision::Quit { session_file: None }));
                };
                let file = match answer.trim() {
                    "" => PathBuf::from(DEFAULT_SESSION_FILE),
                    other => PathBuf::from(other),
                };

                // every dispatched entry must be recorded before the cursor is saved
                while !fuzzer.is_stopped() {
                    tokio::time::sleep(SETTLE_STEP).await;
                }
                match self.snapshot().save(&file) {
                    Ok(()) => Ok(Some(PauseDecision::Quit {
                        session_file: Some(file),
                    })),
                    Err(e) => {
                        self.output.error(&format!(
                            "Couldn't save the session to {}: {e}",
                            file.display()
                        ));
                        Ok(None)
                    }
                }
            }
            _ => Ok(None),
        }
    }

    /// Reads one answer; `None` when CTRL+C is pressed again at the prompt
    async fn ask(&mut self) -> Result<Option<String>> {
        tokio::select! {
            line = self.prompt.read_line() => line.map(Some),
            Some(()) = self.interrupts.recv() => Ok(None),
        }
    }
}
