//! Supervision of a running probe round

use crate::controller::pause::PauseDecision;
use crate::controller::{Controller, Flow};
use crate::error::DirhoundError;
use crate::fuzzer::Fuzzer;
use std::time::Duration;
use tracing::debug;

/// Longest the supervisor waits before re-checking cancellation
pub const POLL_INTERVAL: Duration = Duration::from_millis(300);

pub const MAX_TIME_REASON: &str = "Canceled because the runtime exceeded the maximum set by user";

enum Event {
    Tick { finished: bool },
    Interrupt,
}

impl Controller {
    /// Polls the round until it completes or a cancellation condition fires
    pub(super) async fn supervise(&mut self, fuzzer: &mut Fuzzer) -> Flow {
        loop {
            let event = tokio::select! {
                finished = fuzzer.wait(POLL_INTERVAL) => Event::Tick { finished },
                Some(()) = self.interrupts.recv() => Event::Interrupt,
            };

            match event {
                Event::Tick { finished: true } => return Flow::Continue,
                Event::Tick { finished: false } => {
                    if let Some(flow) = self.cancellation() {
                        return flow;
                    }
                }
                Event::Interrupt => match self.handle_pause(fuzzer).await {
                    Ok(PauseDecision::Continue) => {}
                    Ok(PauseDecision::Next) => {
                        debug!("Round ended early by the operator");
                        fuzzer.stop();
                        return Flow::Continue;
                    }
                    Ok(PauseDecision::SkipTarget) => {
                        return Flow::SkipTarget("Target skipped by the user".to_string())
                    }
                    Ok(PauseDecision::Quit { session_file: None }) => {
                        return Flow::FullAbort("Canceled by the user".to_string())
                    }
                    Ok(PauseDecision::Quit {
                        session_file: Some(path),
                    }) => return Flow::Suspend(path),
                    Err(DirhoundError::InputClosed) => {
                        return Flow::FullAbort("Input closed, canceled by the user".to_string())
                    }
                    Err(e) => return Flow::FullAbort(format!("Pause menu failed: {e}")),
                },
            }
        }
    }

    /// Timeout, skip and exit conditions, in that order
    pub(super) fn cancellation(&self) -> Option<Flow> {
        let max_time = self.config.max_time_secs;
        if max_time != 0 && self.elapsed() > Duration::from_secs(max_time) {
            self.state.arm_skip(MAX_TIME_REASON.to_string());
        }

        if let Some(reason) = self.state.skip_reason() {
            return Some(Flow::SkipTarget(reason));
        }
        self.state.exit_reason().map(Flow::FullAbort)
    }
}
