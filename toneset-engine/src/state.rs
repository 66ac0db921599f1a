//! Shared session state
//!
//! The UI boundary (response source, pause button) and the session thread share a
//! single [`Session`]: one mutex over the answer/pause/running flags plus a condvar.
//! Every producer call notifies the condvar, so the session thread blocks in
//! `wait_*` instead of polling and wakes immediately on a response, pause,
//! resume or stop.
//!
//! Responses are only accepted while a trial is open; anything arriving between
//! trials is dropped so it can never be credited to the next stimulus.

use crate::error::{Error, Result};
use crate::trial::{AnswerCode, ResponseEvent};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Why a wait on the session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The open trial received a response
    Responded,
    /// Pause or stop was requested
    Interrupted,
    /// The full timeout passed
    Elapsed,
}

#[derive(Debug, Default)]
struct SessionFlags {
    last_answer: AnswerCode,
    responses: Vec<ResponseEvent>,
    trial_start: Option<Instant>,
    paused: bool,
    running: bool,
    stop_requested: bool,
    fault: Option<String>,
}

impl SessionFlags {
    fn interrupted(&self) -> bool {
        self.paused || self.stop_requested
    }
}

/// State shared between the session thread and the response source
#[derive(Debug, Default)]
pub struct Session {
    flags: Mutex<SessionFlags>,
    condvar: Condvar,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, SessionFlags> {
        self.flags.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // === Response source side ===

    /// Record a subject response; returns false when no trial is open
    pub fn respond(&self, answer: AnswerCode) -> bool {
        let accepted = {
            let mut flags = self.lock();
            match flags.trial_start {
                Some(start) if !flags.interrupted() => {
                    flags.responses.push(ResponseEvent {
                        offset: start.elapsed(),
                        answer,
                    });
                    flags.last_answer = answer;
                    true
                }
                _ => false,
            }
        };
        if accepted {
            self.condvar.notify_all();
        } else {
            debug!("Ignoring {} response outside an open trial", answer);
        }
        accepted
    }

    /// Request a pause; returns true if the session was not already paused
    pub fn pause(&self) -> bool {
        let changed = {
            let mut flags = self.lock();
            !std::mem::replace(&mut flags.paused, true)
        };
        self.condvar.notify_all();
        if changed {
            info!("Session paused");
        }
        changed
    }

    /// Clear the pause flag; returns true if the session was paused
    pub fn resume(&self) -> bool {
        let changed = {
            let mut flags = self.lock();
            flags.fault = None;
            std::mem::replace(&mut flags.paused, false)
        };
        self.condvar.notify_all();
        if changed {
            info!("Session resumed");
        }
        changed
    }

    /// Ask the session thread to exit at the next boundary
    pub fn request_stop(&self) {
        self.lock().stop_requested = true;
        self.condvar.notify_all();
    }

    pub fn is_paused(&self) -> bool {
        self.lock().paused
    }

    /// Paused or stopping
    pub fn is_interrupted(&self) -> bool {
        self.lock().interrupted()
    }

    pub fn is_running(&self) -> bool {
        self.lock().running
    }

    pub fn is_stop_requested(&self) -> bool {
        self.lock().stop_requested
    }

    pub fn last_answer(&self) -> AnswerCode {
        self.lock().last_answer
    }

    // === Session thread side ===

    /// Claim the session for a new run; fails if one is already running
    pub fn try_begin(&self) -> Result<()> {
        let mut flags = self.lock();
        if flags.running {
            return Err(Error::SessionActive(
                "a test session is already running".to_string(),
            ));
        }
        flags.running = true;
        flags.stop_requested = false;
        Ok(())
    }

    /// Release the session after a run ends
    pub fn end(&self) {
        {
            let mut flags = self.lock();
            flags.running = false;
            flags.trial_start = None;
            flags.responses.clear();
        }
        self.condvar.notify_all();
    }

    /// Pause because of a playback or response-channel fault
    pub fn fault(&self, message: impl Into<String>) {
        {
            let mut flags = self.lock();
            flags.paused = true;
            flags.fault = Some(message.into());
        }
        self.condvar.notify_all();
    }

    /// Fault message behind the current pause, if any
    pub fn fault_message(&self) -> Option<String> {
        self.lock().fault.clone()
    }

    /// Open a trial: clears earlier responses and starts the response clock
    pub fn begin_trial(&self) {
        let mut flags = self.lock();
        flags.trial_start = Some(Instant::now());
        flags.responses.clear();
        flags.last_answer = AnswerCode::None;
    }

    /// Close the trial and take its responses
    pub fn end_trial(&self) -> Vec<ResponseEvent> {
        let mut flags = self.lock();
        flags.trial_start = None;
        std::mem::take(&mut flags.responses)
    }

    /// Close the trial and discard its responses
    pub fn abort_trial(&self) {
        let mut flags = self.lock();
        flags.trial_start = None;
        flags.responses.clear();
    }

    /// Current state without waiting
    pub fn poll(&self) -> WaitOutcome {
        let flags = self.lock();
        if flags.interrupted() {
            WaitOutcome::Interrupted
        } else if !flags.responses.is_empty() {
            WaitOutcome::Responded
        } else {
            WaitOutcome::Elapsed
        }
    }

    /// Wait up to `timeout` for a response, waking early on pause or stop
    pub fn wait_for_response(&self, timeout: Duration) -> WaitOutcome {
        let guard = self.lock();
        let (flags, _) = self
            .condvar
            .wait_timeout_while(guard, timeout, |f| !f.interrupted() && f.responses.is_empty())
            .unwrap_or_else(PoisonError::into_inner);
        if flags.interrupted() {
            WaitOutcome::Interrupted
        } else if !flags.responses.is_empty() {
            WaitOutcome::Responded
        } else {
            WaitOutcome::Elapsed
        }
    }

    /// Wait the whole of `timeout` unless paused or stopped
    ///
    /// Responses do not end the wait; they accumulate on the open trial.
    pub fn wait_window(&self, timeout: Duration) -> WaitOutcome {
        let guard = self.lock();
        let (flags, _) = self
            .condvar
            .wait_timeout_while(guard, timeout, |f| !f.interrupted())
            .unwrap_or_else(PoisonError::into_inner);
        if flags.interrupted() {
            WaitOutcome::Interrupted
        } else {
            WaitOutcome::Elapsed
        }
    }

    /// Block while paused; returns false if a stop was requested instead
    pub fn wait_until_resumed(&self) -> bool {
        let mut flags = self.lock();
        while flags.paused && !flags.stop_requested {
            flags = self
                .condvar
                .wait(flags)
                .unwrap_or_else(PoisonError::into_inner);
        }
        !flags.stop_requested
    }
}
