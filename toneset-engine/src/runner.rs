//! # Session Runner
//!
//! **Purpose:** Run one session task on a dedicated worker thread.
//!
//! The worker owns the task and its [`SessionContext`]. The subject-facing side
//! talks to it only through a [`SessionHandle`] (responses, pause, resume, stop),
//! which writes into the shared [`Session`]. While paused the worker blocks on the
//! session condvar; nothing spins.
//!
//! Only one runner can hold a given [`Session`] at a time.

use crate::context::SessionContext;
use crate::error::{Error, Result};
use crate::phases::PhaseOutcome;
use crate::state::Session;
use crate::trial::AnswerCode;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{error, info, warn};

/// A unit of work the runner can drive to completion across pauses
pub trait SessionTask: Send {
    /// Test name used for thread naming and logs
    fn name(&self) -> &'static str;

    /// Run until the task completes or the session is interrupted
    fn advance(&mut self, ctx: &mut SessionContext) -> Result<PhaseOutcome>;

    fn is_complete(&self) -> bool;
}

/// Subject-facing controls for a running session
#[derive(Debug, Clone)]
pub struct SessionHandle {
    session: Arc<Session>,
}

impl SessionHandle {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    /// Deliver a subject response; false if no trial was open to receive it
    pub fn respond(&self, answer: AnswerCode) -> bool {
        self.session.respond(answer)
    }

    pub fn pause(&self) -> bool {
        self.session.pause()
    }

    pub fn resume(&self) -> bool {
        self.session.resume()
    }

    /// Stop the session at the next trial boundary
    pub fn stop(&self) {
        self.session.request_stop();
    }

    pub fn is_paused(&self) -> bool {
        self.session.is_paused()
    }

    pub fn is_running(&self) -> bool {
        self.session.is_running()
    }
}

/// What a finished worker hands back
pub struct Finished<T> {
    pub task: T,
    pub context: SessionContext,
    /// False when the session was stopped before the task completed
    pub completed: bool,
}

pub struct SessionRunner<T> {
    session: Arc<Session>,
    thread: Option<JoinHandle<Result<Finished<T>>>>,
}

impl<T: SessionTask + 'static> SessionRunner<T> {
    /// Claim the session, start background noise and launch the worker
    pub fn spawn(task: T, mut ctx: SessionContext) -> Result<Self> {
        let session = Arc::clone(ctx.session());
        session.try_begin()?;

        if let Err(e) = ctx.start_noise() {
            session.end();
            return Err(e);
        }

        let name = format!("toneset-{}", task.name());
        let spawned = thread::Builder::new()
            .name(name)
            .spawn(move || Self::worker(task, ctx));

        match spawned {
            Ok(handle) => Ok(Self {
                session,
                thread: Some(handle),
            }),
            Err(e) => {
                session.end();
                Err(Error::Io(e))
            }
        }
    }

    pub fn handle(&self) -> SessionHandle {
        SessionHandle::new(Arc::clone(&self.session))
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Ask the worker to exit at the next boundary
    pub fn stop(&self) {
        self.session.request_stop();
    }

    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().map_or(true, |h| h.is_finished())
    }

    /// Wait for the worker and take back the task and context
    pub fn join(mut self) -> Result<Finished<T>> {
        let handle = self
            .thread
            .take()
            .ok_or_else(|| Error::InvalidState("session worker already joined".to_string()))?;
        handle
            .join()
            .map_err(|_| Error::Internal("session worker panicked".to_string()))?
    }

    fn worker(mut task: T, mut ctx: SessionContext) -> Result<Finished<T>> {
        let session = Arc::clone(ctx.session());
        info!("Session {} ({}) started", ctx.session_id(), task.name());

        let delay = ctx.timing().start_delay();
        ctx.pause_for(delay);

        let result = Self::drive(&mut task, &mut ctx, &session);

        ctx.stop_noise();
        session.end();

        match result {
            Ok(completed) => {
                info!(
                    "Session {} ({}) {} after {} trials",
                    ctx.session_id(),
                    task.name(),
                    if completed { "completed" } else { "stopped" },
                    ctx.trials_recorded()
                );
                Ok(Finished {
                    task,
                    context: ctx,
                    completed,
                })
            }
            Err(e) => {
                error!("Session {} failed: {}", ctx.session_id(), e);
                Err(e)
            }
        }
    }

    /// Trial loop; true when the task completed, false when stopped
    fn drive(task: &mut T, ctx: &mut SessionContext, session: &Session) -> Result<bool> {
        let mut paused = false;
        loop {
            if !session.wait_until_resumed() {
                return Ok(false);
            }
            if paused {
                ctx.resumed();
                paused = false;
            }

            match task.advance(ctx)? {
                PhaseOutcome::Completed => return Ok(true),
                PhaseOutcome::Paused => {
                    if session.is_stop_requested() {
                        return Ok(false);
                    }
                    if let Some(fault) = session.fault_message() {
                        warn!("Session paused by fault: {}", fault);
                    }
                    ctx.paused();
                    paused = true;
                }
            }
        }
    }
}

impl<T> Drop for SessionRunner<T> {
    fn drop(&mut self) {
        if let Some(handle) = self.thread.take() {
            self.session.request_stop();
            if handle.join().is_err() {
                warn!("Session worker panicked during shutdown");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TrialTiming;
    use crate::player::StimulusPlayer;
    use crate::sink::MemorySink;
    use crate::tone::Tone;
    use std::time::Duration;

    struct NullPlayer;

    impl StimulusPlayer for NullPlayer {
        fn play(&mut self, _tone: &Tone, _duration: Duration) -> Result<()> {
            Ok(())
        }
        fn stop(&mut self) {}
    }

    /// Completes after a fixed number of advances, pausing in between
    struct CountingTask {
        advances: usize,
        pauses_left: usize,
    }

    impl SessionTask for CountingTask {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn advance(&mut self, ctx: &mut SessionContext) -> Result<PhaseOutcome> {
            self.advances += 1;
            if self.pauses_left > 0 {
                self.pauses_left -= 1;
                ctx.session().pause();
                return Ok(PhaseOutcome::Paused);
            }
            Ok(PhaseOutcome::Completed)
        }

        fn is_complete(&self) -> bool {
            self.pauses_left == 0
        }
    }

    fn context(session: Arc<Session>) -> SessionContext {
        SessionContext::new(session, NullPlayer, MemorySink::new()).with_timing(TrialTiming::instant())
    }

    #[test]
    fn test_runner_completes_task() {
        let session = Arc::new(Session::new());
        let task = CountingTask {
            advances: 0,
            pauses_left: 0,
        };
        let runner = SessionRunner::spawn(task, context(Arc::clone(&session))).unwrap();
        let finished = runner.join().unwrap();
        assert!(finished.completed);
        assert_eq!(finished.task.advances, 1);
        assert!(!session.is_running());
    }

    #[test]
    fn test_only_one_session_at_a_time() {
        let session = Arc::new(Session::new());
        session.pause();
        let first = SessionRunner::spawn(
            CountingTask {
                advances: 0,
                pauses_left: 0,
            },
            context(Arc::clone(&session)),
        )
        .unwrap();

        let second = SessionRunner::spawn(
            CountingTask {
                advances: 0,
                pauses_left: 0,
            },
            context(Arc::clone(&session)),
        );
        assert!(matches!(second, Err(Error::SessionActive(_))));

        first.handle().resume();
        assert!(first.join().unwrap().completed);
    }

    #[test]
    fn test_runner_resumes_after_pause() {
        let session = Arc::new(Session::new());
        let runner = SessionRunner::spawn(
            CountingTask {
                advances: 0,
                pauses_left: 1,
            },
            context(Arc::clone(&session)),
        )
        .unwrap();

        while !session.is_paused() {
            thread::sleep(Duration::from_millis(1));
        }
        runner.handle().resume();
        let finished = runner.join().unwrap();
        assert!(finished.completed);
        assert_eq!(finished.task.advances, 2);
    }

    #[test]
    fn test_stop_while_paused_ends_session() {
        let session = Arc::new(Session::new());
        session.pause();
        let runner = SessionRunner::spawn(
            CountingTask {
                advances: 0,
                pauses_left: 0,
            },
            context(Arc::clone(&session)),
        )
        .unwrap();
        runner.stop();
        let finished = runner.join().unwrap();
        assert!(!finished.completed);
        assert_eq!(finished.task.advances, 0);
    }
}
