//! # Session Context
//!
//! **Purpose:** Everything a phase needs to run trials, passed explicitly by
//! `&mut` instead of living in global state: the shared [`Session`], the stimulus
//! player, the result sink, the event bus, timing and the trial RNG.
//!
//! [`SessionContext::present`] is the single trial runner used by every
//! fixed-length phase. It guarantees that a trial interrupted by pause or stop is
//! discarded and never reaches the results.

use crate::config::TrialTiming;
use crate::error::Result;
use crate::player::{NoiseController, NoiseSpec, SilentNoise, StimulusPlayer};
use crate::sink::ResultSink;
use crate::state::{Session, WaitOutcome};
use crate::tone::Tone;
use crate::trial::{ResponseMode, Trial};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use std::time::Duration;
use toneset_common::events::{EventBus, PauseReason, SessionEvent};
use toneset_common::time;
use tracing::{debug, warn};
use uuid::Uuid;

/// Result of presenting one trial
#[derive(Debug, Clone, PartialEq)]
pub enum TrialOutcome {
    /// Window closed normally; the trial is finalized
    Completed(Trial),
    /// Pause or stop arrived; nothing was recorded
    Interrupted,
}

/// Identity written at the start of every result-sink line
#[derive(Debug, Clone, PartialEq)]
pub struct SessionLabel {
    pub subject_id: u32,
    pub test: String,
    pub noise: NoiseSpec,
}

impl Default for SessionLabel {
    fn default() -> Self {
        Self {
            subject_id: 0,
            test: "calibration".to_string(),
            noise: NoiseSpec::none(),
        }
    }
}

/// Explicit per-session state handed to every phase
pub struct SessionContext {
    session_id: Uuid,
    session: Arc<Session>,
    player: Box<dyn StimulusPlayer>,
    noise: Box<dyn NoiseController>,
    sink: Box<dyn ResultSink>,
    events: EventBus,
    timing: TrialTiming,
    rng: StdRng,
    label: SessionLabel,
    trials_recorded: usize,
    sink_failures: usize,
}

impl SessionContext {
    /// Context with default timing, a silent noise controller and an entropy-seeded RNG
    pub fn new<P, S>(session: Arc<Session>, player: P, sink: S) -> Self
    where
        P: StimulusPlayer + 'static,
        S: ResultSink + 'static,
    {
        Self {
            session_id: Uuid::new_v4(),
            session,
            player: Box::new(player),
            noise: Box::new(SilentNoise::new()),
            sink: Box::new(sink),
            events: EventBus::new(256),
            timing: TrialTiming::default(),
            rng: StdRng::from_entropy(),
            label: SessionLabel::default(),
            trials_recorded: 0,
            sink_failures: 0,
        }
    }

    pub fn with_timing(mut self, timing: TrialTiming) -> Self {
        self.timing = timing;
        self
    }

    /// Deterministic trial ordering
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    pub fn with_label(mut self, label: SessionLabel) -> Self {
        self.label = label;
        self
    }

    pub fn with_noise<N: NoiseController + 'static>(mut self, noise: N) -> Self {
        self.noise = Box::new(noise);
        self
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn timing(&self) -> &TrialTiming {
        &self.timing
    }

    pub fn label(&self) -> &SessionLabel {
        &self.label
    }

    pub fn rng(&mut self) -> &mut StdRng {
        &mut self.rng
    }

    pub fn player(&mut self) -> &mut dyn StimulusPlayer {
        self.player.as_mut()
    }

    pub fn trials_recorded(&self) -> usize {
        self.trials_recorded
    }

    pub fn sink_failures(&self) -> usize {
        self.sink_failures
    }

    /// Start a fresh session identity (same collaborators)
    pub fn renew_session_id(&mut self) -> Uuid {
        self.session_id = Uuid::new_v4();
        self.trials_recorded = 0;
        self.session_id
    }

    /// Append a line to the sink with the subject/test/noise prefix
    ///
    /// Sink failures are logged and counted, never propagated.
    pub fn log(&mut self, line: &str) {
        let full = format!(
            "{} Subject {}, Test {}, Noise {}, {}",
            time::log_timestamp(time::now()),
            self.label.subject_id,
            self.label.test,
            self.label.noise,
            line
        );
        if let Err(e) = self.sink.append(&full) {
            self.sink_failures += 1;
            warn!("Result sink write failed (session continues): {}", e);
        }
    }

    pub fn emit(&self, event: SessionEvent) {
        self.events.emit_lossy(event);
    }

    pub fn start_noise(&mut self) -> Result<()> {
        let noise = self.label.noise.clone();
        self.noise.play(&noise)
    }

    pub fn stop_noise(&mut self) {
        self.noise.stop();
    }

    /// Mark the start of a phase in the sink and on the event bus
    pub fn phase_started(&mut self, phase: &str) {
        self.log(&format!("=== {} started ===", phase));
        self.emit(SessionEvent::PhaseStarted {
            session_id: self.session_id,
            phase: phase.to_string(),
            timestamp: time::now(),
        });
    }

    pub fn phase_completed(&mut self, phase: &str) {
        self.log(&format!("=== {} complete ===", phase));
        self.emit(SessionEvent::PhaseCompleted {
            session_id: self.session_id,
            phase: phase.to_string(),
            timestamp: time::now(),
        });
    }

    pub fn session_started(&mut self) {
        self.log(&format!("=== session {} started ===", self.session_id));
        self.emit(SessionEvent::SessionStarted {
            session_id: self.session_id,
            test: self.label.test.clone(),
            timestamp: time::now(),
        });
    }

    pub fn session_completed(&mut self) {
        self.log(&format!("=== session complete, {} trials ===", self.trials_recorded));
        self.emit(SessionEvent::SessionCompleted {
            session_id: self.session_id,
            trials: self.trials_recorded,
            timestamp: time::now(),
        });
    }

    /// Announce that the session thread observed a pause
    pub fn paused(&mut self) {
        let reason = match self.session.fault_message() {
            Some(message) => PauseReason::Fault { message },
            None => PauseReason::Requested,
        };
        self.log("=== paused ===");
        self.emit(SessionEvent::SessionPaused {
            session_id: self.session_id,
            reason,
            timestamp: time::now(),
        });
    }

    pub fn resumed(&mut self) {
        self.log("=== resumed ===");
        self.emit(SessionEvent::SessionResumed {
            session_id: self.session_id,
            timestamp: time::now(),
        });
    }

    /// Write and announce one finalized trial
    pub fn record(&mut self, phase: &str, trial: &Trial) {
        self.trials_recorded += 1;
        self.log(&trial.log_line());
        self.emit(SessionEvent::TrialCompleted {
            session_id: self.session_id,
            phase: phase.to_string(),
            frequency: trial.tone().frequency(),
            volume: trial.tone().volume(),
            correct: trial.correct().unwrap_or(false),
            timestamp: time::now(),
        });
    }

    /// Record a non-trial measurement (e.g. a ramp result) as a completed step
    pub fn record_measurement(&mut self, phase: &str, line: &str, frequency: f64, volume: f64) {
        self.trials_recorded += 1;
        self.log(line);
        self.emit(SessionEvent::TrialCompleted {
            session_id: self.session_id,
            phase: phase.to_string(),
            frequency,
            volume,
            correct: true,
            timestamp: time::now(),
        });
    }

    /// Silent random gap before a trial; false if interrupted
    pub fn inter_trial_gap(&mut self) -> bool {
        let (min, max) = (self.timing.gap_min_ms, self.timing.gap_max_ms);
        let gap = if max > min { self.rng.gen_range(min..=max) } else { min };
        self.session.wait_window(Duration::from_millis(gap)) != WaitOutcome::Interrupted
    }

    /// Silence of a fixed length; false if interrupted
    pub fn pause_for(&mut self, duration: Duration) -> bool {
        self.session.wait_window(duration) != WaitOutcome::Interrupted
    }

    /// Present one trial and wait out its response window
    ///
    /// Returns [`TrialOutcome::Interrupted`] without recording anything if pause or
    /// stop is seen before, during or after playback. Playback errors close the
    /// trial and propagate.
    pub fn present(&mut self, tone: &Tone, mode: ResponseMode) -> Result<TrialOutcome> {
        if self.session.is_interrupted() {
            return Ok(TrialOutcome::Interrupted);
        }

        let trial = Trial::start(tone.clone());
        self.session.begin_trial();
        debug!("Presenting {}", tone);

        if let Err(e) = self.player.play(tone, self.timing.tone_duration()) {
            self.session.abort_trial();
            return Err(e);
        }

        let outcome = if self.session.is_interrupted() {
            WaitOutcome::Interrupted
        } else {
            self.session.wait_window(self.timing.response_grace())
        };

        if outcome == WaitOutcome::Interrupted {
            self.player.stop();
            self.session.abort_trial();
            debug!("Discarded interrupted trial for {}", tone);
            return Ok(TrialOutcome::Interrupted);
        }

        let responses = self.session.end_trial();
        Ok(TrialOutcome::Completed(trial.finalize(responses, mode)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::sink::MemorySink;
    use crate::trial::AnswerCode;

    /// Player that answers every tone and optionally pauses mid-playback
    struct EchoPlayer {
        session: Arc<Session>,
        pause_on_play: bool,
        fail: bool,
    }

    impl StimulusPlayer for EchoPlayer {
        fn play(&mut self, _tone: &Tone, _duration: Duration) -> Result<()> {
            if self.fail {
                return Err(Error::Playback("no output device".to_string()));
            }
            self.session.respond(AnswerCode::Heard);
            if self.pause_on_play {
                self.session.pause();
            }
            Ok(())
        }

        fn stop(&mut self) {}
    }

    fn context(pause_on_play: bool, fail: bool) -> (SessionContext, MemorySink) {
        let session = Arc::new(Session::new());
        let sink = MemorySink::new();
        let player = EchoPlayer {
            session: Arc::clone(&session),
            pause_on_play,
            fail,
        };
        let ctx = SessionContext::new(session, player, sink.clone())
            .with_timing(TrialTiming::instant())
            .with_seed(1);
        (ctx, sink)
    }

    #[test]
    fn test_present_completes_trial() {
        let (mut ctx, _) = context(false, false);
        let tone = Tone::single(500.0, 3.0).unwrap();
        match ctx.present(&tone, ResponseMode::Detection).unwrap() {
            TrialOutcome::Completed(trial) => assert_eq!(trial.correct(), Some(true)),
            TrialOutcome::Interrupted => panic!("trial should complete"),
        }
    }

    #[test]
    fn test_present_discards_trial_paused_mid_playback() {
        let (mut ctx, _) = context(true, false);
        let tone = Tone::single(500.0, 3.0).unwrap();
        assert_eq!(
            ctx.present(&tone, ResponseMode::Detection).unwrap(),
            TrialOutcome::Interrupted
        );
        // Nothing left open on the session
        ctx.session().resume();
        assert!(!ctx.session().respond(AnswerCode::Heard));
    }

    #[test]
    fn test_present_refuses_when_paused() {
        let (mut ctx, _) = context(false, false);
        ctx.session().pause();
        let tone = Tone::single(500.0, 3.0).unwrap();
        assert_eq!(
            ctx.present(&tone, ResponseMode::Detection).unwrap(),
            TrialOutcome::Interrupted
        );
    }

    #[test]
    fn test_present_propagates_playback_fault() {
        let (mut ctx, _) = context(false, true);
        let tone = Tone::single(500.0, 3.0).unwrap();
        let err = ctx.present(&tone, ResponseMode::Detection).unwrap_err();
        assert!(err.is_fault());
    }

    #[test]
    fn test_log_prefix() {
        let (mut ctx, sink) = context(false, false);
        ctx = ctx.with_label(SessionLabel {
            subject_id: 4,
            test: "calibration".to_string(),
            noise: NoiseSpec::none(),
        });
        ctx.log("hello");
        let lines = sink.lines();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].ends_with("Subject 4, Test calibration, Noise None, hello"));
    }
}
