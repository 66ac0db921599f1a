//! Shared fixtures for toneset-engine integration tests
//!
//! - `ThresholdPlayer`: deterministic listener that hears everything at or above
//!   a fixed volume, with optional pause or fault injection on the Nth play
//! - `instant_context`: session context with no waiting and an in-memory sink

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use toneset_engine::config::{CalibrationConfig, FloorConfig, RampConfig, TrialTiming};
use toneset_engine::error::{Error, Result};
use toneset_engine::player::StimulusPlayer;
use toneset_engine::sink::MemorySink;
use toneset_engine::tone::{Direction, StimulusKind, Tone};
use toneset_engine::trial::AnswerCode;
use toneset_engine::{Protocol, Session, SessionContext, TestOrchestrator};

pub const FREQUENCIES: [f64; 3] = [500.0, 1000.0, 2000.0];

/// What to do on a given play
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Injection {
    Pause,
    Fault,
}

/// Hears any tone at or above `threshold` and answers with its direction
pub struct ThresholdPlayer {
    session: Arc<Session>,
    threshold: f64,
    plays: usize,
    injections: Vec<(usize, Injection)>,
}

impl ThresholdPlayer {
    pub fn new(session: Arc<Session>, threshold: f64) -> Self {
        Self {
            session,
            threshold,
            plays: 0,
            injections: Vec::new(),
        }
    }

    /// Pause the session during the `play`th play (1-based)
    pub fn pause_at(mut self, play: usize) -> Self {
        self.injections.push((play, Injection::Pause));
        self
    }

    /// Fail the `play`th play with a playback error
    pub fn fault_at(mut self, play: usize) -> Self {
        self.injections.push((play, Injection::Fault));
        self
    }
}

impl StimulusPlayer for ThresholdPlayer {
    fn play(&mut self, tone: &Tone, _duration: Duration) -> Result<()> {
        self.plays += 1;
        match self.injections.iter().find(|(n, _)| *n == self.plays) {
            Some((_, Injection::Fault)) => {
                return Err(Error::Playback("output device disappeared".to_string()));
            }
            Some((_, Injection::Pause)) => {
                self.session.pause();
            }
            None => {}
        }

        if tone.volume() >= self.threshold {
            let answer = match tone.direction() {
                Direction::Flat => AnswerCode::Heard,
                direction => AnswerCode::from_direction(direction),
            };
            self.session.respond(answer);
        }
        Ok(())
    }

    fn stop(&mut self) {}
}

/// Context that never sleeps, logging into a shared in-memory sink
pub fn instant_context(session: &Arc<Session>, player: ThresholdPlayer) -> (SessionContext, MemorySink) {
    let sink = MemorySink::new();
    let ctx = SessionContext::new(Arc::clone(session), player, sink.clone())
        .with_timing(TrialTiming::instant())
        .with_seed(7);
    (ctx, sink)
}

pub fn instant_ramp() -> RampConfig {
    RampConfig {
        slice_ms: 0,
        settle_ms: 0,
        ..RampConfig::default()
    }
}

/// Small orchestrator over [`FREQUENCIES`] with no waiting
pub fn orchestrator(protocol: Protocol) -> TestOrchestrator {
    TestOrchestrator::from_parts(
        protocol,
        StimulusKind::Single,
        FREQUENCIES.to_vec(),
        0,
        instant_ramp(),
        FloorConfig::default(),
        CalibrationConfig {
            volumes_per_frequency: 4,
            trials_per_volume: 3,
            boost: 1.2,
        },
    )
    .unwrap()
}

/// Lines in the sink that record a finished trial or measurement
pub fn data_lines(lines: &[String]) -> Vec<&String> {
    lines.iter().filter(|l| !l.contains("===")).collect()
}
