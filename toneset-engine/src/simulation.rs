//! Simulated listener
//!
//! A [`StimulusPlayer`] that "hears" tones according to a psychometric function
//! and answers through the shared [`Session`], exactly like a subject pressing a
//! button during playback. Used by the CLI and by end-to-end tests.

use crate::error::{Error, Result};
use crate::interpolate::piecewise_linear;
use crate::player::StimulusPlayer;
use crate::state::Session;
use crate::tone::{Direction, Tone};
use crate::trial::AnswerCode;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::trace;

/// Per-frequency 50% thresholds plus the slope of the psychometric curve
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListenerProfile {
    /// (frequency Hz, volume heard half the time), sorted by frequency
    thresholds: Vec<(f64, f64)>,
    /// Logistic spread on natural-log volume; 0 makes a hard step
    spread: f64,
}

impl Default for ListenerProfile {
    fn default() -> Self {
        Self {
            thresholds: vec![
                (125.0, 400.0),
                (250.0, 200.0),
                (500.0, 100.0),
                (1000.0, 60.0),
                (2000.0, 50.0),
                (4000.0, 60.0),
                (8000.0, 150.0),
            ],
            spread: 0.15,
        }
    }
}

impl ListenerProfile {
    pub fn new(mut thresholds: Vec<(f64, f64)>, spread: f64) -> Result<Self> {
        if thresholds.is_empty() {
            return Err(Error::InvalidInput("listener profile needs at least one threshold".to_string()));
        }
        if thresholds.iter().any(|(f, t)| !(*f > 0.0 && *t > 0.0)) {
            return Err(Error::InvalidInput("listener thresholds must be positive".to_string()));
        }
        if !(spread >= 0.0 && spread.is_finite()) {
            return Err(Error::InvalidInput(format!("invalid listener spread {}", spread)));
        }
        thresholds.sort_by(|a, b| a.0.total_cmp(&b.0));
        Ok(Self { thresholds, spread })
    }

    /// Same threshold at every frequency
    pub fn flat(threshold: f64, spread: f64) -> Result<Self> {
        Self::new(vec![(1000.0, threshold)], spread)
    }

    /// Keep the thresholds, change the slope
    pub fn with_spread(self, spread: f64) -> Result<Self> {
        Self::new(self.thresholds, spread)
    }

    pub fn threshold_at(&self, frequency: f64) -> f64 {
        piecewise_linear(&self.thresholds, frequency).unwrap_or(f64::INFINITY)
    }

    /// Probability that a single frequency at `volume` is heard
    pub fn hearing_probability(&self, frequency: f64, volume: f64) -> f64 {
        let threshold = self.threshold_at(frequency);
        if self.spread == 0.0 {
            return if volume >= threshold { 1.0 } else { 0.0 };
        }
        let z = (volume.ln() - threshold.ln()) / self.spread;
        1.0 / (1.0 + (-z).exp())
    }

    /// Mean hearing probability over the audible notes of a tone
    pub fn tone_probability(&self, tone: &Tone) -> f64 {
        let frequencies = tone.frequencies();
        if frequencies.is_empty() {
            return 0.0;
        }
        let sum: f64 = frequencies
            .iter()
            .map(|f| self.hearing_probability(*f, tone.volume()))
            .sum();
        sum / frequencies.len() as f64
    }
}

/// Answers tones through the session as a listener with a given profile
pub struct SimulatedListener {
    session: Arc<Session>,
    profile: ListenerProfile,
    rng: StdRng,
    /// Sleep through each tone's duration instead of returning at once
    realtime: bool,
    plays: u64,
}

impl SimulatedListener {
    pub fn new(session: Arc<Session>, profile: ListenerProfile, seed: u64) -> Self {
        Self {
            session,
            profile,
            rng: StdRng::seed_from_u64(seed),
            realtime: false,
            plays: 0,
        }
    }

    pub fn realtime(mut self, realtime: bool) -> Self {
        self.realtime = realtime;
        self
    }

    pub fn profile(&self) -> &ListenerProfile {
        &self.profile
    }

    pub fn plays(&self) -> u64 {
        self.plays
    }
}

impl StimulusPlayer for SimulatedListener {
    fn play(&mut self, tone: &Tone, duration: Duration) -> Result<()> {
        self.plays += 1;
        let p = self.profile.tone_probability(tone);
        let heard = self.rng.gen_bool(p.clamp(0.0, 1.0));
        trace!("Simulated listener: {} p={:.3} heard={}", tone, p, heard);

        if heard {
            let answer = match tone.direction() {
                Direction::Flat => AnswerCode::Heard,
                direction => AnswerCode::from_direction(direction),
            };
            self.session.respond(answer);
        }
        if self.realtime {
            self.session.wait_window(duration);
        }
        Ok(())
    }

    fn stop(&mut self) {}
}
