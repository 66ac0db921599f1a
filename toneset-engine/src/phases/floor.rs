//! # Floor (Reduce) Estimator
//!
//! **Purpose:** Loudest volume per frequency that the subject reliably misses.
//!
//! Starting from each frequency's slow-ramp result, rounds play every active
//! frequency once in a freshly shuffled order. A miss increments the frequency's
//! miss count. At the end of a round, a frequency whose count has reached the
//! threshold is frozen at its current volume and leaves the active set; every
//! other frequency is reduced by a fixed fraction. A frequency whose volume would
//! drop below `min_volume` is frozen as well, so the phase always terminates.

use super::{Phase, PhaseOutcome};
use crate::config::FloorConfig;
use crate::context::{SessionContext, TrialOutcome};
use crate::error::Result;
use crate::results::{FloorResults, RampResults};
use crate::tone::Tone;
use crate::trial::ResponseMode;
use rand::seq::SliceRandom;
use tracing::{debug, info};

pub const FLOOR_PHASE: &str = "reduce";

#[derive(Debug, Clone, PartialEq)]
struct ActiveFrequency {
    frequency: f64,
    volume: f64,
    misses: u32,
}

#[derive(Debug, Clone)]
pub struct FloorEstimator {
    config: FloorConfig,
    active: Vec<ActiveFrequency>,
    /// Presentation order of the current round (indices into `active`)
    round: Vec<usize>,
    round_pos: usize,
    rounds: usize,
    results: FloorResults,
}

impl FloorEstimator {
    /// Start one frequency per ramp entry at its slow-pass volume
    pub fn from_ramp(ramp: &RampResults, config: FloorConfig) -> Self {
        Self::new(
            ramp.sorted()
                .iter()
                .map(|e| (e.frequency, e.ramp_result())),
            config,
        )
    }

    pub fn new<I>(start: I, config: FloorConfig) -> Self
    where
        I: IntoIterator<Item = (f64, f64)>,
    {
        Self {
            config,
            active: start
                .into_iter()
                .map(|(frequency, volume)| ActiveFrequency {
                    frequency,
                    volume,
                    misses: 0,
                })
                .collect(),
            round: Vec::new(),
            round_pos: 0,
            rounds: 0,
            results: FloorResults::new(),
        }
    }

    pub fn results(&self) -> &FloorResults {
        &self.results
    }

    pub fn into_results(self) -> FloorResults {
        self.results
    }

    /// Frequencies still being reduced
    pub fn active_frequencies(&self) -> Vec<f64> {
        self.active.iter().map(|a| a.frequency).collect()
    }

    /// Completed rounds
    pub fn rounds(&self) -> usize {
        self.rounds
    }

    fn freeze(&mut self, ctx: &mut SessionContext, frequency: f64, volume: f64) {
        self.results.record(frequency, volume);
        info!("Floor for {:.1} Hz frozen at {:.4}", frequency, volume);
        ctx.log(&format!("Floor: freq {:.1}, vol {:.4}", frequency, volume));
    }

    fn finish_round(&mut self, ctx: &mut SessionContext) {
        let keep = 1.0 - self.config.reduction;
        let active = std::mem::take(&mut self.active);
        for mut entry in active {
            let reduced = entry.volume * keep;
            if entry.misses >= self.config.miss_threshold || reduced < self.config.min_volume {
                self.freeze(ctx, entry.frequency, entry.volume);
            } else {
                entry.volume = reduced;
                self.active.push(entry);
            }
        }
        self.round.clear();
        self.round_pos = 0;
        self.rounds += 1;
        debug!("Reduce round {} finished, {} active", self.rounds, self.active.len());
    }
}

impl Phase for FloorEstimator {
    fn name(&self) -> &'static str {
        FLOOR_PHASE
    }

    fn run(&mut self, ctx: &mut SessionContext) -> Result<PhaseOutcome> {
        while !self.active.is_empty() {
            if self.round.is_empty() {
                self.round = (0..self.active.len()).collect();
                self.round.shuffle(ctx.rng());
                self.round_pos = 0;
            }

            while let Some(&index) = self.round.get(self.round_pos) {
                if !ctx.inter_trial_gap() {
                    return Ok(PhaseOutcome::Paused);
                }
                let (frequency, volume) = {
                    let entry = &self.active[index];
                    (entry.frequency, entry.volume)
                };
                let tone = Tone::single(frequency, volume)?;
                let trial = match ctx.present(&tone, ResponseMode::Detection)? {
                    TrialOutcome::Completed(trial) => trial,
                    TrialOutcome::Interrupted => return Ok(PhaseOutcome::Paused),
                };
                if trial.correct() != Some(true) {
                    self.active[index].misses += 1;
                }
                ctx.record(FLOOR_PHASE, &trial);
                self.round_pos += 1;
            }

            self.finish_round(ctx);
        }
        Ok(PhaseOutcome::Completed)
    }

    fn is_complete(&self) -> bool {
        self.active.is_empty()
    }
}
