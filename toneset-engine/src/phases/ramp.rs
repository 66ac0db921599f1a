//! # Ramp Estimator
//!
//! **Purpose:** Coarse audibility ceiling per frequency.
//!
//! For each frequency the volume starts at a seed and is multiplied by the ramp
//! rate every slice until the subject responds (current volume) or the volume
//! reaches [`VOL_MAX`] (returns `VOL_MAX`). Two passes per frequency:
//! - fast pass from the seed volume, producing `vol1`
//! - after a short settle, slow pass from `vol1 / 10`, producing `vol2`
//!
//! A pause during either pass abandons the frequency. The next run restarts the
//! same frequency from its first pass.

use super::{Phase, PhaseOutcome};
use crate::config::RampConfig;
use crate::context::SessionContext;
use crate::error::Result;
use crate::results::RampResults;
use crate::state::WaitOutcome;
use crate::tone::{Tone, VOL_MAX};
use std::sync::Arc;
use tracing::{debug, info};

pub const RAMP_PHASE: &str = "ramp";

/// How one ramp pass ended
#[derive(Debug, Clone, Copy, PartialEq)]
enum RampStep {
    Reached(f64),
    Interrupted,
}

#[derive(Debug, Clone)]
pub struct RampEstimator {
    frequencies: Vec<f64>,
    position: usize,
    config: RampConfig,
    results: RampResults,
}

impl RampEstimator {
    /// Rejects a config whose ramp could never reach a response or [`VOL_MAX`]
    pub fn new(frequencies: Vec<f64>, config: RampConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            frequencies,
            position: 0,
            config,
            results: RampResults::new(),
        })
    }

    pub fn results(&self) -> &RampResults {
        &self.results
    }

    pub fn into_results(self) -> RampResults {
        self.results
    }

    /// Index of the next frequency to ramp
    pub fn position(&self) -> usize {
        self.position
    }

    pub fn remaining(&self) -> usize {
        self.frequencies.len().saturating_sub(self.position)
    }

    /// Raise the volume from `start` by `rate` each slice until a response
    fn ramp(&self, ctx: &mut SessionContext, frequency: f64, start: f64, rate: f64) -> Result<RampStep> {
        let session = Arc::clone(ctx.session());
        if session.is_interrupted() {
            return Ok(RampStep::Interrupted);
        }

        let slice = self.config.slice();
        let mut volume = start.clamp(0.0, VOL_MAX);
        session.begin_trial();

        let step = loop {
            let tone = match Tone::single(frequency, volume) {
                Ok(tone) => tone,
                Err(e) => {
                    session.abort_trial();
                    return Err(e);
                }
            };
            if let Err(e) = ctx.player().play(&tone, slice) {
                session.abort_trial();
                return Err(e);
            }

            match session.poll() {
                WaitOutcome::Responded => break RampStep::Reached(volume),
                WaitOutcome::Interrupted => {
                    ctx.player().stop();
                    break RampStep::Interrupted;
                }
                WaitOutcome::Elapsed => {}
            }

            if volume >= VOL_MAX {
                break RampStep::Reached(VOL_MAX);
            }
            volume = (volume * rate).min(VOL_MAX);
        };

        match step {
            RampStep::Reached(_) => {
                session.end_trial();
            }
            RampStep::Interrupted => session.abort_trial(),
        }
        Ok(step)
    }

    /// Both passes for one frequency; `None` if interrupted
    fn ramp_frequency(&self, ctx: &mut SessionContext, frequency: f64) -> Result<Option<(f64, f64)>> {
        let vol1 = match self.ramp(ctx, frequency, self.config.seed_volume, self.config.fast_rate)? {
            RampStep::Reached(volume) => volume,
            RampStep::Interrupted => return Ok(None),
        };
        if !ctx.pause_for(self.config.settle()) {
            return Ok(None);
        }
        let vol2 = match self.ramp(ctx, frequency, vol1 / 10.0, self.config.slow_rate)? {
            RampStep::Reached(volume) => volume,
            RampStep::Interrupted => return Ok(None),
        };
        Ok(Some((vol1, vol2)))
    }
}

impl Phase for RampEstimator {
    fn name(&self) -> &'static str {
        RAMP_PHASE
    }

    fn run(&mut self, ctx: &mut SessionContext) -> Result<PhaseOutcome> {
        while let Some(&frequency) = self.frequencies.get(self.position) {
            if !ctx.inter_trial_gap() {
                return Ok(PhaseOutcome::Paused);
            }

            debug!("Ramping {:.1} Hz", frequency);
            let Some((vol1, vol2)) = self.ramp_frequency(ctx, frequency)? else {
                info!("Ramp at {:.1} Hz interrupted; will restart on resume", frequency);
                return Ok(PhaseOutcome::Paused);
            };

            self.results.record(frequency, vol1, vol2);
            let line = format!("Freq: {:.1}, vol1: {:.4}, vol2: {:.4}", frequency, vol1, vol2);
            ctx.record_measurement(RAMP_PHASE, &line, frequency, vol1.min(vol2));
            self.position += 1;
        }
        Ok(PhaseOutcome::Completed)
    }

    fn is_complete(&self) -> bool {
        self.position >= self.frequencies.len()
    }
}
