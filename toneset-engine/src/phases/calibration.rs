//! # Calibration Sampler
//!
//! **Purpose:** Dense volume-grid sampling that populates [`CalibrationResults`].
//!
//! For every frequency with a ramp result, `V` volumes are spaced evenly from
//! `floor * boost` to `ramp * boost` (inclusive, clamped to [`VOL_MAX`]), each
//! repeated `N` times for every stimulus variant. The full list is shuffled once
//! when the plan is built; the sampler then walks it in order, so a resumed run
//! continues from the first unplayed tone.

use super::{Phase, PhaseOutcome};
use crate::config::CalibrationConfig;
use crate::context::{SessionContext, TrialOutcome};
use crate::error::{Error, Result};
use crate::results::{CalibrationResults, FloorResults, RampResults};
use crate::tone::{StimulusKind, Tone, VOL_MAX};
use crate::trial::ResponseMode;
use rand::seq::SliceRandom;
use rand::Rng;
use tracing::info;

pub const CALIBRATION_PHASE: &str = "calibration";

/// `count` volumes evenly spaced from `floor * boost` to `ceiling * boost`
///
/// A single volume sits at the boosted ceiling.
pub fn volume_grid(floor: f64, ceiling: f64, count: usize, boost: f64) -> Vec<f64> {
    let low = (floor.min(ceiling) * boost).min(VOL_MAX);
    let high = (floor.max(ceiling) * boost).min(VOL_MAX);
    match count {
        0 => Vec::new(),
        1 => vec![high],
        _ => {
            let step = (high - low) / (count - 1) as f64;
            (0..count).map(|i| low + step * i as f64).collect()
        }
    }
}

#[derive(Debug, Clone)]
pub struct CalibrationSampler {
    schedule: Vec<Tone>,
    position: usize,
    mode: ResponseMode,
    results: CalibrationResults,
}

impl CalibrationSampler {
    /// Build and shuffle the full calibration schedule
    ///
    /// The top of each grid is the slow-pass ramp volume. Frequencies without a
    /// floor result use half of it as floor.
    pub fn plan<R: Rng + ?Sized>(
        ramp: &RampResults,
        floors: &FloorResults,
        config: &CalibrationConfig,
        stimulus: StimulusKind,
        tone_duration_ms: u64,
        rng: &mut R,
    ) -> Result<Self> {
        if ramp.is_empty() {
            return Err(Error::InvalidState(
                "calibration needs ramp results for at least one frequency".to_string(),
            ));
        }

        let mut schedule = Vec::new();
        for entry in ramp.sorted() {
            let top = entry.ramp_result();
            let floor = floors.get(entry.frequency).unwrap_or(top / 2.0);
            let grid = volume_grid(floor, top, config.volumes_per_frequency, config.boost);
            for volume in grid {
                let tones = stimulus.tones_for(entry.frequency, volume, tone_duration_ms)?;
                for _ in 0..config.trials_per_volume {
                    schedule.extend(tones.iter().cloned());
                }
            }
        }
        schedule.shuffle(rng);

        let mode = if stimulus.is_directional() {
            ResponseMode::Direction
        } else {
            ResponseMode::Detection
        };
        Ok(Self::from_schedule(schedule, mode))
    }

    /// Sampler over an explicit, already ordered schedule
    pub fn from_schedule(schedule: Vec<Tone>, mode: ResponseMode) -> Self {
        Self {
            schedule,
            position: 0,
            mode,
            results: CalibrationResults::new(),
        }
    }

    pub fn schedule(&self) -> &[Tone] {
        &self.schedule
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn remaining(&self) -> usize {
        self.schedule.len().saturating_sub(self.position)
    }

    pub fn mode(&self) -> ResponseMode {
        self.mode
    }

    pub fn results(&self) -> &CalibrationResults {
        &self.results
    }

    pub fn into_results(self) -> CalibrationResults {
        self.results
    }
}

impl Phase for CalibrationSampler {
    fn name(&self) -> &'static str {
        CALIBRATION_PHASE
    }

    fn run(&mut self, ctx: &mut SessionContext) -> Result<PhaseOutcome> {
        while let Some(tone) = self.schedule.get(self.position) {
            if !ctx.inter_trial_gap() {
                return Ok(PhaseOutcome::Paused);
            }
            let trial = match ctx.present(tone, self.mode)? {
                TrialOutcome::Completed(trial) => trial,
                TrialOutcome::Interrupted => return Ok(PhaseOutcome::Paused),
            };
            self.results.record_trial(&trial);
            ctx.record(CALIBRATION_PHASE, &trial);
            self.position += 1;
        }
        info!(
            "Calibration recorded {} trials over {} frequencies",
            self.results.total_trials(),
            self.results.len()
        );
        Ok(PhaseOutcome::Completed)
    }

    fn is_complete(&self) -> bool {
        self.position >= self.schedule.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tone::Direction;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn ramp() -> RampResults {
        let mut ramp = RampResults::new();
        ramp.record(500.0, 120.0, 100.0);
        ramp.record(1000.0, 80.0, 90.0);
        ramp
    }

    #[test]
    fn test_volume_grid_is_inclusive() {
        let grid = volume_grid(10.0, 50.0, 5, 1.2);
        assert_eq!(grid.len(), 5);
        assert!((grid[0] - 12.0).abs() < 1e-9);
        assert!((grid[4] - 60.0).abs() < 1e-9);
        assert!((grid[2] - 36.0).abs() < 1e-9);
    }

    #[test]
    fn test_volume_grid_single_and_clamped() {
        assert_eq!(volume_grid(10.0, 50.0, 1, 1.2), vec![60.0]);
        let grid = volume_grid(30000.0, 32000.0, 3, 1.2);
        assert!(grid.iter().all(|v| *v <= VOL_MAX));
        assert_eq!(grid[2], VOL_MAX);
    }

    #[test]
    fn test_plan_counts_every_trial() {
        let mut floors = FloorResults::new();
        floors.record(500.0, 40.0);
        let config = CalibrationConfig::default();
        let mut rng = StdRng::seed_from_u64(5);
        let sampler =
            CalibrationSampler::plan(&ramp(), &floors, &config, StimulusKind::Single, 1500, &mut rng).unwrap();

        assert_eq!(sampler.schedule().len(), 2 * 5 * 5);
        assert_eq!(sampler.mode(), ResponseMode::Detection);

        // 1000 Hz has no floor: slow pass 90, floor 45, boosted grid 54..108
        let quietest_1000 = sampler
            .schedule()
            .iter()
            .filter(|t| t.frequency() == 1000.0)
            .map(|t| t.volume())
            .fold(f64::INFINITY, f64::min);
        assert!((quietest_1000 - 54.0).abs() < 1e-9);
    }

    #[test]
    fn test_plan_tops_out_at_slow_pass_volume() {
        let mut ramp = RampResults::new();
        ramp.record(500.0, 80.0, 100.0);
        let mut rng = StdRng::seed_from_u64(5);
        let sampler = CalibrationSampler::plan(
            &ramp,
            &FloorResults::new(),
            &CalibrationConfig::default(),
            StimulusKind::Single,
            1500,
            &mut rng,
        )
        .unwrap();

        let volumes: Vec<f64> = sampler.schedule().iter().map(|t| t.volume()).collect();
        let loudest = volumes.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let quietest = volumes.iter().copied().fold(f64::INFINITY, f64::min);
        // Grid spans 50 * 1.2 to 100 * 1.2, not the fast pass
        assert!((loudest - 120.0).abs() < 1e-9);
        assert!((quietest - 60.0).abs() < 1e-9);
    }

    #[test]
    fn test_interval_plan_is_directional() {
        let config = CalibrationConfig {
            volumes_per_frequency: 2,
            trials_per_volume: 3,
            boost: 1.2,
        };
        let mut rng = StdRng::seed_from_u64(5);
        let sampler = CalibrationSampler::plan(
            &ramp(),
            &FloorResults::new(),
            &config,
            "sine-interval".parse().unwrap(),
            1500,
            &mut rng,
        )
        .unwrap();
        assert_eq!(sampler.schedule().len(), 2 * 2 * 3 * 2);
        assert_eq!(sampler.mode(), ResponseMode::Direction);
        let ups = sampler
            .schedule()
            .iter()
            .filter(|t| t.direction() == Direction::Up)
            .count();
        assert_eq!(ups, 12);
    }

    #[test]
    fn test_plan_requires_ramp_results() {
        let mut rng = StdRng::seed_from_u64(5);
        let result = CalibrationSampler::plan(
            &RampResults::new(),
            &FloorResults::new(),
            &CalibrationConfig::default(),
            StimulusKind::Single,
            1500,
            &mut rng,
        );
        assert!(matches!(result, Err(Error::InvalidState(_))));
    }
}
