//! # Audibility Model
//!
//! **Purpose:** Turn sparse trial data into a continuous probability-of-hearing
//! function over (frequency, volume).
//!
//! **Algorithm:**
//! - Tested frequency: interpolate volume-wise inside its [`SingleFrequencyResult`],
//!   clamping to the nearest tested volume outside the sampled range.
//! - Untested frequency inside the tested range: evaluate both neighbouring tested
//!   frequencies at the volume and interpolate frequency-wise.
//! - Untested frequency outside the tested range: use the nearest tested frequency.
//! - Composite stimuli: unweighted mean over the audible notes.
//!
//! Floor and ceiling estimates use the same two-level scheme.
//!
//! The [`Predictor`] trait is also implemented by [`RampModel`], a coarse predictor
//! built only from ramp (and optionally floor) results.

use crate::error::{Error, Result};
use crate::interpolate::piecewise_linear;
use crate::results::{CalibrationResults, FloorResults, RampEntry, RampResults, SingleFrequencyResult};
use crate::tone::Tone;
use serde::{Deserialize, Serialize};

/// Anything that can predict audibility of a tone
pub trait Predictor {
    /// Probability in `[0, 1]` that `tone` is perceived
    fn probability(&self, tone: &Tone) -> Result<f64>;

    /// Estimated loudest volume at which `tone` is reliably not perceived
    fn floor_estimate(&self, tone: &Tone) -> Result<f64>;

    /// Estimated quietest volume at which `tone` is reliably perceived
    fn ceiling_estimate(&self, tone: &Tone) -> Result<f64>;
}

fn mean_over_notes<F>(tone: &Tone, mut per_frequency: F) -> Result<f64>
where
    F: FnMut(f64) -> Result<f64>,
{
    let frequencies = tone.frequencies();
    if frequencies.is_empty() {
        return Err(Error::InvalidInput(format!("tone {} has no audible notes", tone)));
    }
    let mut sum = 0.0;
    for freq in &frequencies {
        sum += per_frequency(*freq)?;
    }
    Ok(sum / frequencies.len() as f64)
}

fn fraction_between(low: f64, high: f64, x: f64) -> f64 {
    (x - low) / (high - low)
}

/// Calibrated audibility model, a read-only view over [`CalibrationResults`]
#[derive(Debug, Clone, Copy)]
pub struct AudibilityModel<'a> {
    results: &'a CalibrationResults,
}

impl<'a> AudibilityModel<'a> {
    pub fn new(results: &'a CalibrationResults) -> Self {
        Self { results }
    }

    pub fn results(&self) -> &'a CalibrationResults {
        self.results
    }

    /// Probability of hearing a pure tone at (frequency, volume)
    pub fn probability_at(&self, frequency: f64, volume: f64) -> Result<f64> {
        if volume.is_nan() {
            return Err(Error::InvalidInput("volume is NaN".to_string()));
        }
        self.across_frequencies(frequency, |r| r.probability(volume))
    }

    pub fn floor_at(&self, frequency: f64) -> Result<f64> {
        self.across_frequencies(frequency, SingleFrequencyResult::floor)
    }

    pub fn ceiling_at(&self, frequency: f64) -> Result<f64> {
        self.across_frequencies(frequency, SingleFrequencyResult::ceiling)
    }

    /// Evaluate `value` on the tested frequency, or interpolate between the
    /// neighbouring tested frequencies
    fn across_frequencies<F>(&self, frequency: f64, value: F) -> Result<f64>
    where
        F: Fn(&SingleFrequencyResult) -> Option<f64>,
    {
        if self.results.is_empty() {
            return Err(Error::ModelNotInitialized(
                "no calibration data has been recorded".to_string(),
            ));
        }
        if !frequency.is_finite() || frequency <= 0.0 {
            return Err(Error::InvalidInput(format!("invalid frequency {}", frequency)));
        }

        let eval = |result: &SingleFrequencyResult| {
            value(result).ok_or_else(|| {
                Error::ModelNotInitialized(format!(
                    "frequency {:.1}Hz has no recorded volumes",
                    result.frequency()
                ))
            })
        };

        if let Some(result) = self.results.get(frequency) {
            return eval(result);
        }

        match self.results.neighbours(frequency) {
            (Some(below), Some(above)) => {
                let low = eval(below)?;
                let high = eval(above)?;
                let fraction = fraction_between(below.frequency(), above.frequency(), frequency);
                Ok(low + fraction * (high - low))
            }
            (Some(nearest), None) | (None, Some(nearest)) => eval(nearest),
            (None, None) => Err(Error::ModelNotInitialized(
                "no calibration data has been recorded".to_string(),
            )),
        }
    }
}

impl Predictor for AudibilityModel<'_> {
    fn probability(&self, tone: &Tone) -> Result<f64> {
        mean_over_notes(tone, |freq| self.probability_at(freq, tone.volume()))
    }

    fn floor_estimate(&self, tone: &Tone) -> Result<f64> {
        mean_over_notes(tone, |freq| self.floor_at(freq))
    }

    fn ceiling_estimate(&self, tone: &Tone) -> Result<f64> {
        mean_over_notes(tone, |freq| self.ceiling_at(freq))
    }
}

/// Shape of the ramp-only probability curve between floor and ceiling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RampCurve {
    #[default]
    Linear,
    /// `ln((e - 1) x + 1)` of the linear fraction
    Logarithmic,
}

/// Coarse predictor from ramp results alone
///
/// Ceiling is the quieter ramp pass; floor is the recorded floor when available,
/// otherwise half the ceiling.
#[derive(Debug, Clone, Copy)]
pub struct RampModel<'a> {
    ramp: &'a RampResults,
    floors: Option<&'a FloorResults>,
    curve: RampCurve,
}

impl<'a> RampModel<'a> {
    pub fn new(ramp: &'a RampResults, floors: Option<&'a FloorResults>, curve: RampCurve) -> Self {
        Self { ramp, floors, curve }
    }

    fn floor_of(&self, entry: &RampEntry) -> f64 {
        self.floors
            .and_then(|f| f.get(entry.frequency))
            .unwrap_or(entry.ceiling_estimate() / 2.0)
    }

    fn estimate_at<F>(&self, frequency: f64, value: F) -> Result<f64>
    where
        F: Fn(&RampEntry) -> f64,
    {
        if self.ramp.is_empty() {
            return Err(Error::ModelNotInitialized("no ramp data has been recorded".to_string()));
        }
        let points: Vec<(f64, f64)> = self
            .ramp
            .sorted()
            .iter()
            .map(|e| (e.frequency, value(e)))
            .collect();
        piecewise_linear(&points, frequency)
            .ok_or_else(|| Error::InvalidInput(format!("invalid frequency {}", frequency)))
    }

    pub fn ceiling_at(&self, frequency: f64) -> Result<f64> {
        self.estimate_at(frequency, RampEntry::ceiling_estimate)
    }

    pub fn floor_at(&self, frequency: f64) -> Result<f64> {
        self.estimate_at(frequency, |e| self.floor_of(e))
    }

    pub fn probability_at(&self, frequency: f64, volume: f64) -> Result<f64> {
        let floor = self.floor_at(frequency)?;
        let ceiling = self.ceiling_at(frequency)?;
        let linear = if ceiling <= floor {
            if volume >= ceiling {
                1.0
            } else {
                0.0
            }
        } else {
            fraction_between(floor, ceiling, volume).clamp(0.0, 1.0)
        };
        Ok(match self.curve {
            RampCurve::Linear => linear,
            RampCurve::Logarithmic => ((std::f64::consts::E - 1.0) * linear + 1.0).ln().clamp(0.0, 1.0),
        })
    }
}

impl Predictor for RampModel<'_> {
    fn probability(&self, tone: &Tone) -> Result<f64> {
        mean_over_notes(tone, |freq| self.probability_at(freq, tone.volume()))
    }

    fn floor_estimate(&self, tone: &Tone) -> Result<f64> {
        mean_over_notes(tone, |freq| self.floor_at(freq))
    }

    fn ceiling_estimate(&self, tone: &Tone) -> Result<f64> {
        mean_over_notes(tone, |freq| self.ceiling_at(freq))
    }
}
