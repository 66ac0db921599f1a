//! Session configuration
//!
//! Loaded from TOML (see `toneset_common::config` for file resolution). Every
//! field carries a serde default, so a missing or partial file yields a runnable
//! configuration. [`SessionConfig::validate`] rejects out-of-range volumes, empty
//! or zero trial counts and unrecognized test identifiers before any session can
//! start.

use crate::error::{Error, Result};
use crate::model::RampCurve;
use crate::orchestrator::Protocol;
use crate::player::{NoiseKind, NoiseSpec};
use crate::stats::DEFAULT_ALPHA;
use crate::tone::{StimulusKind, DEFAULT_TONE_DURATION_MS, VOL_MAX};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use toneset_common::config::LoggingConfig;
use toneset_common::time;

/// Reference frequencies for calibration (Hz)
pub const DEFAULT_CALIBRATION_FREQUENCIES: [f64; 5] = [200.0, 500.0, 1000.0, 2000.0, 4000.0];

/// Reference frequencies for confidence testing (Hz)
pub const DEFAULT_CONFIDENCE_FREQUENCIES: [f64; 5] = [220.0, 440.0, 880.0, 1760.0, 3520.0];

/// Presentation timing shared by every phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrialTiming {
    /// Length of a presented tone
    pub tone_duration_ms: u64,
    /// Extra response window after the tone ends
    pub response_grace_ms: u64,
    /// Random silent gap before each trial, lower bound
    pub gap_min_ms: u64,
    /// Random silent gap before each trial, upper bound
    pub gap_max_ms: u64,
    /// Delay before the first trial of a session
    pub start_delay_ms: u64,
}

impl Default for TrialTiming {
    fn default() -> Self {
        Self {
            tone_duration_ms: DEFAULT_TONE_DURATION_MS,
            response_grace_ms: 0,
            gap_min_ms: 1000,
            gap_max_ms: 3000,
            start_delay_ms: 3000,
        }
    }
}

impl TrialTiming {
    /// No waiting at all (simulation and tests)
    pub fn instant() -> Self {
        Self {
            tone_duration_ms: 0,
            response_grace_ms: 0,
            gap_min_ms: 0,
            gap_max_ms: 0,
            start_delay_ms: 0,
        }
    }

    pub fn tone_duration(&self) -> Duration {
        time::millis_to_duration(self.tone_duration_ms)
    }

    pub fn response_grace(&self) -> Duration {
        time::millis_to_duration(self.response_grace_ms)
    }

    pub fn start_delay(&self) -> Duration {
        time::millis_to_duration(self.start_delay_ms)
    }
}

/// Ramp estimator parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RampConfig {
    /// Starting volume of the fast ramp
    pub seed_volume: f64,
    /// Per-slice multiplier of the first (fast) ramp
    pub fast_rate: f64,
    /// Per-slice multiplier of the second (slow) ramp
    pub slow_rate: f64,
    /// Length of one ramp step
    pub slice_ms: u64,
    /// Silence between the two ramps of a frequency
    pub settle_ms: u64,
}

impl Default for RampConfig {
    fn default() -> Self {
        Self {
            seed_volume: 0.5,
            fast_rate: 1.05,
            slow_rate: 1.025,
            slice_ms: 50,
            settle_ms: 1000,
        }
    }
}

impl RampConfig {
    pub fn slice(&self) -> Duration {
        time::millis_to_duration(self.slice_ms)
    }

    pub fn settle(&self) -> Duration {
        time::millis_to_duration(self.settle_ms)
    }

    /// A ramp from a non-positive seed or at a rate of 1 or less never climbs
    pub fn validate(&self) -> Result<()> {
        if !(self.seed_volume > 0.0 && self.seed_volume <= VOL_MAX) {
            return Err(config_error(format!(
                "ramp.seed_volume must be within (0, {}], got {}",
                VOL_MAX, self.seed_volume
            )));
        }
        for (name, rate) in [("fast_rate", self.fast_rate), ("slow_rate", self.slow_rate)] {
            if !(rate > 1.0 && rate.is_finite()) {
                return Err(config_error(format!("ramp.{} must be greater than 1, got {}", name, rate)));
            }
        }
        Ok(())
    }
}

/// Floor (reduce) estimator parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FloorConfig {
    /// Misses before a frequency's volume is frozen as its floor
    pub miss_threshold: u32,
    /// Fraction removed from the volume after each round
    pub reduction: f64,
    /// Volumes that drop below this are frozen regardless of misses
    pub min_volume: f64,
}

impl Default for FloorConfig {
    fn default() -> Self {
        Self {
            miss_threshold: 2,
            reduction: 0.2,
            min_volume: 0.01,
        }
    }
}

impl FloorConfig {
    /// Reductions must shrink the volume toward a positive stop
    pub fn validate(&self) -> Result<()> {
        if self.miss_threshold == 0 {
            return Err(config_error("floor.miss_threshold must be at least 1"));
        }
        if !(self.reduction > 0.0 && self.reduction < 1.0) {
            return Err(config_error(format!(
                "floor.reduction must be within (0, 1), got {}",
                self.reduction
            )));
        }
        if !(self.min_volume > 0.0 && self.min_volume <= VOL_MAX) {
            return Err(config_error(format!(
                "floor.min_volume must be within (0, {}], got {}",
                VOL_MAX, self.min_volume
            )));
        }
        Ok(())
    }
}

/// Calibration sampler parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    pub volumes_per_frequency: usize,
    pub trials_per_volume: usize,
    /// Multiplier applied to floor and ceiling before spacing the grid
    pub boost: f64,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            volumes_per_frequency: 5,
            trials_per_volume: 5,
            boost: 1.2,
        }
    }
}

impl CalibrationConfig {
    pub fn validate(&self) -> Result<()> {
        if self.volumes_per_frequency == 0 || self.trials_per_volume == 0 {
            return Err(config_error(
                "calibration volumes_per_frequency and trials_per_volume must be at least 1",
            ));
        }
        if !(self.boost >= 1.0 && self.boost.is_finite()) {
            return Err(config_error(format!(
                "calibration.boost must be at least 1, got {}",
                self.boost
            )));
        }
        Ok(())
    }
}

/// Confidence battery parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfidenceConfig {
    pub trials_per_tone: usize,
    pub alpha: f64,
    /// Multiplier on the ceiling estimate for the "always heard" case
    pub ceiling_boost: f64,
    /// Multiplier on the ceiling estimate for the "moderately above" case
    pub moderate_boost: f64,
    /// Multiplier on the ceiling estimate for the "far above" case
    pub far_boost: f64,
    /// First interpolation percentage between floor and ceiling
    pub interpolation_start: f64,
    /// Curve used when validating a ramp-only predictor
    pub ramp_curve: RampCurve,
}

impl Default for ConfidenceConfig {
    fn default() -> Self {
        Self {
            trials_per_tone: 20,
            alpha: DEFAULT_ALPHA,
            ceiling_boost: 1.0,
            moderate_boost: 1.25,
            far_boost: 1.5,
            interpolation_start: 0.4,
            ramp_curve: RampCurve::Linear,
        }
    }
}

/// Background noise settings as written in the config file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoiseConfig {
    /// `none`, `white` or `crowd`
    pub kind: String,
    /// 0..=100
    pub volume: u32,
}

impl Default for NoiseConfig {
    fn default() -> Self {
        Self {
            kind: "none".to_string(),
            volume: 0,
        }
    }
}

/// Complete configuration of a test session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub subject_id: u32,
    pub noise: NoiseConfig,
    /// `full`, `ramp-only` or `ramp-reduce`
    pub protocol: String,
    /// `sine-single`, `sine-interval`, `sine-melody:<preset>` or `sine-melody-set`
    pub stimulus: String,
    pub calibration_frequencies: Vec<f64>,
    pub confidence_frequencies: Vec<f64>,
    pub timing: TrialTiming,
    pub ramp: RampConfig,
    pub floor: FloorConfig,
    pub calibration: CalibrationConfig,
    pub confidence: ConfidenceConfig,
    pub logging: LoggingConfig,
    /// Where session logs and reports are written
    pub results_dir: Option<PathBuf>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            subject_id: 0,
            noise: NoiseConfig::default(),
            protocol: "full".to_string(),
            stimulus: "sine-single".to_string(),
            calibration_frequencies: DEFAULT_CALIBRATION_FREQUENCIES.to_vec(),
            confidence_frequencies: DEFAULT_CONFIDENCE_FREQUENCIES.to_vec(),
            timing: TrialTiming::default(),
            ramp: RampConfig::default(),
            floor: FloorConfig::default(),
            calibration: CalibrationConfig::default(),
            confidence: ConfidenceConfig::default(),
            logging: LoggingConfig::default(),
            results_dir: None,
        }
    }
}

fn config_error(msg: impl Into<String>) -> Error {
    Error::Config(msg.into())
}

fn check_frequencies(name: &str, frequencies: &[f64]) -> Result<()> {
    if frequencies.is_empty() {
        return Err(config_error(format!("{} must not be empty", name)));
    }
    if let Some(bad) = frequencies.iter().find(|f| !(f.is_finite() && **f > 0.0)) {
        return Err(config_error(format!("{} contains invalid frequency {}", name, bad)));
    }
    Ok(())
}

impl SessionConfig {
    pub fn protocol(&self) -> Result<Protocol> {
        self.protocol.parse()
    }

    pub fn stimulus_kind(&self) -> Result<StimulusKind> {
        self.stimulus.parse()
    }

    pub fn noise_spec(&self) -> Result<NoiseSpec> {
        let kind: NoiseKind = self.noise.kind.parse()?;
        NoiseSpec::new(kind, self.noise.volume)
    }

    /// Reject any configuration that must not start a session
    pub fn validate(&self) -> Result<()> {
        self.protocol()?;
        self.stimulus_kind()?;
        self.noise_spec()?;
        self.logging
            .validate()
            .map_err(|e| config_error(e.to_string()))?;

        check_frequencies("calibration_frequencies", &self.calibration_frequencies)?;
        check_frequencies("confidence_frequencies", &self.confidence_frequencies)?;

        let timing = &self.timing;
        if timing.gap_min_ms > timing.gap_max_ms {
            return Err(config_error(format!(
                "timing.gap_min_ms ({}) exceeds timing.gap_max_ms ({})",
                timing.gap_min_ms, timing.gap_max_ms
            )));
        }

        self.ramp.validate()?;
        self.floor.validate()?;
        self.calibration.validate()?;

        let confidence = &self.confidence;
        if confidence.trials_per_tone == 0 {
            return Err(config_error("confidence.trials_per_tone must be at least 1"));
        }
        if !(confidence.alpha > 0.0 && confidence.alpha < 1.0) {
            return Err(config_error(format!(
                "confidence.alpha must be within (0, 1), got {}",
                confidence.alpha
            )));
        }
        for (name, boost) in [
            ("ceiling_boost", confidence.ceiling_boost),
            ("moderate_boost", confidence.moderate_boost),
            ("far_boost", confidence.far_boost),
        ] {
            if !(boost > 0.0 && boost.is_finite()) {
                return Err(config_error(format!("confidence.{} must be positive, got {}", name, boost)));
            }
        }
        if !(0.0..1.0).contains(&confidence.interpolation_start) {
            return Err(config_error(format!(
                "confidence.interpolation_start must be within [0, 1), got {}",
                confidence.interpolation_start
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = SessionConfig::default();
        config.validate().unwrap();
        assert_eq!(config.protocol().unwrap(), Protocol::Full);
        assert_eq!(config.stimulus_kind().unwrap(), StimulusKind::Single);
        assert_eq!(config.calibration.volumes_per_frequency, 5);
        assert_eq!(config.confidence.trials_per_tone, 20);
        assert_eq!(config.timing.tone_duration_ms, 1500);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: SessionConfig = toml::from_str(
            r#"
            subject_id = 12
            protocol = "ramp-reduce"

            [calibration]
            trials_per_volume = 3
            "#,
        )
        .unwrap();
        assert_eq!(config.subject_id, 12);
        assert_eq!(config.calibration.trials_per_volume, 3);
        assert_eq!(config.calibration.volumes_per_frequency, 5);
        assert_eq!(config.ramp.fast_rate, 1.05);
        config.validate().unwrap();
    }

    #[test]
    fn test_unrecognized_test_type_rejected() {
        let config = SessionConfig {
            stimulus: "sine-chord".to_string(),
            ..SessionConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let config = SessionConfig {
            protocol: "ramp-and-dance".to_string(),
            ..SessionConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_invalid_volume_rejected() {
        let mut config = SessionConfig::default();
        config.ramp.seed_volume = VOL_MAX * 2.0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let mut config = SessionConfig::default();
        config.noise.volume = 101;
        config.noise.kind = "white".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_ramp_that_cannot_climb_rejected() {
        let mut config = SessionConfig::default();
        config.ramp.seed_volume = 0.0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
        assert!(matches!(config.ramp.validate(), Err(Error::Config(_))));

        let ramp = RampConfig {
            slow_rate: 1.0,
            ..RampConfig::default()
        };
        assert!(matches!(ramp.validate(), Err(Error::Config(_))));

        let floor = FloorConfig {
            min_volume: 0.0,
            ..FloorConfig::default()
        };
        assert!(matches!(floor.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_invalid_trial_counts_rejected() {
        let mut config = SessionConfig::default();
        config.calibration.trials_per_volume = 0;
        assert!(config.validate().is_err());

        let mut config = SessionConfig::default();
        config.confidence.trials_per_tone = 0;
        assert!(config.validate().is_err());

        let mut config = SessionConfig::default();
        config.floor.miss_threshold = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_frequency_list_rejected() {
        let config = SessionConfig {
            calibration_frequencies: Vec::new(),
            ..SessionConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_gap_bounds_checked() {
        let mut config = SessionConfig::default();
        config.timing.gap_min_ms = 5000;
        assert!(config.validate().is_err());
    }
}
