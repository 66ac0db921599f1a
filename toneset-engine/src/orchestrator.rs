//! # Test Orchestrator
//!
//! **Purpose:** Drive a calibration protocol through its phases.
//!
//! **State machine:** `Idle -> Ramping -> Reducing -> Calibrating -> Complete`.
//! Shortened protocols end early: `ramp-only` completes after Ramping and
//! `ramp-reduce` after Reducing. Each transition carries the finished phase's
//! results forward (ramp results seed the floor estimator; ramp and floor results
//! together plan the calibration grid).
//!
//! Pause is orthogonal to the phase. It is checked before every phase starts and
//! by the active phase before every trial; resuming re-enters the same phase at
//! the same position. Playback and response faults pause instead of aborting.

use crate::config::{CalibrationConfig, FloorConfig, RampConfig, SessionConfig};
use crate::context::SessionContext;
use crate::error::{Error, Result};
use crate::phases::{
    pause_on_fault, CalibrationSampler, FloorEstimator, Phase, PhaseOutcome, RampEstimator,
};
use crate::player::NoiseSpec;
use crate::results::{CalibrationResults, CompletedCalibration, FloorResults, RampResults, SubjectResults};
use crate::runner::SessionTask;
use crate::tone::StimulusKind;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use toneset_common::time;
use tracing::{debug, info};
use uuid::Uuid;

/// Which phases a calibration session runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Protocol {
    RampOnly,
    RampReduce,
    #[default]
    Full,
}

impl Protocol {
    pub fn id(&self) -> &'static str {
        match self {
            Protocol::RampOnly => "ramp-only",
            Protocol::RampReduce => "ramp-reduce",
            Protocol::Full => "full",
        }
    }

    /// Phase entered when `phase` completes
    pub fn after(&self, phase: SessionPhase) -> Option<SessionPhase> {
        use SessionPhase::*;
        match (phase, self) {
            (Idle, _) => Some(Ramping),
            (Ramping, Protocol::RampOnly) => Some(Complete),
            (Ramping, _) => Some(Reducing),
            (Reducing, Protocol::RampReduce) => Some(Complete),
            (Reducing, _) => Some(Calibrating),
            (Calibrating, _) => Some(Complete),
            (Complete, _) => None,
        }
    }
}

impl FromStr for Protocol {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ramp-only" => Ok(Protocol::RampOnly),
            "ramp-reduce" => Ok(Protocol::RampReduce),
            "full" => Ok(Protocol::Full),
            other => Err(Error::Config(format!("Unrecognized protocol '{}'", other))),
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// Position of a calibration session in its protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionPhase {
    Idle,
    Ramping,
    Reducing,
    Calibrating,
    Complete,
}

impl SessionPhase {
    pub fn name(&self) -> &'static str {
        match self {
            SessionPhase::Idle => "idle",
            SessionPhase::Ramping => crate::phases::ramp::RAMP_PHASE,
            SessionPhase::Reducing => crate::phases::floor::FLOOR_PHASE,
            SessionPhase::Calibrating => crate::phases::calibration::CALIBRATION_PHASE,
            SessionPhase::Complete => "complete",
        }
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Calibration protocol driver
#[derive(Debug)]
pub struct TestOrchestrator {
    protocol: Protocol,
    phase: SessionPhase,
    stimulus: StimulusKind,
    tone_duration_ms: u64,
    floor_config: FloorConfig,
    calibration_config: CalibrationConfig,
    ramp: RampEstimator,
    floor: Option<FloorEstimator>,
    calibration: Option<CalibrationSampler>,
    ramp_results: RampResults,
    floor_results: FloorResults,
    calibration_results: CalibrationResults,
    /// Times `Complete` has been entered (never more than one)
    completions: usize,
}

impl TestOrchestrator {
    /// Orchestrator for a validated configuration
    pub fn new(config: &SessionConfig) -> Result<Self> {
        config.validate()?;
        Self::from_parts(
            config.protocol()?,
            config.stimulus_kind()?,
            config.calibration_frequencies.clone(),
            config.timing.tone_duration_ms,
            config.ramp,
            config.floor,
            config.calibration,
        )
    }

    pub fn from_parts(
        protocol: Protocol,
        stimulus: StimulusKind,
        frequencies: Vec<f64>,
        tone_duration_ms: u64,
        ramp_config: RampConfig,
        floor_config: FloorConfig,
        calibration_config: CalibrationConfig,
    ) -> Result<Self> {
        floor_config.validate()?;
        calibration_config.validate()?;
        Ok(Self {
            protocol,
            phase: SessionPhase::Idle,
            stimulus,
            tone_duration_ms,
            floor_config,
            calibration_config,
            ramp: RampEstimator::new(frequencies, ramp_config)?,
            floor: None,
            calibration: None,
            ramp_results: RampResults::new(),
            floor_results: FloorResults::new(),
            calibration_results: CalibrationResults::new(),
            completions: 0,
        })
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn completions(&self) -> usize {
        self.completions
    }

    pub fn ramp_results(&self) -> &RampResults {
        if self.phase == SessionPhase::Ramping {
            self.ramp.results()
        } else {
            &self.ramp_results
        }
    }

    pub fn floor_results(&self) -> &FloorResults {
        match (&self.floor, self.phase) {
            (Some(floor), SessionPhase::Reducing) => floor.results(),
            _ => &self.floor_results,
        }
    }

    pub fn calibration_results(&self) -> &CalibrationResults {
        match (&self.calibration, self.phase) {
            (Some(sampler), SessionPhase::Calibrating) => sampler.results(),
            _ => &self.calibration_results,
        }
    }

    /// Move to `next`, carrying results forward
    ///
    /// Only the transitions of the configured protocol are legal.
    pub fn transition(&mut self, next: SessionPhase, ctx: &mut SessionContext) -> Result<()> {
        if self.protocol.after(self.phase) != Some(next) {
            return Err(Error::InvalidState(format!(
                "illegal transition {} -> {} for protocol {}",
                self.phase, next, self.protocol
            )));
        }

        match self.phase {
            SessionPhase::Ramping => {
                self.ramp_results = self.ramp.results().clone();
            }
            SessionPhase::Reducing => {
                if let Some(floor) = self.floor.take() {
                    self.floor_results = floor.into_results();
                }
            }
            SessionPhase::Calibrating => {
                if let Some(sampler) = self.calibration.take() {
                    self.calibration_results = sampler.into_results();
                }
            }
            SessionPhase::Idle | SessionPhase::Complete => {}
        }

        match next {
            SessionPhase::Reducing => {
                self.floor = Some(FloorEstimator::from_ramp(&self.ramp_results, self.floor_config));
            }
            SessionPhase::Calibrating => {
                let sampler = CalibrationSampler::plan(
                    &self.ramp_results,
                    &self.floor_results,
                    &self.calibration_config,
                    self.stimulus,
                    self.tone_duration_ms,
                    ctx.rng(),
                )?;
                debug!("Calibration planned with {} trials", sampler.remaining());
                self.calibration = Some(sampler);
            }
            SessionPhase::Idle | SessionPhase::Ramping | SessionPhase::Complete => {}
        }

        let previous = std::mem::replace(&mut self.phase, next);
        info!("Session phase {} -> {}", previous, next);

        if previous != SessionPhase::Idle {
            ctx.phase_completed(previous.name());
        }
        if next == SessionPhase::Complete {
            self.completions += 1;
            ctx.session_completed();
        } else {
            ctx.phase_started(next.name());
        }
        Ok(())
    }

    fn run_active(&mut self, ctx: &mut SessionContext) -> Result<PhaseOutcome> {
        match self.phase {
            SessionPhase::Ramping => self.ramp.run(ctx),
            SessionPhase::Reducing => self.floor.as_mut().map_or_else(missing_phase, |p| p.run(ctx)),
            SessionPhase::Calibrating => self
                .calibration
                .as_mut()
                .map_or_else(missing_phase, |p| p.run(ctx)),
            SessionPhase::Idle | SessionPhase::Complete => Ok(PhaseOutcome::Completed),
        }
    }

    /// Snapshot of a completed session for the subject's result set
    pub fn completed(&self, session_id: Uuid, noise: NoiseSpec) -> Result<CompletedCalibration> {
        if self.phase != SessionPhase::Complete {
            return Err(Error::InvalidState(format!(
                "session is still in phase {}",
                self.phase
            )));
        }
        Ok(CompletedCalibration {
            session_id,
            completed_at: time::now(),
            protocol: self.protocol,
            noise,
            ramp: self.ramp_results.clone(),
            floors: self.floor_results.clone(),
            calibration: self.calibration_results.clone(),
        })
    }

    /// Fold a completed session into the subject's permanent results
    pub fn fold_into(
        &self,
        subject: &mut SubjectResults,
        session_id: Uuid,
        noise: NoiseSpec,
    ) -> Result<Arc<CompletedCalibration>> {
        Ok(subject.add_calibration(self.completed(session_id, noise)?))
    }
}

fn missing_phase() -> Result<PhaseOutcome> {
    Err(Error::Internal("active phase has no estimator".to_string()))
}

impl SessionTask for TestOrchestrator {
    fn name(&self) -> &'static str {
        "calibration"
    }

    fn advance(&mut self, ctx: &mut SessionContext) -> Result<PhaseOutcome> {
        loop {
            if self.phase == SessionPhase::Complete {
                return Ok(PhaseOutcome::Completed);
            }
            if ctx.session().is_interrupted() {
                return Ok(PhaseOutcome::Paused);
            }
            if self.phase == SessionPhase::Idle {
                ctx.session_started();
                self.transition(SessionPhase::Ramping, ctx)?;
                continue;
            }

            let result = self.run_active(ctx);
            match pause_on_fault(ctx, result)? {
                PhaseOutcome::Paused => return Ok(PhaseOutcome::Paused),
                PhaseOutcome::Completed => {
                    let next = self.protocol.after(self.phase).ok_or_else(|| {
                        Error::Internal(format!("no phase follows {}", self.phase))
                    })?;
                    self.transition(next, ctx)?;
                }
            }
        }
    }

    fn is_complete(&self) -> bool {
        self.phase == SessionPhase::Complete
    }
}
