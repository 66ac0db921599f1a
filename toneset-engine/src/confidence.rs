//! # Confidence (Validation) Engine
//!
//! **Purpose:** Check a predictor against fresh trials.
//!
//! **Battery design:** for each stimulus variant the target frequencies are
//! shuffled and each takes one case, in this order:
//! 1. ceiling estimate × ceiling boost (expected to be heard nearly always)
//! 2. floor estimate (expected to be heard nearly never)
//! 3. ceiling × moderate boost
//! 4. ceiling × far boost
//! 5. remaining frequencies interpolated between floor and ceiling at evenly
//!    increasing percentages, from `interpolation_start` towards 100%
//!
//! Every case is repeated `trials_per_tone` times and the whole schedule is
//! shuffled once. Each case's predicted probability is stored at design time and
//! tested against the observed success count with [`binomial_test`].

use crate::config::ConfidenceConfig;
use crate::context::{SessionContext, TrialOutcome};
use crate::error::{Error, Result};
use crate::model::{AudibilityModel, Predictor};
use crate::phases::{pause_on_fault, PhaseOutcome};
use crate::player::NoiseSpec;
use crate::results::{CalibrationResults, CompletedConfidence, ConfidenceResults};
use crate::runner::SessionTask;
use crate::stats::{binomial_test, StatsAnalysisResult};
use crate::tone::{StimulusKind, Tone, VOL_MAX};
use crate::trial::ResponseMode;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use toneset_common::time;
use tracing::{debug, info};
use uuid::Uuid;

pub const CONFIDENCE_PHASE: &str = "confidence";

/// Number of fixed (non-interpolated) cases per variant
const FIXED_CASES: usize = 4;

/// Role of a case in the battery
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CaseLabel {
    Ceiling,
    Floor,
    Moderate,
    Far,
    /// Fraction of the way from floor to ceiling
    Interpolated { fraction: f64 },
}

impl fmt::Display for CaseLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaseLabel::Ceiling => f.write_str("ceiling"),
            CaseLabel::Floor => f.write_str("floor"),
            CaseLabel::Moderate => f.write_str("moderate"),
            CaseLabel::Far => f.write_str("far"),
            CaseLabel::Interpolated { fraction } => write!(f, "{:.0}%", fraction * 100.0),
        }
    }
}

/// One designed test case and the predictor's estimate for it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DesignedCase {
    pub label: CaseLabel,
    pub tone: Tone,
    pub estimate: f64,
}

/// Analysis outcome for one designed case
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CaseOutcome {
    Analyzed(StatsAnalysisResult),
    /// No trials were recorded for the case
    InsufficientData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseAnalysis {
    pub case: DesignedCase,
    pub outcome: CaseOutcome,
}

impl CaseAnalysis {
    pub fn is_significant(&self) -> bool {
        matches!(&self.outcome, CaseOutcome::Analyzed(r) if r.is_significant())
    }
}

/// Where case `index` of `count` sits in the battery
fn label_for(index: usize, count: usize, start: f64) -> CaseLabel {
    match index {
        0 => CaseLabel::Ceiling,
        1 => CaseLabel::Floor,
        2 => CaseLabel::Moderate,
        3 => CaseLabel::Far,
        _ => {
            let step = (1.0 - start) / (count - FIXED_CASES) as f64;
            CaseLabel::Interpolated {
                fraction: start + step * (index - FIXED_CASES) as f64,
            }
        }
    }
}

fn case_volume(label: CaseLabel, floor: f64, ceiling: f64, config: &ConfidenceConfig) -> f64 {
    let volume = match label {
        CaseLabel::Ceiling => ceiling * config.ceiling_boost,
        CaseLabel::Floor => floor,
        CaseLabel::Moderate => ceiling * config.moderate_boost,
        CaseLabel::Far => ceiling * config.far_boost,
        CaseLabel::Interpolated { fraction } => floor + fraction * (ceiling - floor),
    };
    volume.clamp(0.0, VOL_MAX)
}

/// Design the case list for a predictor
pub fn design_cases<R: Rng + ?Sized>(
    predictor: &dyn Predictor,
    frequencies: &[f64],
    stimulus: StimulusKind,
    config: &ConfidenceConfig,
    tone_duration_ms: u64,
    rng: &mut R,
) -> Result<Vec<DesignedCase>> {
    let mut cases = Vec::new();
    for variant in 0..stimulus.variants() {
        let mut order = frequencies.to_vec();
        order.shuffle(rng);

        for (index, &frequency) in order.iter().enumerate() {
            let template = stimulus.tone(frequency, variant, 1.0, tone_duration_ms)?;
            let floor = predictor.floor_estimate(&template)?;
            let ceiling = predictor.ceiling_estimate(&template)?;
            let label = label_for(index, order.len(), config.interpolation_start);
            let tone = template.with_volume(case_volume(label, floor, ceiling, config))?;
            let estimate = predictor.probability(&tone)?;
            debug!("Confidence case {} {}: estimate {:.3}", label, tone, estimate);
            cases.push(DesignedCase { label, tone, estimate });
        }
    }
    Ok(cases)
}

/// Test a recorded tone against a predictor's estimate
///
/// Fails with `PairNotTested` if the tone has no confidence results.
pub fn analyze_tone(
    results: &ConfidenceResults,
    predictor: &dyn Predictor,
    tone: &Tone,
    alpha: f64,
) -> Result<StatsAnalysisResult> {
    let case = results
        .case(tone)
        .ok_or_else(|| Error::PairNotTested(tone.to_string()))?;
    let estimate = predictor.probability(tone)?;
    StatsAnalysisResult::analyze(case, estimate, alpha)
}

/// Significance summary of one calibration length
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LengthSummary {
    pub trials_per_volume: usize,
    pub tested: usize,
    pub significant: usize,
}

/// Re-analyse confidence results with models built from the first `n` trials
/// per calibration volume, for each `n` in `lengths`
pub fn compare_calibration_lengths(
    calibration: &CalibrationResults,
    confidence: &ConfidenceResults,
    lengths: &[usize],
    alpha: f64,
) -> Result<Vec<LengthSummary>> {
    let mut summaries = Vec::with_capacity(lengths.len());
    for &n in lengths {
        let subset = calibration.subset(n);
        let model = AudibilityModel::new(&subset);
        let mut tested = 0;
        let mut significant = 0;
        for case in confidence.cases().filter(|c| c.total() > 0) {
            let estimate = model.probability(&case.tone)?;
            let test = binomial_test(case.correct as u64, case.total() as u64, estimate, alpha)?;
            tested += 1;
            if test.significant {
                significant += 1;
            }
        }
        summaries.push(LengthSummary {
            trials_per_volume: n,
            tested,
            significant,
        });
    }
    Ok(summaries)
}

/// Confidence battery run as a session task
#[derive(Debug, Clone)]
pub struct ConfidenceTest {
    alpha: f64,
    mode: ResponseMode,
    cases: Vec<DesignedCase>,
    /// Indices into `cases`, one per trial
    schedule: Vec<usize>,
    position: usize,
    started: bool,
    results: ConfidenceResults,
}

impl ConfidenceTest {
    /// Design the battery for `predictor` and shuffle the trial schedule
    pub fn design<R: Rng + ?Sized>(
        predictor: &dyn Predictor,
        frequencies: &[f64],
        stimulus: StimulusKind,
        config: &ConfidenceConfig,
        tone_duration_ms: u64,
        rng: &mut R,
    ) -> Result<Self> {
        if frequencies.is_empty() {
            return Err(Error::Config("confidence test needs at least one frequency".to_string()));
        }
        let cases = design_cases(predictor, frequencies, stimulus, config, tone_duration_ms, rng)?;
        let mode = if stimulus.is_directional() {
            ResponseMode::Direction
        } else {
            ResponseMode::Detection
        };
        Ok(Self::from_cases(cases, config.trials_per_tone, mode, config.alpha, rng))
    }

    pub fn from_cases<R: Rng + ?Sized>(
        cases: Vec<DesignedCase>,
        trials_per_tone: usize,
        mode: ResponseMode,
        alpha: f64,
        rng: &mut R,
    ) -> Self {
        let mut schedule: Vec<usize> = (0..trials_per_tone).flat_map(|_| 0..cases.len()).collect();
        schedule.shuffle(rng);
        Self {
            alpha,
            mode,
            cases,
            schedule,
            position: 0,
            started: false,
            results: ConfidenceResults::new(),
        }
    }

    pub fn cases(&self) -> &[DesignedCase] {
        &self.cases
    }

    pub fn schedule_len(&self) -> usize {
        self.schedule.len()
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn mode(&self) -> ResponseMode {
        self.mode
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn results(&self) -> &ConfidenceResults {
        &self.results
    }

    /// Analyse one designed tone against its stored estimate
    pub fn analyze_case(&self, tone: &Tone) -> Result<StatsAnalysisResult> {
        let designed = self
            .cases
            .iter()
            .find(|c| c.tone == *tone)
            .ok_or_else(|| Error::PairNotTested(tone.to_string()))?;
        let case = self
            .results
            .case(tone)
            .ok_or_else(|| Error::PairNotTested(tone.to_string()))?;
        StatsAnalysisResult::analyze(case, designed.estimate, self.alpha)
    }

    /// Every designed case with its outcome
    pub fn analyze(&self) -> Result<Vec<CaseAnalysis>> {
        let mut analyses = Vec::with_capacity(self.cases.len());
        for designed in &self.cases {
            let outcome = match self.results.case(&designed.tone) {
                Some(case) if case.total() > 0 => {
                    CaseOutcome::Analyzed(StatsAnalysisResult::analyze(case, designed.estimate, self.alpha)?)
                }
                _ => CaseOutcome::InsufficientData,
            };
            analyses.push(CaseAnalysis {
                case: designed.clone(),
                outcome,
            });
        }
        Ok(analyses)
    }

    /// Snapshot for the subject's result set
    pub fn completed(&self, session_id: Uuid, noise: NoiseSpec) -> Result<CompletedConfidence> {
        if !self.is_complete() {
            return Err(Error::InvalidState(format!(
                "confidence test has {} trials left",
                self.schedule.len() - self.position
            )));
        }
        Ok(CompletedConfidence {
            session_id,
            completed_at: time::now(),
            noise,
            results: self.results.clone(),
        })
    }

    fn run_trials(&mut self, ctx: &mut SessionContext) -> Result<PhaseOutcome> {
        while let Some(&index) = self.schedule.get(self.position) {
            if !ctx.inter_trial_gap() {
                return Ok(PhaseOutcome::Paused);
            }
            let tone = &self.cases[index].tone;
            let trial = match ctx.present(tone, self.mode)? {
                TrialOutcome::Completed(trial) => trial,
                TrialOutcome::Interrupted => return Ok(PhaseOutcome::Paused),
            };
            self.results.record_trial(&trial);
            ctx.record(CONFIDENCE_PHASE, &trial);
            self.position += 1;
        }
        Ok(PhaseOutcome::Completed)
    }
}

impl SessionTask for ConfidenceTest {
    fn name(&self) -> &'static str {
        CONFIDENCE_PHASE
    }

    fn advance(&mut self, ctx: &mut SessionContext) -> Result<PhaseOutcome> {
        if self.is_complete() {
            return Ok(PhaseOutcome::Completed);
        }
        if ctx.session().is_interrupted() {
            return Ok(PhaseOutcome::Paused);
        }
        if !self.started {
            self.started = true;
            ctx.session_started();
            ctx.phase_started(CONFIDENCE_PHASE);
        }

        let result = self.run_trials(ctx);
        let outcome = pause_on_fault(ctx, result)?;
        if outcome == PhaseOutcome::Completed {
            info!(
                "Confidence test recorded {} trials over {} cases",
                self.results.total_trials(),
                self.cases.len()
            );
            ctx.phase_completed(CONFIDENCE_PHASE);
            ctx.session_completed();
        }
        Ok(outcome)
    }

    fn is_complete(&self) -> bool {
        self.position >= self.schedule.len()
    }
}
