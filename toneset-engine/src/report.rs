//! Report generation and formatting
//!
//! **Purpose:** JSON export/import of completed sessions and CLI output.
//!
//! A calibration report carries everything needed to rebuild the audibility
//! model later (ramp, floor and per-volume outcome lists), so a confidence
//! session can be run from a report file alone.

use crate::confidence::{CaseAnalysis, CaseOutcome, LengthSummary};
use crate::error::Result;
use crate::orchestrator::Protocol;
use crate::player::NoiseSpec;
use crate::results::{
    CalibrationResults, CompletedCalibration, FloorResults, RampResults, SingleFrequencyResult,
};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, Write};
use std::path::Path;
use uuid::Uuid;

/// Report format version
pub const REPORT_VERSION: &str = "1.0";

/// Session metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub session_id: Uuid,
    pub subject_id: u32,
    /// Stimulus identifier (`sine-single`, ...)
    pub stimulus: String,
    pub noise: NoiseSpec,
    /// Completion timestamp (RFC 3339)
    pub timestamp: String,
    /// Trials recorded by the session
    pub trials: usize,
    pub version: String,
}

impl SessionInfo {
    pub fn new(session_id: Uuid, subject_id: u32, stimulus: String, noise: NoiseSpec, trials: usize) -> Self {
        Self {
            session_id,
            subject_id,
            stimulus,
            noise,
            timestamp: chrono::Utc::now().to_rfc3339(),
            trials,
            version: REPORT_VERSION.to_string(),
        }
    }
}

/// Outcomes at one calibration volume
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeSummary {
    pub volume: f64,
    pub heard: u32,
    pub not_heard: u32,
    /// Heard/not-heard in trial order
    pub outcomes: Vec<bool>,
}

/// One calibrated frequency with its derived floor and ceiling
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrequencySummary {
    pub frequency: f64,
    pub floor: Option<f64>,
    pub ceiling: Option<f64>,
    pub volumes: Vec<VolumeSummary>,
}

impl FrequencySummary {
    pub fn from_result(result: &SingleFrequencyResult) -> Self {
        Self {
            frequency: result.frequency(),
            floor: result.floor(),
            ceiling: result.ceiling(),
            volumes: result
                .iter()
                .map(|(volume, tally)| VolumeSummary {
                    volume,
                    heard: tally.times_heard(),
                    not_heard: tally.times_not_heard(),
                    outcomes: tally.outcomes().to_vec(),
                })
                .collect(),
        }
    }
}

/// Complete calibration session report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationReport {
    pub session: SessionInfo,
    pub protocol: Protocol,
    pub ramp: RampResults,
    pub floors: FloorResults,
    pub calibration: Vec<FrequencySummary>,
}

impl CalibrationReport {
    pub fn from_completed(
        completed: &CompletedCalibration,
        subject_id: u32,
        stimulus: String,
        trials: usize,
    ) -> Self {
        Self {
            session: SessionInfo::new(
                completed.session_id,
                subject_id,
                stimulus,
                completed.noise.clone(),
                trials,
            ),
            protocol: completed.protocol,
            ramp: completed.ramp.clone(),
            floors: completed.floors.clone(),
            calibration: completed
                .calibration
                .iter()
                .map(FrequencySummary::from_result)
                .collect(),
        }
    }

    /// Rebuild calibration results from the stored outcome lists
    pub fn calibration_results(&self) -> CalibrationResults {
        CalibrationResults::from_frequency_results(self.calibration.iter().map(|summary| {
            SingleFrequencyResult::from_outcomes(
                summary.frequency,
                summary
                    .volumes
                    .iter()
                    .map(|v| (v.volume, v.outcomes.as_slice())),
            )
        }))
    }

    /// Export report to JSON file
    pub fn export_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        write_json(self, path.as_ref())
    }

    /// Import report from JSON file
    pub fn import_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }
}

/// Complete confidence session report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfidenceReport {
    pub session: SessionInfo,
    /// Calibration session the predictor was built from
    pub calibration_session: Option<Uuid>,
    /// `calibrated` or `ramp`
    pub predictor: String,
    pub alpha: f64,
    pub cases: Vec<CaseAnalysis>,
    pub calibration_lengths: Vec<LengthSummary>,
}

impl ConfidenceReport {
    pub fn new(
        session: SessionInfo,
        calibration_session: Option<Uuid>,
        predictor: &str,
        alpha: f64,
        cases: Vec<CaseAnalysis>,
    ) -> Self {
        Self {
            session,
            calibration_session,
            predictor: predictor.to_string(),
            alpha,
            cases,
            calibration_lengths: Vec::new(),
        }
    }

    pub fn with_calibration_lengths(mut self, lengths: Vec<LengthSummary>) -> Self {
        self.calibration_lengths = lengths;
        self
    }

    pub fn significant_cases(&self) -> usize {
        self.cases.iter().filter(|c| c.is_significant()).count()
    }

    pub fn export_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        write_json(self, path.as_ref())
    }

    pub fn import_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }
}

fn write_json<T: Serialize>(value: &T, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let json = serde_json::to_string_pretty(value)?;
    let mut file = File::create(path)?;
    file.write_all(json.as_bytes())?;
    Ok(())
}

fn format_volume(volume: Option<f64>) -> String {
    volume
        .map(|v| format!("{:9.2}", v))
        .unwrap_or_else(|| "        -".to_string())
}

/// CLI formatter for session results
pub struct CliFormatter;

impl CliFormatter {
    /// Example: `Phase 2: reduce...`
    pub fn format_phase_header(index: usize, name: &str) -> String {
        format!("\nPhase {}: {}...\n", index, name)
    }

    /// Ramp and floor estimates per frequency
    pub fn format_ramp_summary(ramp: &RampResults, floors: &FloorResults) -> String {
        let mut output = String::new();

        output.push_str("\nRamp Summary:\n");
        output.push_str("┌───────────┬───────────┬───────────┬───────────┐\n");
        output.push_str("│ Freq (Hz) │      vol1 │      vol2 │     floor │\n");
        output.push_str("├───────────┼───────────┼───────────┼───────────┤\n");
        for entry in ramp.sorted() {
            output.push_str(&format!(
                "│ {:9.1} │ {:9.2} │ {:9.2} │ {} │\n",
                entry.frequency,
                entry.vol1,
                entry.vol2,
                format_volume(floors.get(entry.frequency))
            ));
        }
        output.push_str("└───────────┴───────────┴───────────┴───────────┘\n");

        output
    }

    /// Floor, ceiling and trial counts per calibrated frequency
    pub fn format_calibration_table(calibration: &[FrequencySummary]) -> String {
        let mut output = String::new();

        output.push_str("\nCalibration:\n");
        output.push_str("┌───────────┬───────────┬───────────┬─────────┬────────┐\n");
        output.push_str("│ Freq (Hz) │     floor │   ceiling │ volumes │ trials │\n");
        output.push_str("├───────────┼───────────┼───────────┼─────────┼────────┤\n");
        for summary in calibration {
            let trials: u32 = summary.volumes.iter().map(|v| v.heard + v.not_heard).sum();
            output.push_str(&format!(
                "│ {:9.1} │ {} │ {} │ {:7} │ {:6} │\n",
                summary.frequency,
                format_volume(summary.floor),
                format_volume(summary.ceiling),
                summary.volumes.len(),
                trials
            ));
        }
        output.push_str("└───────────┴───────────┴───────────┴─────────┴────────┘\n");

        output
    }

    /// Example: `[✓] 440.0 Hz Flat, vol 26.00 (40%): 9/20 vs 0.40, p=0.3145`
    pub fn format_case(analysis: &CaseAnalysis) -> String {
        let case = &analysis.case;
        match &analysis.outcome {
            CaseOutcome::Analyzed(result) => {
                let symbol = if result.is_significant() { "✗" } else { "✓" };
                format!(
                    "[{}] {:.1} Hz {}, vol {:.2} ({}): {}/{} vs {:.2}, p={:.4}, region [{}, {}], power {:.2}",
                    symbol,
                    case.tone.frequency(),
                    case.tone.direction(),
                    case.tone.volume(),
                    case.label,
                    result.correct,
                    result.correct + result.incorrect,
                    result.estimate,
                    result.test.p_value,
                    result.test.region.low,
                    result.test.region.high,
                    result.test.power
                )
            }
            CaseOutcome::InsufficientData => format!(
                "[?] {:.1} Hz {}, vol {:.2} ({}): insufficient data",
                case.tone.frequency(),
                case.tone.direction(),
                case.tone.volume(),
                case.label
            ),
        }
    }

    pub fn format_analysis(report: &ConfidenceReport) -> String {
        let mut output = String::new();

        output.push_str(&format!(
            "\nConfidence analysis ({} predictor, alpha = {:.2}):\n",
            report.predictor, report.alpha
        ));
        for analysis in &report.cases {
            output.push_str(&Self::format_case(analysis));
            output.push('\n');
        }
        output.push_str(&format!(
            "Estimates significantly different: {}/{}\n",
            report.significant_cases(),
            report.cases.len()
        ));

        if !report.calibration_lengths.is_empty() {
            output.push_str("\nCalibration length comparison:\n");
            for summary in &report.calibration_lengths {
                output.push_str(&format!(
                    "  {} trials/volume: {}/{} significant\n",
                    summary.trials_per_volume, summary.significant, summary.tested
                ));
            }
        }

        output
    }

    pub fn format_session_summary(report: &CalibrationReport) -> String {
        let mut output = String::new();

        output.push_str("\n╔════════════════════════════════════════╗\n");
        output.push_str("║         Calibration Complete           ║\n");
        output.push_str("╚════════════════════════════════════════╝\n\n");

        output.push_str(&format!("Subject: {}\n", report.session.subject_id));
        output.push_str(&format!("Protocol: {}\n", report.protocol));
        output.push_str(&format!("Stimulus: {}\n", report.session.stimulus));
        output.push_str(&format!("Noise: {}\n", report.session.noise));
        output.push_str(&format!("Trials recorded: {}\n", report.session.trials));
        output.push_str(&format!("Frequencies calibrated: {}\n", report.calibration.len()));

        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::confidence::{CaseLabel, DesignedCase};
    use crate::results::ConfidenceCase;
    use crate::stats::StatsAnalysisResult;
    use crate::tone::Tone;

    fn completed() -> CompletedCalibration {
        let mut ramp = RampResults::new();
        ramp.record(500.0, 120.0, 100.0);
        let mut floors = FloorResults::new();
        floors.record(500.0, 40.0);
        let mut calibration = CalibrationResults::new();
        for (volume, heard) in [(48.0, false), (48.0, false), (84.0, true), (84.0, false), (120.0, true)] {
            calibration.record(500.0, volume, heard);
        }
        CompletedCalibration {
            session_id: Uuid::new_v4(),
            completed_at: chrono::Utc::now(),
            protocol: Protocol::Full,
            noise: NoiseSpec::none(),
            ramp,
            floors,
            calibration,
        }
    }

    #[test]
    fn test_report_rebuilds_calibration_results() {
        let completed = completed();
        let report = CalibrationReport::from_completed(&completed, 3, "sine-single".to_string(), 5);
        assert_eq!(report.session.version, REPORT_VERSION);
        assert_eq!(report.calibration.len(), 1);
        assert_eq!(report.calibration[0].floor, Some(48.0));
        assert_eq!(report.calibration[0].ceiling, Some(120.0));
        assert_eq!(report.calibration_results(), completed.calibration);
    }

    #[test]
    fn test_json_export_import() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reports").join("calibration.json");
        let report = CalibrationReport::from_completed(&completed(), 3, "sine-single".to_string(), 5);

        report.export_json(&path).unwrap();
        let imported = CalibrationReport::import_json(&path).unwrap();

        assert_eq!(imported.session, report.session);
        assert_eq!(imported.protocol, Protocol::Full);
        assert_eq!(imported.ramp, report.ramp);
        assert_eq!(imported.calibration_results(), report.calibration_results());
    }

    #[test]
    fn test_format_tables() {
        let report = CalibrationReport::from_completed(&completed(), 3, "sine-single".to_string(), 5);
        let ramp = CliFormatter::format_ramp_summary(&report.ramp, &report.floors);
        assert!(ramp.contains("500.0"));
        assert!(ramp.contains("40.00"));

        let table = CliFormatter::format_calibration_table(&report.calibration);
        assert!(table.contains("Freq (Hz)"));
        assert!(table.contains("120.00"));

        let summary = CliFormatter::format_session_summary(&report);
        assert!(summary.contains("Protocol: full"));
    }

    #[test]
    fn test_format_case() {
        let tone = Tone::single(440.0, 30.0).unwrap();
        let case = DesignedCase {
            label: CaseLabel::Interpolated { fraction: 0.4 },
            tone: tone.clone(),
            estimate: 0.5,
        };
        let counts = ConfidenceCase {
            tone,
            correct: 15,
            incorrect: 5,
        };
        let analyzed = CaseAnalysis {
            case: case.clone(),
            outcome: CaseOutcome::Analyzed(StatsAnalysisResult::analyze(&counts, 0.5, 0.1).unwrap()),
        };
        let line = CliFormatter::format_case(&analyzed);
        assert!(line.starts_with("[✗]"));
        assert!(line.contains("(40%)"));
        assert!(line.contains("15/20"));

        let missing = CaseAnalysis {
            case,
            outcome: CaseOutcome::InsufficientData,
        };
        assert!(CliFormatter::format_case(&missing).contains("insufficient data"));
    }
}
