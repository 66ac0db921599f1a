//! A subject's permanent result set
//!
//! Completed sessions are folded in behind `Arc` and are immutable from then on.

use super::{CalibrationResults, ConfidenceResults, FloorResults, RampResults};
use crate::orchestrator::Protocol;
use crate::player::NoiseSpec;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

/// Everything a finished calibration session produced
#[derive(Debug, Clone)]
pub struct CompletedCalibration {
    pub session_id: Uuid,
    pub completed_at: DateTime<Utc>,
    pub protocol: Protocol,
    pub noise: NoiseSpec,
    pub ramp: RampResults,
    pub floors: FloorResults,
    pub calibration: CalibrationResults,
}

/// Everything a finished confidence session produced
#[derive(Debug, Clone)]
pub struct CompletedConfidence {
    pub session_id: Uuid,
    pub completed_at: DateTime<Utc>,
    pub noise: NoiseSpec,
    pub results: ConfidenceResults,
}

#[derive(Debug, Clone, Default)]
pub struct SubjectResults {
    subject_id: u32,
    calibrations: Vec<Arc<CompletedCalibration>>,
    confidence: Vec<Arc<CompletedConfidence>>,
}

impl SubjectResults {
    pub fn new(subject_id: u32) -> Self {
        Self {
            subject_id,
            ..Self::default()
        }
    }

    pub fn subject_id(&self) -> u32 {
        self.subject_id
    }

    pub fn add_calibration(&mut self, completed: CompletedCalibration) -> Arc<CompletedCalibration> {
        let completed = Arc::new(completed);
        self.calibrations.push(Arc::clone(&completed));
        completed
    }

    pub fn add_confidence(&mut self, completed: CompletedConfidence) -> Arc<CompletedConfidence> {
        let completed = Arc::new(completed);
        self.confidence.push(Arc::clone(&completed));
        completed
    }

    pub fn calibrations(&self) -> &[Arc<CompletedCalibration>] {
        &self.calibrations
    }

    pub fn confidence_sessions(&self) -> &[Arc<CompletedConfidence>] {
        &self.confidence
    }

    /// Most recent calibration, optionally restricted to one noise condition
    pub fn latest_calibration(&self, noise: Option<&NoiseSpec>) -> Option<Arc<CompletedCalibration>> {
        self.calibrations
            .iter()
            .rev()
            .find(|c| noise.map_or(true, |n| c.noise == *n))
            .cloned()
    }
}
