//! Result accumulation for every test phase
//!
//! Results are append-only while a session runs and are handed to the model and
//! the confidence engine by reference.

mod calibration;
mod confidence;
mod frequency;
mod ramp;
mod subject;

pub use calibration::CalibrationResults;
pub use confidence::{ConfidenceCase, ConfidenceResults};
pub use frequency::{SingleFrequencyResult, VolumeTally};
pub use ramp::{FloorEntry, FloorResults, RampEntry, RampResults};
pub use subject::{CompletedCalibration, CompletedConfidence, SubjectResults};
