//! # ToneSet Engine (toneset-engine)
//!
//! Psychoacoustic threshold estimation and validation.
//!
//! **Purpose:** Run adaptive hearing tests (ramp, floor reduction, calibration
//! grid), turn the trial data into a continuous audibility model, and validate
//! that model against fresh trials with binomial hypothesis tests.
//!
//! **Architecture:** One worker thread per session ([`runner::SessionRunner`])
//! owns an explicit [`context::SessionContext`]; the subject-facing side talks to
//! it through the condvar-backed [`state::Session`]. Audio, responses, noise and
//! result persistence are collaborator traits.

pub mod confidence;
pub mod config;
pub mod context;
pub mod error;
mod interpolate;
pub mod model;
pub mod orchestrator;
pub mod phases;
pub mod player;
pub mod report;
pub mod results;
pub mod runner;
pub mod simulation;
pub mod sink;
pub mod state;
pub mod stats;
pub mod tone;
pub mod trial;

pub use config::SessionConfig;
pub use context::SessionContext;
pub use error::{Error, Result};
pub use interpolate::piecewise_linear;
pub use model::{AudibilityModel, Predictor, RampModel};
pub use orchestrator::{Protocol, SessionPhase, TestOrchestrator};
pub use runner::{SessionHandle, SessionRunner, SessionTask};
pub use state::Session;
pub use tone::{Direction, StimulusKind, Tone, VOL_MAX};
