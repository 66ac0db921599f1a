//! Calibration phases
//!
//! Each phase owns its own progress (position, active set, pending schedule) so a
//! paused phase can be re-entered and continue from the first unconsumed trial.
//! A phase never records a trial it did not see through to the end of its
//! response window.

pub mod calibration;
pub mod floor;
pub mod ramp;

pub use calibration::CalibrationSampler;
pub use floor::FloorEstimator;
pub use ramp::RampEstimator;

use crate::context::SessionContext;
use crate::error::Result;
use tracing::warn;

/// How a call to [`Phase::run`] (or a session task) ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseOutcome {
    /// Every trial of the phase has been recorded
    Completed,
    /// Stopped at a trial boundary because of pause, stop or fault
    Paused,
}

/// One resumable step of a calibration protocol
pub trait Phase {
    /// Name used in sink markers and events
    fn name(&self) -> &'static str;

    /// Run trials until the phase completes or the session is interrupted
    fn run(&mut self, ctx: &mut SessionContext) -> Result<PhaseOutcome>;

    fn is_complete(&self) -> bool;
}

/// Turn playback and response-channel faults into a pause
///
/// Any other error is returned unchanged.
pub(crate) fn pause_on_fault(
    ctx: &mut SessionContext,
    result: Result<PhaseOutcome>,
) -> Result<PhaseOutcome> {
    match result {
        Err(e) if e.is_fault() => {
            warn!("Pausing session after fault: {}", e);
            ctx.session().fault(e.to_string());
            Ok(PhaseOutcome::Paused)
        }
        other => other,
    }
}
