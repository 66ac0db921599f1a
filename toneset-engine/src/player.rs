//! Stimulus playback and background noise collaborators
//!
//! The engine never synthesizes audio. It hands tone parameters to a
//! [`StimulusPlayer`] and noise settings to a [`NoiseController`].

use crate::error::{Error, Result};
use crate::tone::Tone;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

/// Plays stimuli on the session thread
pub trait StimulusPlayer: Send {
    /// Play `tone` for `duration`, blocking until playback completes or is interrupted
    ///
    /// Faults are reported as [`Error::Playback`]; the orchestrator turns them into a pause.
    fn play(&mut self, tone: &Tone, duration: Duration) -> Result<()>;

    /// Stop any playback in progress
    fn stop(&mut self);
}

/// Background masking noise family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum NoiseKind {
    #[default]
    None,
    White,
    Crowd,
}

impl FromStr for NoiseKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(NoiseKind::None),
            "white" => Ok(NoiseKind::White),
            "crowd" => Ok(NoiseKind::Crowd),
            other => Err(Error::Config(format!("Unrecognized noise type '{}'", other))),
        }
    }
}

impl fmt::Display for NoiseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NoiseKind::None => f.write_str("None"),
            NoiseKind::White => f.write_str("White"),
            NoiseKind::Crowd => f.write_str("Crowd"),
        }
    }
}

/// Background noise played for a whole session
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct NoiseSpec {
    kind: NoiseKind,
    volume: u32,
}

impl NoiseSpec {
    /// Noise at `volume` percent (0..=100)
    pub fn new(kind: NoiseKind, volume: u32) -> Result<Self> {
        if volume > 100 {
            return Err(Error::Config(format!(
                "noise volume must be within [0, 100], got {}",
                volume
            )));
        }
        Ok(Self { kind, volume })
    }

    pub fn none() -> Self {
        Self::default()
    }

    pub fn kind(&self) -> NoiseKind {
        self.kind
    }

    pub fn volume(&self) -> u32 {
        self.volume
    }

    pub fn is_silent(&self) -> bool {
        self.kind == NoiseKind::None || self.volume == 0
    }
}

impl fmt::Display for NoiseSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.kind == NoiseKind::None {
            write!(f, "None")
        } else {
            write!(f, "{} {}", self.kind, self.volume)
        }
    }
}

/// Starts and stops session background noise
pub trait NoiseController: Send {
    fn play(&mut self, noise: &NoiseSpec) -> Result<()>;
    fn stop(&mut self);
}

/// Controller for sessions without an audio backend: records what it was asked to play
#[derive(Debug, Default)]
pub struct SilentNoise {
    playing: Option<NoiseSpec>,
}

impl SilentNoise {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn playing(&self) -> Option<&NoiseSpec> {
        self.playing.as_ref()
    }
}

impl NoiseController for SilentNoise {
    fn play(&mut self, noise: &NoiseSpec) -> Result<()> {
        debug!("Background noise requested: {}", noise);
        self.playing = (!noise.is_silent()).then(|| noise.clone());
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(noise) = self.playing.take() {
            debug!("Background noise stopped: {}", noise);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_noise_volume_validated() {
        assert!(NoiseSpec::new(NoiseKind::White, 100).is_ok());
        assert!(matches!(NoiseSpec::new(NoiseKind::White, 101), Err(Error::Config(_))));
    }

    #[test]
    fn test_noise_kind_parsing() {
        assert_eq!("White".parse::<NoiseKind>().unwrap(), NoiseKind::White);
        assert_eq!("crowd".parse::<NoiseKind>().unwrap(), NoiseKind::Crowd);
        assert!("pink".parse::<NoiseKind>().is_err());
    }

    #[test]
    fn test_noise_display() {
        assert_eq!(NoiseSpec::none().to_string(), "None");
        assert_eq!(NoiseSpec::new(NoiseKind::Crowd, 30).unwrap().to_string(), "Crowd 30");
    }

    #[test]
    fn test_silent_noise_tracks_requests() {
        let mut noise = SilentNoise::new();
        noise.play(&NoiseSpec::new(NoiseKind::White, 20).unwrap()).unwrap();
        assert_eq!(noise.playing().map(|n| n.kind()), Some(NoiseKind::White));
        noise.stop();
        assert!(noise.playing().is_none());

        noise.play(&NoiseSpec::none()).unwrap();
        assert!(noise.playing().is_none());
    }
}
