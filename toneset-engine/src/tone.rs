//! # Stimulus Model
//!
//! **Purpose:** Immutable value types for the stimuli presented to a subject:
//! single tones, two-tone intervals and multi-note melodies.
//!
//! A [`Tone`] pairs a closed [`ToneKind`] variant with a playback volume. Tones are
//! never mutated; [`Tone::with_volume`] returns a new instance. Volumes live on the
//! 16-bit sample amplitude scale `0..=VOL_MAX`.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Loudest representable volume (16-bit sample amplitude)
pub const VOL_MAX: f64 = 32767.0;

/// Default length of a presented tone
pub const DEFAULT_TONE_DURATION_MS: u64 = 1500;

/// Default frequency ratio between the two notes of an interval
pub const DEFAULT_INTERVAL_RATIO: f64 = 1.25;

/// Pitch movement of a stimulus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
    Flat,
}

impl Direction {
    fn between(first: f64, last: f64) -> Self {
        if last > first {
            Direction::Up
        } else if last < first {
            Direction::Down
        } else {
            Direction::Flat
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Up => write!(f, "up"),
            Direction::Down => write!(f, "down"),
            Direction::Flat => write!(f, "flat"),
        }
    }
}

/// One note of a melody; `frequency == None` is a rest
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub frequency: Option<f64>,
    pub duration_ms: u64,
}

impl Note {
    pub fn pitch(frequency: f64, duration_ms: u64) -> Self {
        Self {
            frequency: Some(frequency),
            duration_ms,
        }
    }

    pub fn rest(duration_ms: u64) -> Self {
        Self {
            frequency: None,
            duration_ms,
        }
    }

    pub fn is_rest(&self) -> bool {
        self.frequency.is_none()
    }
}

/// Shape of a stimulus, independent of its volume
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToneKind {
    /// One sine tone
    Single { frequency: f64 },
    /// Two sine tones played in sequence
    Interval { first: f64, second: f64 },
    /// Ordered notes, possibly with rests
    Melody { notes: Vec<Note> },
}

/// An immutable stimulus: a [`ToneKind`] at a volume
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "UncheckedTone")]
pub struct Tone {
    kind: ToneKind,
    volume: f64,
}

#[derive(Deserialize)]
struct UncheckedTone {
    kind: ToneKind,
    volume: f64,
}

impl TryFrom<UncheckedTone> for Tone {
    type Error = Error;

    fn try_from(raw: UncheckedTone) -> Result<Self> {
        Tone::new(raw.kind, raw.volume)
    }
}

fn check_frequency(frequency: f64) -> Result<()> {
    if frequency.is_finite() && frequency > 0.0 {
        Ok(())
    } else {
        Err(Error::InvalidTone(format!(
            "frequency must be a positive number of Hz, got {}",
            frequency
        )))
    }
}

/// Validate a volume against `0..=VOL_MAX`
pub fn check_volume(volume: f64) -> Result<()> {
    if volume.is_finite() && (0.0..=VOL_MAX).contains(&volume) {
        Ok(())
    } else {
        Err(Error::InvalidTone(format!(
            "volume must be within [0, {}], got {}",
            VOL_MAX, volume
        )))
    }
}

impl Tone {
    /// Build a tone, validating every frequency and the volume
    pub fn new(kind: ToneKind, volume: f64) -> Result<Self> {
        match &kind {
            ToneKind::Single { frequency } => check_frequency(*frequency)?,
            ToneKind::Interval { first, second } => {
                check_frequency(*first)?;
                check_frequency(*second)?;
            }
            ToneKind::Melody { notes } => {
                if notes.iter().all(Note::is_rest) {
                    return Err(Error::InvalidTone(
                        "melody needs at least one audible note".to_string(),
                    ));
                }
                for freq in notes.iter().filter_map(|n| n.frequency) {
                    check_frequency(freq)?;
                }
            }
        }
        check_volume(volume)?;
        Ok(Self { kind, volume })
    }

    pub fn single(frequency: f64, volume: f64) -> Result<Self> {
        Self::new(ToneKind::Single { frequency }, volume)
    }

    pub fn interval(first: f64, second: f64, volume: f64) -> Result<Self> {
        Self::new(ToneKind::Interval { first, second }, volume)
    }

    pub fn melody(notes: Vec<Note>, volume: f64) -> Result<Self> {
        Self::new(ToneKind::Melody { notes }, volume)
    }

    pub fn kind(&self) -> &ToneKind {
        &self.kind
    }

    pub fn volume(&self) -> f64 {
        self.volume
    }

    /// Primary frequency: the single tone, the first interval note, or the first
    /// audible melody note
    pub fn frequency(&self) -> f64 {
        match &self.kind {
            ToneKind::Single { frequency } => *frequency,
            ToneKind::Interval { first, .. } => *first,
            ToneKind::Melody { notes } => notes
                .iter()
                .find_map(|n| n.frequency)
                .unwrap_or_default(),
        }
    }

    /// All audible frequencies in presentation order
    pub fn frequencies(&self) -> Vec<f64> {
        match &self.kind {
            ToneKind::Single { frequency } => vec![*frequency],
            ToneKind::Interval { first, second } => vec![*first, *second],
            ToneKind::Melody { notes } => notes.iter().filter_map(|n| n.frequency).collect(),
        }
    }

    pub fn direction(&self) -> Direction {
        match &self.kind {
            ToneKind::Single { .. } => Direction::Flat,
            ToneKind::Interval { first, second } => Direction::between(*first, *second),
            ToneKind::Melody { .. } => {
                let freqs = self.frequencies();
                match (freqs.first(), freqs.last()) {
                    (Some(first), Some(last)) => Direction::between(*first, *last),
                    _ => Direction::Flat,
                }
            }
        }
    }

    /// Same stimulus at a new volume
    pub fn with_volume(&self, volume: f64) -> Result<Self> {
        check_volume(volume)?;
        Ok(Self {
            kind: self.kind.clone(),
            volume,
        })
    }
}

impl fmt::Display for Tone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ToneKind::Single { frequency } => {
                write!(f, "{:.1}Hz @ {:.4}", frequency, self.volume)
            }
            ToneKind::Interval { first, second } => {
                write!(f, "{:.1}Hz -> {:.1}Hz @ {:.4}", first, second, self.volume)
            }
            ToneKind::Melody { notes } => {
                let parts: Vec<String> = notes
                    .iter()
                    .map(|n| match n.frequency {
                        Some(freq) => format!("{:.1}", freq),
                        None => "rest".to_string(),
                    })
                    .collect();
                write!(f, "[{}]Hz @ {:.4}", parts.join(", "), self.volume)
            }
        }
    }
}

/// Built-in melodies, each anchored on a base frequency
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MelodyPreset {
    /// Root, major third, fifth (ascending)
    MajTriadUp,
    /// Root, fourth below, sixth below (descending)
    MajTriadDown,
    /// One pitch in the eighth-note rhythm `|.||.|.|`
    SingleFreqRhythm,
}

const RHYTHM_PATTERN: &str = "|.||.|.|";

impl MelodyPreset {
    /// Every preset, in the order a melody set presents them
    pub const ALL: [MelodyPreset; 3] = [
        MelodyPreset::MajTriadUp,
        MelodyPreset::MajTriadDown,
        MelodyPreset::SingleFreqRhythm,
    ];

    pub fn id(&self) -> &'static str {
        match self {
            MelodyPreset::MajTriadUp => "maj-triad-up",
            MelodyPreset::MajTriadDown => "maj-triad-down",
            MelodyPreset::SingleFreqRhythm => "single-freq-rhythm",
        }
    }

    /// Notes of the preset, scaled to `base` and a total `duration_ms`
    pub fn notes(&self, base: f64, duration_ms: u64) -> Vec<Note> {
        let quarter = duration_ms / 4;
        let half = duration_ms / 2;
        match self {
            MelodyPreset::MajTriadUp => vec![
                Note::pitch(base, quarter),
                Note::pitch(base * 1.189207, quarter),
                Note::pitch(base * 1.587401, half),
            ],
            MelodyPreset::MajTriadDown => vec![
                Note::pitch(base, quarter),
                Note::pitch(base / 1.334840, quarter),
                Note::pitch(base / 1.587401, half),
            ],
            MelodyPreset::SingleFreqRhythm => {
                let eighth = duration_ms / RHYTHM_PATTERN.len() as u64;
                RHYTHM_PATTERN
                    .chars()
                    .map(|c| {
                        if c == '|' {
                            Note::pitch(base, eighth)
                        } else {
                            Note::rest(eighth)
                        }
                    })
                    .collect()
            }
        }
    }
}

impl FromStr for MelodyPreset {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "maj-triad-up" => Ok(MelodyPreset::MajTriadUp),
            "maj-triad-down" => Ok(MelodyPreset::MajTriadDown),
            "single-freq-rhythm" => Ok(MelodyPreset::SingleFreqRhythm),
            other => Err(Error::Config(format!("Unrecognized melody preset '{}'", other))),
        }
    }
}

/// Family of stimuli a test presents for each frequency
///
/// Identifiers: `sine-single`, `sine-interval`, `sine-melody:<preset>`,
/// `sine-melody-set`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StimulusKind {
    Single,
    /// Upward and downward interval around each frequency
    Interval { ratio: f64 },
    Melody { preset: MelodyPreset },
    /// Rising triad, falling triad and flat rhythm around each frequency
    MelodySet,
}

impl StimulusKind {
    /// Number of distinct tones presented per (frequency, volume)
    pub fn variants(&self) -> usize {
        match self {
            StimulusKind::Interval { .. } => 2,
            StimulusKind::MelodySet => MelodyPreset::ALL.len(),
            StimulusKind::Single | StimulusKind::Melody { .. } => 1,
        }
    }

    /// Build variant `index` of this stimulus family
    pub fn tone(&self, frequency: f64, index: usize, volume: f64, duration_ms: u64) -> Result<Tone> {
        match self {
            StimulusKind::Single => Tone::single(frequency, volume),
            StimulusKind::Interval { ratio } => {
                let second = if index % 2 == 0 {
                    frequency * ratio
                } else {
                    frequency / ratio
                };
                Tone::interval(frequency, second, volume)
            }
            StimulusKind::Melody { preset } => {
                Tone::melody(preset.notes(frequency, duration_ms), volume)
            }
            StimulusKind::MelodySet => {
                let preset = MelodyPreset::ALL[index % MelodyPreset::ALL.len()];
                Tone::melody(preset.notes(frequency, duration_ms), volume)
            }
        }
    }

    /// Every variant at a (frequency, volume)
    pub fn tones_for(&self, frequency: f64, volume: f64, duration_ms: u64) -> Result<Vec<Tone>> {
        (0..self.variants())
            .map(|index| self.tone(frequency, index, volume, duration_ms))
            .collect()
    }

    /// Directional stimuli are scored on the reported direction, not detection
    pub fn is_directional(&self) -> bool {
        match self {
            StimulusKind::Single => false,
            StimulusKind::Interval { .. } | StimulusKind::MelodySet => true,
            StimulusKind::Melody { preset } => *preset != MelodyPreset::SingleFreqRhythm,
        }
    }
}

impl FromStr for StimulusKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "sine-single" => Ok(StimulusKind::Single),
            "sine-interval" => Ok(StimulusKind::Interval {
                ratio: DEFAULT_INTERVAL_RATIO,
            }),
            "sine-melody-set" => Ok(StimulusKind::MelodySet),
            other => match other.strip_prefix("sine-melody:") {
                Some(preset) => Ok(StimulusKind::Melody {
                    preset: preset.parse()?,
                }),
                None => Err(Error::Config(format!("Unrecognized test type '{}'", other))),
            },
        }
    }
}

impl fmt::Display for StimulusKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StimulusKind::Single => write!(f, "sine-single"),
            StimulusKind::Interval { .. } => write!(f, "sine-interval"),
            StimulusKind::Melody { preset } => write!(f, "sine-melody:{}", preset.id()),
            StimulusKind::MelodySet => write!(f, "sine-melody-set"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_tone_accessors() {
        let tone = Tone::single(500.0, 120.0).unwrap();
        assert_eq!(tone.frequency(), 500.0);
        assert_eq!(tone.volume(), 120.0);
        assert_eq!(tone.direction(), Direction::Flat);
        assert_eq!(tone.frequencies(), vec![500.0]);
    }

    #[test]
    fn test_invalid_volume_rejected() {
        assert!(matches!(Tone::single(500.0, -1.0), Err(Error::InvalidTone(_))));
        assert!(matches!(Tone::single(500.0, VOL_MAX + 1.0), Err(Error::InvalidTone(_))));
        assert!(matches!(Tone::single(500.0, f64::NAN), Err(Error::InvalidTone(_))));
        assert!(Tone::single(500.0, VOL_MAX).is_ok());
        assert!(Tone::single(500.0, 0.0).is_ok());
    }

    #[test]
    fn test_invalid_frequency_rejected() {
        assert!(Tone::single(0.0, 10.0).is_err());
        assert!(Tone::interval(440.0, -1.0, 10.0).is_err());
    }

    #[test]
    fn test_with_volume_returns_new_tone() {
        let tone = Tone::interval(440.0, 550.0, 10.0).unwrap();
        let louder = tone.with_volume(20.0).unwrap();
        assert_eq!(tone.volume(), 10.0);
        assert_eq!(louder.volume(), 20.0);
        assert_eq!(louder.kind(), tone.kind());
        assert!(tone.with_volume(VOL_MAX * 2.0).is_err());
    }

    #[test]
    fn test_interval_direction() {
        assert_eq!(Tone::interval(440.0, 550.0, 1.0).unwrap().direction(), Direction::Up);
        assert_eq!(Tone::interval(440.0, 352.0, 1.0).unwrap().direction(), Direction::Down);
        assert_eq!(Tone::interval(440.0, 440.0, 1.0).unwrap().direction(), Direction::Flat);
    }

    #[test]
    fn test_melody_presets() {
        let up = MelodyPreset::MajTriadUp.notes(400.0, 1500);
        assert_eq!(up.len(), 3);
        assert_eq!(up[0].duration_ms, 375);
        assert_eq!(up[2].duration_ms, 750);
        let tone = Tone::melody(up, 5.0).unwrap();
        assert_eq!(tone.direction(), Direction::Up);

        let down = Tone::melody(MelodyPreset::MajTriadDown.notes(400.0, 1500), 5.0).unwrap();
        assert_eq!(down.direction(), Direction::Down);
        assert_eq!(down.frequency(), 400.0);
    }

    #[test]
    fn test_rhythm_preset_has_rests() {
        let notes = MelodyPreset::SingleFreqRhythm.notes(300.0, 1600);
        assert_eq!(notes.len(), 8);
        assert_eq!(notes.iter().filter(|n| n.is_rest()).count(), 3);
        let tone = Tone::melody(notes, 1.0).unwrap();
        assert_eq!(tone.direction(), Direction::Flat);
        assert_eq!(tone.frequencies().len(), 5);
    }

    #[test]
    fn test_all_rest_melody_rejected() {
        assert!(Tone::melody(vec![Note::rest(100), Note::rest(100)], 1.0).is_err());
    }

    #[test]
    fn test_stimulus_kind_parsing() {
        assert_eq!("sine-single".parse::<StimulusKind>().unwrap(), StimulusKind::Single);
        assert!(matches!(
            "sine-interval".parse::<StimulusKind>().unwrap(),
            StimulusKind::Interval { .. }
        ));
        assert_eq!(
            "sine-melody:maj-triad-down".parse::<StimulusKind>().unwrap(),
            StimulusKind::Melody {
                preset: MelodyPreset::MajTriadDown
            }
        );
        assert!(matches!("piano".parse::<StimulusKind>(), Err(Error::Config(_))));
        assert!(matches!("sine-melody:waltz".parse::<StimulusKind>(), Err(Error::Config(_))));
    }

    #[test]
    fn test_interval_kind_builds_both_directions() {
        let kind = StimulusKind::Interval { ratio: 1.25 };
        let tones = kind.tones_for(400.0, 8.0, 1500).unwrap();
        assert_eq!(tones.len(), 2);
        assert_eq!(tones[0].direction(), Direction::Up);
        assert_eq!(tones[1].direction(), Direction::Down);
        assert!(kind.is_directional());
        assert!(!StimulusKind::Single.is_directional());
    }

    #[test]
    fn test_melody_set_builds_up_down_and_flat() {
        let kind: StimulusKind = "sine-melody-set".parse().unwrap();
        assert_eq!(kind, StimulusKind::MelodySet);
        assert_eq!(kind.to_string(), "sine-melody-set");
        assert!(kind.is_directional());

        let tones = kind.tones_for(400.0, 8.0, 1600).unwrap();
        let directions: Vec<Direction> = tones.iter().map(|t| t.direction()).collect();
        assert_eq!(directions, vec![Direction::Up, Direction::Down, Direction::Flat]);
        assert!(tones.iter().all(|t| t.frequency() == 400.0 && t.volume() == 8.0));
    }

    #[test]
    fn test_tone_deserialization_validates() {
        let json = r#"{"kind":{"type":"single","frequency":500.0},"volume":99999.0}"#;
        assert!(serde_json::from_str::<Tone>(json).is_err());

        let tone = Tone::single(500.0, 3.5).unwrap();
        let back: Tone = serde_json::from_str(&serde_json::to_string(&tone).unwrap()).unwrap();
        assert_eq!(back, tone);
    }
}
