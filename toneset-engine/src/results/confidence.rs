//! Confidence (validation) results
//!
//! Records correctness against an expected answer, per (frequency, direction),
//! separately from the raw audibility counts of calibration.

use crate::interpolate::FloatKey;
use crate::tone::{Direction, Tone};
use crate::trial::Trial;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Correct/incorrect counts for one tested tone
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceCase {
    pub tone: Tone,
    pub correct: u32,
    pub incorrect: u32,
}

impl ConfidenceCase {
    pub fn total(&self) -> u32 {
        self.correct + self.incorrect
    }

    /// Observed success fraction, `None` without trials
    pub fn empirical_rate(&self) -> Option<f64> {
        match self.total() {
            0 => None,
            total => Some(self.correct as f64 / total as f64),
        }
    }
}

/// Tested tones grouped by (primary frequency, direction)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfidenceResults {
    groups: BTreeMap<(FloatKey, Direction), Vec<ConfidenceCase>>,
}

impl ConfidenceResults {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from a flat case list
    pub fn from_cases<I: IntoIterator<Item = ConfidenceCase>>(cases: I) -> Self {
        let mut results = Self::new();
        for case in cases {
            results
                .groups
                .entry((FloatKey(case.tone.frequency()), case.tone.direction()))
                .or_default()
                .push(case);
        }
        results
    }

    pub fn record(&mut self, tone: &Tone, correct: bool) {
        let group = self
            .groups
            .entry((FloatKey(tone.frequency()), tone.direction()))
            .or_default();
        let case = match group.iter().position(|c| c.tone == *tone) {
            Some(index) => &mut group[index],
            None => {
                group.push(ConfidenceCase {
                    tone: tone.clone(),
                    correct: 0,
                    incorrect: 0,
                });
                let last = group.len() - 1;
                &mut group[last]
            }
        };
        if correct {
            case.correct += 1;
        } else {
            case.incorrect += 1;
        }
    }

    pub fn record_trial(&mut self, trial: &Trial) {
        self.record(trial.tone(), trial.correct().unwrap_or(false));
    }

    /// Counts for an exact tone
    pub fn case(&self, tone: &Tone) -> Option<&ConfidenceCase> {
        self.groups
            .get(&(FloatKey(tone.frequency()), tone.direction()))
            .and_then(|group| group.iter().find(|c| c.tone == *tone))
    }

    /// Every case recorded for a (frequency, direction) pair
    pub fn group(&self, frequency: f64, direction: Direction) -> &[ConfidenceCase] {
        self.groups
            .get(&(FloatKey(frequency), direction))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn cases(&self) -> impl Iterator<Item = &ConfidenceCase> {
        self.groups.values().flatten()
    }

    pub fn total_trials(&self) -> u32 {
        self.cases().map(ConfidenceCase::total).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}
