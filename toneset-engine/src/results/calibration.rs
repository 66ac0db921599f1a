//! Calibration results across frequencies

use super::frequency::SingleFrequencyResult;
use crate::interpolate::FloatKey;
use crate::trial::Trial;
use std::collections::BTreeMap;

/// `frequency → SingleFrequencyResult` over explicitly tested frequencies
///
/// Every frequency present holds at least one trial.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CalibrationResults {
    frequencies: BTreeMap<FloatKey, SingleFrequencyResult>,
}

impl CalibrationResults {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from per-frequency results, skipping empty ones
    pub fn from_frequency_results<I>(results: I) -> Self
    where
        I: IntoIterator<Item = SingleFrequencyResult>,
    {
        let frequencies = results
            .into_iter()
            .filter(|r| !r.is_empty())
            .map(|r| (FloatKey(r.frequency()), r))
            .collect();
        Self { frequencies }
    }

    pub fn record(&mut self, frequency: f64, volume: f64, heard: bool) {
        self.frequencies
            .entry(FloatKey(frequency))
            .or_insert_with(|| SingleFrequencyResult::new(frequency))
            .record(volume, heard);
    }

    /// Record a finalized trial under its tone's primary frequency
    pub fn record_trial(&mut self, trial: &Trial) {
        let tone = trial.tone();
        self.record(tone.frequency(), tone.volume(), trial.correct().unwrap_or(false));
    }

    pub fn get(&self, frequency: f64) -> Option<&SingleFrequencyResult> {
        self.frequencies.get(&FloatKey(frequency))
    }

    /// Tested frequencies, ascending
    pub fn tested_frequencies(&self) -> Vec<f64> {
        self.frequencies.keys().map(|k| k.0).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SingleFrequencyResult> {
        self.frequencies.values()
    }

    /// Nearest tested frequencies strictly below and strictly above `frequency`
    pub fn neighbours(
        &self,
        frequency: f64,
    ) -> (Option<&SingleFrequencyResult>, Option<&SingleFrequencyResult>) {
        let key = FloatKey(frequency);
        let below = self.frequencies.range(..key).next_back().map(|(_, r)| r);
        let above = self
            .frequencies
            .range(key..)
            .find(|(k, _)| **k != key)
            .map(|(_, r)| r);
        (below, above)
    }

    pub fn is_empty(&self) -> bool {
        self.frequencies.is_empty()
    }

    pub fn len(&self) -> usize {
        self.frequencies.len()
    }

    pub fn total_trials(&self) -> u32 {
        self.frequencies.values().map(SingleFrequencyResult::total_trials).sum()
    }

    /// Copy keeping only the first `n` trials per volume
    pub fn subset(&self, n: usize) -> Self {
        Self::from_frequency_results(self.frequencies.values().map(|r| r.subset(n)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tone::Tone;
    use crate::trial::{AnswerCode, ResponseEvent, ResponseMode};
    use std::time::Duration;

    #[test]
    fn test_record_creates_frequency_on_demand() {
        let mut results = CalibrationResults::new();
        assert!(results.is_empty());
        results.record(1000.0, 4.0, true);
        results.record(500.0, 4.0, false);
        assert_eq!(results.tested_frequencies(), vec![500.0, 1000.0]);
        assert_eq!(results.total_trials(), 2);
    }

    #[test]
    fn test_record_trial_uses_correctness() {
        let mut results = CalibrationResults::new();
        let heard = Trial::start(Tone::single(250.0, 2.0).unwrap()).finalize(
            vec![ResponseEvent {
                offset: Duration::from_millis(200),
                answer: AnswerCode::Heard,
            }],
            ResponseMode::Detection,
        );
        let missed = Trial::start(Tone::single(250.0, 2.0).unwrap())
            .finalize(Vec::new(), ResponseMode::Detection);
        results.record_trial(&heard);
        results.record_trial(&missed);

        let tally = results.get(250.0).unwrap().tally(2.0).unwrap();
        assert_eq!(tally.times_heard(), 1);
        assert_eq!(tally.times_not_heard(), 1);
    }

    #[test]
    fn test_neighbours() {
        let mut results = CalibrationResults::new();
        for freq in [200.0, 500.0, 1000.0] {
            results.record(freq, 1.0, true);
        }
        let (below, above) = results.neighbours(700.0);
        assert_eq!(below.map(|r| r.frequency()), Some(500.0));
        assert_eq!(above.map(|r| r.frequency()), Some(1000.0));

        let (below, above) = results.neighbours(100.0);
        assert!(below.is_none());
        assert_eq!(above.map(|r| r.frequency()), Some(200.0));

        let (below, above) = results.neighbours(500.0);
        assert_eq!(below.map(|r| r.frequency()), Some(200.0));
        assert_eq!(above.map(|r| r.frequency()), Some(1000.0));
    }

    #[test]
    fn test_subset_drops_nothing_when_large_enough() {
        let mut results = CalibrationResults::new();
        results.record(200.0, 1.0, true);
        results.record(200.0, 1.0, false);
        assert_eq!(results.subset(5), results);
        assert_eq!(results.subset(1).total_trials(), 1);
        assert!(results.subset(0).is_empty());
    }
}
