//! Per-frequency hit/miss accumulation

use crate::interpolate::{piecewise_linear, FloatKey};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Heard/not-heard counts at one volume, with the outcomes in trial order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeTally {
    heard: u32,
    not_heard: u32,
    outcomes: Vec<bool>,
}

impl VolumeTally {
    fn record(&mut self, heard: bool) {
        if heard {
            self.heard += 1;
        } else {
            self.not_heard += 1;
        }
        self.outcomes.push(heard);
    }

    fn from_outcomes(outcomes: &[bool]) -> Self {
        let mut tally = Self::default();
        for &heard in outcomes {
            tally.record(heard);
        }
        tally
    }

    pub fn times_heard(&self) -> u32 {
        self.heard
    }

    pub fn times_not_heard(&self) -> u32 {
        self.not_heard
    }

    pub fn total(&self) -> u32 {
        self.heard + self.not_heard
    }

    /// Observed hit rate; a tally always holds at least one trial
    pub fn rate(&self) -> f64 {
        match self.total() {
            0 => 0.0,
            total => self.heard as f64 / total as f64,
        }
    }

    pub fn outcomes(&self) -> &[bool] {
        &self.outcomes
    }

    pub fn never_heard(&self) -> bool {
        self.heard == 0
    }

    pub fn always_heard(&self) -> bool {
        self.not_heard == 0
    }
}

/// Results for one tested frequency: `volume → (timesHeard, timesNotHeard)`
#[derive(Debug, Clone, PartialEq)]
pub struct SingleFrequencyResult {
    frequency: f64,
    volumes: BTreeMap<FloatKey, VolumeTally>,
}

impl SingleFrequencyResult {
    pub fn new(frequency: f64) -> Self {
        Self {
            frequency,
            volumes: BTreeMap::new(),
        }
    }

    /// Rebuild from ordered outcomes per volume; volumes with no outcomes are skipped
    pub fn from_outcomes<'a, I>(frequency: f64, volumes: I) -> Self
    where
        I: IntoIterator<Item = (f64, &'a [bool])>,
    {
        let volumes = volumes
            .into_iter()
            .filter(|(_, outcomes)| !outcomes.is_empty())
            .map(|(volume, outcomes)| (FloatKey(volume), VolumeTally::from_outcomes(outcomes)))
            .collect();
        Self { frequency, volumes }
    }

    pub fn frequency(&self) -> f64 {
        self.frequency
    }

    /// Add one trial outcome at `volume`
    pub fn record(&mut self, volume: f64, heard: bool) {
        self.volumes.entry(FloatKey(volume)).or_default().record(heard);
    }

    pub fn is_empty(&self) -> bool {
        self.volumes.is_empty()
    }

    /// Tested volumes, ascending
    pub fn tested_volumes(&self) -> Vec<f64> {
        self.volumes.keys().map(|k| k.0).collect()
    }

    pub fn tally(&self, volume: f64) -> Option<&VolumeTally> {
        self.volumes.get(&FloatKey(volume))
    }

    /// `(volume, tally)` pairs, ascending by volume
    pub fn iter(&self) -> impl Iterator<Item = (f64, &VolumeTally)> {
        self.volumes.iter().map(|(k, t)| (k.0, t))
    }

    pub fn times_heard(&self) -> u32 {
        self.volumes.values().map(VolumeTally::times_heard).sum()
    }

    pub fn times_not_heard(&self) -> u32 {
        self.volumes.values().map(VolumeTally::times_not_heard).sum()
    }

    pub fn total_trials(&self) -> u32 {
        self.volumes.values().map(VolumeTally::total).sum()
    }

    /// Observed hit rate at a tested volume
    pub fn rate_at(&self, volume: f64) -> Option<f64> {
        self.tally(volume).map(VolumeTally::rate)
    }

    /// Probability of hearing at any volume
    ///
    /// Linear between the two nearest tested volumes; the nearest boundary's
    /// observed rate outside the tested range. `None` only when nothing was tested.
    pub fn probability(&self, volume: f64) -> Option<f64> {
        let points: Vec<(f64, f64)> = self.iter().map(|(v, t)| (v, t.rate())).collect();
        piecewise_linear(&points, volume)
    }

    /// Loudest volume never heard, or the quietest tested volume if every volume
    /// was heard at least once
    pub fn floor(&self) -> Option<f64> {
        self.iter()
            .filter(|(_, t)| t.never_heard())
            .map(|(v, _)| v)
            .last()
            .or_else(|| self.volumes.keys().next().map(|k| k.0))
    }

    /// Quietest volume always heard, or the loudest tested volume if no volume
    /// was always heard
    pub fn ceiling(&self) -> Option<f64> {
        self.iter()
            .find(|(_, t)| t.always_heard())
            .map(|(v, _)| v)
            .or_else(|| self.volumes.keys().next_back().map(|k| k.0))
    }

    /// Copy keeping only the first `n` trials at each volume
    pub fn subset(&self, n: usize) -> Self {
        Self::from_outcomes(
            self.frequency,
            self.iter().map(|(v, t)| (v, &t.outcomes()[..n.min(t.outcomes().len())])),
        )
    }
}
