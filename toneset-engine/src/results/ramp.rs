//! Ramp and floor estimates

use serde::{Deserialize, Serialize};

/// Both ramp passes for one frequency
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RampEntry {
    pub frequency: f64,
    /// Coarse estimate from the fast ramp
    pub vol1: f64,
    /// Refined result from the slow ramp
    pub vol2: f64,
}

impl RampEntry {
    /// The slow-pass volume, which seeds the reduce and calibration phases
    pub fn ramp_result(&self) -> f64 {
        self.vol2
    }

    /// The quieter of the two passes
    pub fn ceiling_estimate(&self) -> f64 {
        self.vol1.min(self.vol2)
    }
}

/// Ramp results in test order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RampResults {
    entries: Vec<RampEntry>,
}

impl RampResults {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a frequency, replacing any earlier entry for it
    pub fn record(&mut self, frequency: f64, vol1: f64, vol2: f64) {
        let entry = RampEntry {
            frequency,
            vol1,
            vol2,
        };
        match self.entries.iter_mut().find(|e| e.frequency == frequency) {
            Some(existing) => *existing = entry,
            None => self.entries.push(entry),
        }
    }

    pub fn get(&self, frequency: f64) -> Option<&RampEntry> {
        self.entries.iter().find(|e| e.frequency == frequency)
    }

    pub fn entries(&self) -> &[RampEntry] {
        &self.entries
    }

    /// Entries sorted by frequency
    pub fn sorted(&self) -> Vec<RampEntry> {
        let mut sorted = self.entries.clone();
        sorted.sort_by(|a, b| a.frequency.total_cmp(&b.frequency));
        sorted
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Frozen floor volume for one frequency
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FloorEntry {
    pub frequency: f64,
    pub volume: f64,
}

/// Floor (reduce) results in the order frequencies were frozen
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FloorResults {
    entries: Vec<FloorEntry>,
}

impl FloorResults {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, frequency: f64, volume: f64) {
        let entry = FloorEntry { frequency, volume };
        match self.entries.iter_mut().find(|e| e.frequency == frequency) {
            Some(existing) => *existing = entry,
            None => self.entries.push(entry),
        }
    }

    pub fn get(&self, frequency: f64) -> Option<f64> {
        self.entries
            .iter()
            .find(|e| e.frequency == frequency)
            .map(|e| e.volume)
    }

    pub fn entries(&self) -> &[FloorEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
