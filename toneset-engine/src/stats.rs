//! Binomial hypothesis testing of model predictions
//!
//! **Purpose:** Decide whether an observed success count is consistent with the
//! probability a model predicted for the same stimulus.
//!
//! **Test:** Under `H0: p = p̂`, with `n` trials and `k` successes:
//! - `low  = min{x : CDF(x) > α/2}`
//! - `high = max{x : 1 − CDF(x) > α/2}`, never below `low`
//! - reject `H0` when `k ∉ [low, high]`
//! - p-value `min(CDF(k), 1 − CDF(k))`
//! - `β` = mass of Binomial(n, k/n) inside `[low, high]`, `power = 1 − β`
//!
//! Both searches are bounded to `0..=n`.

use crate::error::{Error, Result};
use crate::results::ConfidenceCase;
use crate::tone::Tone;
use serde::{Deserialize, Serialize};
use statrs::distribution::{Binomial, DiscreteCDF};

/// Default significance level for confidence analysis
pub const DEFAULT_ALPHA: f64 = 0.10;

/// Acceptance region `[low, high]` of a two-sided binomial test
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CriticalRegion {
    pub low: u64,
    pub high: u64,
}

impl CriticalRegion {
    /// Whether `k` is inside the acceptance region
    pub fn accepts(&self, k: u64) -> bool {
        (self.low..=self.high).contains(&k)
    }
}

fn binomial(p: f64, n: u64) -> Result<Binomial> {
    Binomial::new(p, n).map_err(|e| Error::InvalidInput(format!("binomial(n={}, p={}): {}", n, p, e)))
}

fn check_alpha(alpha: f64) -> Result<()> {
    if alpha.is_finite() && alpha > 0.0 && alpha < 1.0 {
        Ok(())
    } else {
        Err(Error::InvalidInput(format!("alpha must be in (0, 1), got {}", alpha)))
    }
}

/// Acceptance region for `n` trials at success probability `p`
pub fn critical_region(n: u64, p: f64, alpha: f64) -> Result<CriticalRegion> {
    check_alpha(alpha)?;
    if !(0.0..=1.0).contains(&p) {
        return Err(Error::InvalidInput(format!("probability must be in [0, 1], got {}", p)));
    }
    let dist = binomial(p, n)?;
    let tail = alpha / 2.0;

    let low = (0..=n).find(|&x| dist.cdf(x) > tail).ok_or_else(|| {
        Error::NonConvergent(format!("no lower bound for n={}, p={}, alpha={}", n, p, alpha))
    })?;

    // 1 − CDF(x) is non-increasing, so scan down from n for the last x above the tail
    let high = (low..=n)
        .rev()
        .find(|&x| 1.0 - dist.cdf(x) > tail)
        .unwrap_or(low);

    Ok(CriticalRegion { low, high })
}

/// Outcome of one two-sided binomial test
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BinomialTest {
    pub successes: u64,
    pub trials: u64,
    /// Hypothesised success probability
    pub expected: f64,
    /// Observed success fraction `k / n`
    pub empirical: f64,
    pub alpha: f64,
    pub region: CriticalRegion,
    pub p_value: f64,
    /// `k` outside the acceptance region
    pub significant: bool,
    /// Probability of accepting `H0` if the empirical rate were the truth
    pub beta: f64,
    pub power: f64,
}

/// Two-sided test of `k` successes in `n` trials against `expected`
pub fn binomial_test(k: u64, n: u64, expected: f64, alpha: f64) -> Result<BinomialTest> {
    if n == 0 {
        return Err(Error::InsufficientData("binomial test over zero trials".to_string()));
    }
    if k > n {
        return Err(Error::InvalidInput(format!("{} successes exceed {} trials", k, n)));
    }

    let region = critical_region(n, expected, alpha)?;
    let null = binomial(expected, n)?;
    let cdf_k = null.cdf(k);
    let p_value = cdf_k.min(1.0 - cdf_k);

    let empirical = k as f64 / n as f64;
    let observed = binomial(empirical, n)?;
    let below_low = if region.low == 0 {
        0.0
    } else {
        observed.cdf(region.low - 1)
    };
    let beta = (observed.cdf(region.high) - below_low).clamp(0.0, 1.0);

    Ok(BinomialTest {
        successes: k,
        trials: n,
        expected,
        empirical,
        alpha,
        region,
        p_value,
        significant: !region.accepts(k),
        beta,
        power: 1.0 - beta,
    })
}

/// Analysis of one (tested tone, model estimate) pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsAnalysisResult {
    pub tone: Tone,
    /// Model's predicted probability
    pub estimate: f64,
    pub correct: u32,
    pub incorrect: u32,
    pub test: BinomialTest,
}

impl StatsAnalysisResult {
    /// Test a recorded case against a model estimate
    pub fn analyze(case: &ConfidenceCase, estimate: f64, alpha: f64) -> Result<Self> {
        if case.total() == 0 {
            return Err(Error::InsufficientData(format!("no trials recorded for {}", case.tone)));
        }
        let test = binomial_test(case.correct as u64, case.total() as u64, estimate, alpha)?;
        Ok(Self {
            tone: case.tone.clone(),
            estimate,
            correct: case.correct,
            incorrect: case.incorrect,
            test,
        })
    }

    pub fn empirical(&self) -> f64 {
        self.test.empirical
    }

    /// Estimates significantly different from the observed rate
    pub fn is_significant(&self) -> bool {
        self.test.significant
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_case_n20_p05_k15() {
        let test = binomial_test(15, 20, 0.5, 0.10).unwrap();
        assert_eq!(test.region, CriticalRegion { low: 6, high: 13 });
        assert!(test.significant);
        // P(X <= 15) = 0.99409, so the upper tail is the smaller one
        assert!((test.p_value - 0.005909).abs() < 1e-4);
        assert_eq!(test.empirical, 0.75);
    }

    #[test]
    fn test_deterministic() {
        let a = binomial_test(15, 20, 0.5, 0.10).unwrap();
        let b = binomial_test(15, 20, 0.5, 0.10).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_inside_region_not_significant() {
        let test = binomial_test(11, 20, 0.5, 0.10).unwrap();
        assert!(!test.significant);
        assert!(test.region.accepts(11));
    }

    #[test]
    fn test_extreme_probabilities_terminate() {
        let zero = critical_region(20, 0.0, 0.10).unwrap();
        assert_eq!(zero, CriticalRegion { low: 0, high: 0 });

        let one = critical_region(20, 1.0, 0.10).unwrap();
        assert_eq!(one.low, 20);
        assert_eq!(one.high, 20);

        assert!(binomial_test(0, 20, 0.0, 0.10).map(|t| !t.significant).unwrap());
        assert!(binomial_test(3, 20, 0.0, 0.10).unwrap().significant);
    }

    #[test]
    fn test_zero_trials_is_insufficient_data() {
        assert!(matches!(binomial_test(0, 0, 0.5, 0.1), Err(Error::InsufficientData(_))));
    }

    #[test]
    fn test_invalid_inputs() {
        assert!(matches!(binomial_test(5, 4, 0.5, 0.1), Err(Error::InvalidInput(_))));
        assert!(matches!(critical_region(10, 1.5, 0.1), Err(Error::InvalidInput(_))));
        assert!(matches!(critical_region(10, 0.5, 0.0), Err(Error::InvalidInput(_))));
        assert!(matches!(critical_region(10, f64::NAN, 0.1), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_beta_and_power_are_complementary() {
        let test = binomial_test(15, 20, 0.5, 0.10).unwrap();
        assert!((test.beta + test.power - 1.0).abs() < 1e-12);
        // Binomial(20, 0.75) mass inside [6, 13] is roughly 0.21
        assert!(test.beta > 0.1 && test.beta < 0.35, "beta = {}", test.beta);
    }

    #[test]
    fn test_analyze_case() {
        let case = ConfidenceCase {
            tone: Tone::single(440.0, 5.0).unwrap(),
            correct: 15,
            incorrect: 5,
        };
        let analysis = StatsAnalysisResult::analyze(&case, 0.5, DEFAULT_ALPHA).unwrap();
        assert!(analysis.is_significant());
        assert_eq!(analysis.empirical(), 0.75);

        let empty = ConfidenceCase {
            correct: 0,
            incorrect: 0,
            ..case
        };
        assert!(matches!(
            StatsAnalysisResult::analyze(&empty, 0.5, DEFAULT_ALPHA),
            Err(Error::InsufficientData(_))
        ));
    }
}
