//! Expected Improvement acquisition and candidate selection.

use rand::Rng;
use tb_types::{Candidate, SpaceError};

use crate::space::ParameterSpace;
use crate::surrogate::RbfSurrogate;

/// Standard deviations at or below this are treated as noiseless.
pub const SIGMA_FLOOR: f64 = 1e-12;

/// Standard normal CDF
pub fn normal_cdf(x: f64) -> f64 {
    0.5 * (1.0 + erf(x / std::f64::consts::SQRT_2))
}

/// Standard normal PDF
pub fn normal_pdf(x: f64) -> f64 {
    (-0.5 * x * x).exp() / (2.0 * std::f64::consts::PI).sqrt()
}

/// Error function approximation (Abramowitz and Stegun 7.1.26)
fn erf(x: f64) -> f64 {
    let a1 = 0.254829592;
    let a2 = -0.284496736;
    let a3 = 1.421413741;
    let a4 = -1.453152027;
    let a5 = 1.061405429;
    let p = 0.3275911;

    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();

    let t = 1.0 / (1.0 + p * x);
    let y = 1.0 - (((((a5 * t + a4) * t) + a3) * t + a2) * t + a1) * t * (-x * x).exp();

    sign * y
}

/// Expected improvement of each candidate over `best`, where a candidate
/// must beat `best` by `exploration` to count as an improvement.
///
/// `EI = imp·Φ(z) + σ·φ(z)` with `imp = μ - best - exploration` and
/// `z = imp / σ`; at the noiseless floor `EI = max(0, imp)`.
pub fn expected_improvement(mean: &[f64], std: &[f64], best: f64, exploration: f64) -> Vec<f64> {
    mean.iter()
        .zip(std)
        .map(|(&mu, &sigma)| {
            let sigma = sigma.max(SIGMA_FLOOR);
            let improvement = mu - best - exploration;
            if sigma <= SIGMA_FLOOR {
                return improvement.max(0.0);
            }
            let z = improvement / sigma;
            improvement * normal_cdf(z) + sigma * normal_pdf(z)
        })
        .collect()
}

/// Index of the first maximum. NaN scores never win.
pub fn argmax(scores: &[f64]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (idx, &score) in scores.iter().enumerate() {
        if score.is_nan() {
            continue;
        }
        match best {
            Some((_, current)) if score <= current => {}
            _ => best = Some((idx, score)),
        }
    }
    best.map(|(idx, _)| idx)
}

/// Draws a pool of random candidates and keeps the one with the highest
/// expected improvement under a fitted surrogate.
#[derive(Debug, Clone)]
pub struct ExpectedImprovement {
    pub candidate_pool: usize,
    pub exploration: f64,
}

impl ExpectedImprovement {
    pub fn new(candidate_pool: usize, exploration: f64) -> Self {
        Self {
            candidate_pool,
            exploration,
        }
    }

    /// `best` is the incumbent on the surrogate's (standardized) scale.
    pub fn select<R: Rng>(
        &self,
        space: &ParameterSpace,
        surrogate: &RbfSurrogate,
        best: f64,
        rng: &mut R,
    ) -> Result<Candidate, SpaceError> {
        let pool_size = self.candidate_pool.max(1);
        let mut pool: Vec<Candidate> = (0..pool_size).map(|_| space.sample(rng)).collect();
        let encoded = pool
            .iter()
            .map(|c| space.encode(c))
            .collect::<Result<Vec<_>, _>>()?;

        let prediction = surrogate.predict(&encoded);
        let scores =
            expected_improvement(&prediction.mean, &prediction.std, best, self.exploration);
        let idx = argmax(&scores).unwrap_or(0);
        Ok(pool.swap_remove(idx))
    }
}
