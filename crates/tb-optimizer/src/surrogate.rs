//! RBF-kernel regression surrogate.
//!
//! A zero-mean Gaussian process with a fixed radial-basis kernel, fit on
//! encoded points and standardized scores. The dual weights come from a
//! Cholesky solve; when the kernel matrix is not positive-definite the fit
//! falls back to an LU solve and predictions use a fixed variance.

use nalgebra::{DMatrix, DVector};
use tb_types::SurrogateError;

pub const DEFAULT_LENGTH_SCALE: f64 = 0.25;
pub const DEFAULT_NOISE: f64 = 1e-6;

/// Variance reported for every candidate when Cholesky failed.
const DEGRADED_VARIANCE: f64 = 0.25;
const VARIANCE_FLOOR: f64 = 1e-12;

/// `k(a, b) = exp(-0.5 * ||a - b||^2 / length_scale^2)`
pub fn rbf_kernel(a: &[f64], b: &[f64], length_scale: f64) -> f64 {
    let d2: f64 = a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum();
    (-0.5 * d2 / (length_scale * length_scale)).exp()
}

/// Outcome of factorizing the training kernel matrix.
#[derive(Debug, Clone)]
pub enum Factorization {
    /// Lower-triangular factor `L` with `L Lᵀ = K + noise·I`.
    Cholesky(DMatrix<f64>),
    /// Weights came from a direct solve; no factor to reuse for variances.
    Direct,
}

#[derive(Debug, Clone)]
struct Fitted {
    x_train: Vec<Vec<f64>>,
    alpha: DVector<f64>,
    factorization: Factorization,
}

/// Posterior mean and standard deviation per candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub mean: Vec<f64>,
    pub std: Vec<f64>,
}

#[derive(Debug, Clone)]
pub struct RbfSurrogate {
    pub length_scale: f64,
    /// Jitter added to the kernel diagonal.
    pub noise: f64,
    fitted: Option<Fitted>,
}

impl Default for RbfSurrogate {
    fn default() -> Self {
        Self::new(DEFAULT_LENGTH_SCALE, DEFAULT_NOISE)
    }
}

impl RbfSurrogate {
    pub fn new(length_scale: f64, noise: f64) -> Self {
        Self {
            length_scale,
            noise,
            fitted: None,
        }
    }

    pub fn is_fitted(&self) -> bool {
        self.fitted.is_some()
    }

    /// The factorization used by the last successful fit.
    pub fn factorization(&self) -> Option<&Factorization> {
        self.fitted.as_ref().map(|f| &f.factorization)
    }

    /// Fit on `x` (n points of equal dimension) and targets `y`, which are
    /// expected to be standardized already.
    ///
    /// A failed fit leaves the previous state untouched.
    pub fn fit(&mut self, x: &[Vec<f64>], y: &[f64]) -> Result<(), SurrogateError> {
        if x.is_empty() {
            return Err(SurrogateError::EmptyTrainingSet);
        }
        if x.len() != y.len() {
            return Err(SurrogateError::LengthMismatch {
                points: x.len(),
                targets: y.len(),
            });
        }
        let dims = x[0].len();
        if let Some(bad) = x.iter().find(|p| p.len() != dims) {
            return Err(SurrogateError::DimensionMismatch {
                expected: dims,
                actual: bad.len(),
            });
        }

        let n = x.len();
        let k = DMatrix::from_fn(n, n, |i, j| {
            let v = rbf_kernel(&x[i], &x[j], self.length_scale);
            if i == j {
                v + self.noise
            } else {
                v
            }
        });
        let y = DVector::from_column_slice(y);

        let (alpha, factorization) = match k.clone().cholesky() {
            Some(chol) => {
                let alpha = chol.solve(&y);
                (alpha, Factorization::Cholesky(chol.l()))
            }
            None => {
                let alpha = k.lu().solve(&y).ok_or(SurrogateError::Singular)?;
                (alpha, Factorization::Direct)
            }
        };

        self.fitted = Some(Fitted {
            x_train: x.to_vec(),
            alpha,
            factorization,
        });
        Ok(())
    }

    /// Predict at `candidates`. Before any fit every candidate gets the
    /// uninformative prior (mean 0, std 1).
    pub fn predict(&self, candidates: &[Vec<f64>]) -> Prediction {
        let m = candidates.len();
        let fitted = match &self.fitted {
            Some(fitted) => fitted,
            None => {
                return Prediction {
                    mean: vec![0.0; m],
                    std: vec![1.0; m],
                }
            }
        };

        let n = fitted.x_train.len();
        let k_star = DMatrix::from_fn(n, m, |i, j| {
            rbf_kernel(&fitted.x_train[i], &candidates[j], self.length_scale)
        });
        let mean = k_star.tr_mul(&fitted.alpha);

        let variance: Vec<f64> = match &fitted.factorization {
            Factorization::Cholesky(l) => match l.solve_lower_triangular(&k_star) {
                Some(v) => (0..m).map(|j| 1.0 - v.column(j).norm_squared()).collect(),
                None => vec![DEGRADED_VARIANCE; m],
            },
            Factorization::Direct => vec![DEGRADED_VARIANCE; m],
        };

        Prediction {
            mean: mean.iter().copied().collect(),
            std: variance
                .into_iter()
                .map(|v| v.max(VARIANCE_FLOOR).sqrt())
                .collect(),
        }
    }
}

/// Standardize scores to zero mean and unit population variance. A
/// (near-)constant series keeps a divisor of 1 so it maps to all zeros.
pub fn standardize(y: &[f64]) -> Vec<f64> {
    if y.is_empty() {
        return Vec::new();
    }
    let n = y.len() as f64;
    let mean = y.iter().sum::<f64>() / n;
    let var = y.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
    let mut sd = var.sqrt();
    if sd < 1e-12 {
        sd = 1.0;
    }
    y.iter().map(|v| (v - mean) / sd).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kernel_is_one_on_the_diagonal_and_decays() {
        let a = [0.2, 0.4];
        assert_eq!(rbf_kernel(&a, &a, 0.25), 1.0);
        let near = rbf_kernel(&a, &[0.25, 0.4], 0.25);
        let far = rbf_kernel(&a, &[0.9, 0.9], 0.25);
        assert!(near > far);
        assert!(far > 0.0);
        // ||d||^2 = 0.0625 = l^2  =>  exp(-0.5)
        assert!((rbf_kernel(&[0.0], &[0.25], 0.25) - (-0.5f64).exp()).abs() < 1e-12);
    }

    #[test]
    fn prior_before_fit() {
        let surrogate = RbfSurrogate::default();
        assert!(!surrogate.is_fitted());
        let p = surrogate.predict(&[vec![0.1], vec![0.9]]);
        assert_eq!(p.mean, vec![0.0, 0.0]);
        assert_eq!(p.std, vec![1.0, 1.0]);
    }

    #[test]
    fn interpolates_training_points() {
        let x = vec![vec![0.0], vec![0.5], vec![1.0]];
        let y = vec![-1.0, 1.0, 0.0];
        let mut surrogate = RbfSurrogate::default();
        surrogate.fit(&x, &y).unwrap();
        assert!(matches!(
            surrogate.factorization(),
            Some(Factorization::Cholesky(_))
        ));

        let p = surrogate.predict(&x);
        for (mean, target) in p.mean.iter().zip(&y) {
            assert!((mean - target).abs() < 1e-3, "{mean} vs {target}");
        }
        // near-zero posterior variance at observed points
        for std in &p.std {
            assert!(*std < 1e-2);
        }
    }

    #[test]
    fn uncertainty_grows_away_from_data() {
        let x = vec![vec![0.1, 0.1], vec![0.2, 0.15]];
        let y = vec![0.5, -0.5];
        let mut surrogate = RbfSurrogate::default();
        surrogate.fit(&x, &y).unwrap();

        let p = surrogate.predict(&[vec![0.15, 0.12], vec![0.95, 0.95]]);
        assert!(p.std[0] < p.std[1]);
        // far from data the posterior reverts to the prior
        assert!((p.std[1] - 1.0).abs() < 1e-6);
        assert!(p.mean[1].abs() < 1e-3);
    }

    #[test]
    fn indefinite_matrix_falls_back_to_direct_solve() {
        // negative jitter: K is not positive-definite but still invertible
        let x = vec![vec![0.0], vec![1.0]];
        let y = vec![1.0, -1.0];
        let mut surrogate = RbfSurrogate::new(0.25, -1.5);
        surrogate.fit(&x, &y).unwrap();
        assert!(matches!(
            surrogate.factorization(),
            Some(Factorization::Direct)
        ));

        let p = surrogate.predict(&[vec![0.3]]);
        assert_eq!(p.std, vec![DEGRADED_VARIANCE.sqrt()]);
        assert!(p.mean[0].is_finite());
    }

    #[test]
    fn singular_matrix_is_reported() {
        // noise = -1 turns identical points into an all-zero matrix
        let x = vec![vec![0.5], vec![0.5]];
        let mut surrogate = RbfSurrogate::new(0.25, -1.0);
        assert_eq!(
            surrogate.fit(&x, &[1.0, 2.0]),
            Err(SurrogateError::Singular)
        );
        assert!(!surrogate.is_fitted());
    }

    #[test]
    fn fit_validates_shapes() {
        let mut surrogate = RbfSurrogate::default();
        assert_eq!(surrogate.fit(&[], &[]), Err(SurrogateError::EmptyTrainingSet));
        assert_eq!(
            surrogate.fit(&[vec![0.1]], &[1.0, 2.0]),
            Err(SurrogateError::LengthMismatch {
                points: 1,
                targets: 2
            })
        );
        assert_eq!(
            surrogate.fit(&[vec![0.1], vec![0.2, 0.3]], &[1.0, 2.0]),
            Err(SurrogateError::DimensionMismatch {
                expected: 1,
                actual: 2
            })
        );
    }

    #[test]
    fn standardize_zero_mean_unit_variance() {
        let z = standardize(&[1.0, 2.0, 3.0, 4.0]);
        let mean: f64 = z.iter().sum::<f64>() / 4.0;
        let var: f64 = z.iter().map(|v| v * v).sum::<f64>() / 4.0;
        assert!(mean.abs() < 1e-12);
        assert!((var - 1.0).abs() < 1e-12);
    }

    #[test]
    fn standardize_constant_series() {
        assert_eq!(standardize(&[2.5, 2.5, 2.5]), vec![0.0, 0.0, 0.0]);
        assert!(standardize(&[]).is_empty());
    }
}
