//! # tb-optimizer
//!
//! Black-box parameter search for Tunebay.
//!
//! Provides the encoded parameter space, an RBF Gaussian-process surrogate,
//! Expected Improvement candidate selection, and a seeded scheduler that
//! runs trials concurrently on a worker pool and aggregates their results.

mod acquisition;
mod objective;
mod report;
mod scheduler;
mod space;
mod surrogate;

pub use acquisition::{argmax, expected_improvement, normal_cdf, normal_pdf, ExpectedImprovement};
pub use objective::{Evaluation, Objective};
pub use report::ResultAggregator;
pub use scheduler::{Study, MAX_DEDUP_RETRIES};
pub use space::{ParamCodec, ParameterSpace, SpaceBuilder};
pub use surrogate::{
    rbf_kernel, standardize, Factorization, Prediction, RbfSurrogate, DEFAULT_LENGTH_SCALE,
    DEFAULT_NOISE,
};
