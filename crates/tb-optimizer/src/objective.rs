//! Objective evaluator boundary.

use tb_types::{Candidate, EvaluationError};

/// Successful evaluation of one candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub score: f64,
    /// Evaluator-specific echo, e.g. the command line that ran.
    pub descriptor: String,
}

impl Evaluation {
    pub fn new(score: f64, descriptor: impl Into<String>) -> Self {
        Self {
            score,
            descriptor: descriptor.into(),
        }
    }
}

/// Runs one trial. Called concurrently from several workers, each with its
/// own candidate; failures are recorded on the trial and never retried.
pub trait Objective: Send + Sync {
    fn evaluate(&self, candidate: &Candidate) -> Result<Evaluation, EvaluationError>;
}

impl<F> Objective for F
where
    F: Fn(&Candidate) -> Result<Evaluation, EvaluationError> + Send + Sync,
{
    fn evaluate(&self, candidate: &Candidate) -> Result<Evaluation, EvaluationError> {
        self(candidate)
    }
}
