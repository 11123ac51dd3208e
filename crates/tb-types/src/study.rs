//! Study configuration and outcome.

use serde::{Deserialize, Serialize};

use crate::errors::StudyError;
use crate::params::Candidate;
use crate::trial::{TrialId, TrialResult};

/// Whether we are maximizing or minimizing the objective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectiveDirection {
    #[default]
    Maximize,
    Minimize,
}

impl ObjectiveDirection {
    pub fn from_maximize(maximize: bool) -> Self {
        if maximize {
            Self::Maximize
        } else {
            Self::Minimize
        }
    }

    /// Strict improvement test: equal scores never displace the incumbent.
    pub fn is_better(self, candidate: f64, incumbent: f64) -> bool {
        match self {
            Self::Maximize => candidate > incumbent,
            Self::Minimize => candidate < incumbent,
        }
    }

    /// Map a raw score onto the "higher is better" scale the surrogate uses.
    pub fn orient(self, score: f64) -> f64 {
        match self {
            Self::Maximize => score,
            Self::Minimize => -score,
        }
    }
}

/// Study parameters handed to the scheduler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudyConfig {
    /// Total number of trials to launch.
    pub n_trials: usize,
    /// Successful trials required before proposals switch from random
    /// sampling to surrogate-guided search (never fewer than 2).
    pub init_random: usize,
    /// Maximum number of concurrently running evaluations.
    pub parallelism: usize,
    pub seed: u64,
    pub direction: ObjectiveDirection,
    /// Random candidates scored by the acquisition function per proposal.
    pub candidate_pool: usize,
    /// Margin subtracted from the improvement before scoring.
    pub exploration: f64,
}

impl Default for StudyConfig {
    fn default() -> Self {
        Self {
            n_trials: 40,
            init_random: 8,
            parallelism: 4,
            seed: 42,
            direction: ObjectiveDirection::Maximize,
            candidate_pool: 512,
            exploration: 0.01,
        }
    }
}

impl StudyConfig {
    pub fn new(n_trials: usize) -> Self {
        Self {
            n_trials,
            ..Self::default()
        }
    }

    pub fn with_init_random(mut self, n: usize) -> Self {
        self.init_random = n;
        self
    }

    pub fn with_parallelism(mut self, n: usize) -> Self {
        self.parallelism = n;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_direction(mut self, direction: ObjectiveDirection) -> Self {
        self.direction = direction;
        self
    }

    pub fn with_candidate_pool(mut self, n: usize) -> Self {
        self.candidate_pool = n;
        self
    }

    pub fn with_exploration(mut self, exploration: f64) -> Self {
        self.exploration = exploration;
        self
    }

    /// Number of successful trials needed before the surrogate is consulted.
    pub fn warmup_trials(&self) -> usize {
        self.init_random.max(2)
    }

    pub fn validate(&self) -> Result<(), StudyError> {
        let invalid = |message: &str| StudyError::InvalidConfig {
            message: message.to_string(),
        };
        if self.n_trials == 0 {
            return Err(invalid("n_trials must be at least 1"));
        }
        if self.parallelism == 0 {
            return Err(invalid("parallelism must be at least 1"));
        }
        if self.candidate_pool == 0 {
            return Err(invalid("candidate_pool must be at least 1"));
        }
        if !self.exploration.is_finite() || self.exploration < 0.0 {
            return Err(invalid("exploration must be a finite value >= 0"));
        }
        Ok(())
    }
}

/// Final outcome of a study.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudyReport {
    pub best_trial_id: TrialId,
    pub best_params: Candidate,
    pub best_score: f64,
    pub successful_trials: usize,
    pub failed_trials: usize,
    /// Every trial, sorted by `trial_id`.
    pub trials: Vec<TrialResult>,
}

impl StudyReport {
    pub fn total_trials(&self) -> usize {
        self.successful_trials + self.failed_trials
    }

    pub fn best_trial(&self) -> Option<&TrialResult> {
        self.trials.iter().find(|t| t.trial_id == self.best_trial_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direction_comparisons_are_strict() {
        assert!(ObjectiveDirection::Maximize.is_better(2.0, 1.0));
        assert!(!ObjectiveDirection::Maximize.is_better(1.0, 1.0));
        assert!(ObjectiveDirection::Minimize.is_better(0.5, 1.0));
        assert!(!ObjectiveDirection::Minimize.is_better(1.0, 1.0));
    }

    #[test]
    fn orient_flips_minimized_scores() {
        assert_eq!(ObjectiveDirection::Maximize.orient(3.0), 3.0);
        assert_eq!(ObjectiveDirection::Minimize.orient(3.0), -3.0);
        assert_eq!(ObjectiveDirection::from_maximize(false), ObjectiveDirection::Minimize);
    }

    #[test]
    fn builder_chain() {
        let config = StudyConfig::new(24)
            .with_init_random(6)
            .with_parallelism(4)
            .with_seed(7)
            .with_direction(ObjectiveDirection::Minimize)
            .with_candidate_pool(64)
            .with_exploration(0.0);
        assert_eq!(config.n_trials, 24);
        assert_eq!(config.init_random, 6);
        assert_eq!(config.parallelism, 4);
        assert_eq!(config.seed, 7);
        assert_eq!(config.direction, ObjectiveDirection::Minimize);
        assert_eq!(config.candidate_pool, 64);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn warmup_never_below_two() {
        assert_eq!(StudyConfig::new(10).with_init_random(1).warmup_trials(), 2);
        assert_eq!(StudyConfig::new(10).with_init_random(5).warmup_trials(), 5);
    }

    #[test]
    fn validate_rejects_degenerate_values() {
        assert!(StudyConfig::new(0).validate().is_err());
        assert!(StudyConfig::new(5).with_parallelism(0).validate().is_err());
        assert!(StudyConfig::new(5).with_candidate_pool(0).validate().is_err());
        assert!(StudyConfig::new(5).with_exploration(-0.1).validate().is_err());
        assert!(StudyConfig::new(5).with_exploration(f64::NAN).validate().is_err());
    }
}
