//! Trial records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::params::Candidate;

/// Monotonic trial identifier, assigned at launch.
pub type TrialId = u64;

/// Lifecycle of a trial inside the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrialState {
    Proposed,
    Launched,
    Running,
    Completed,
    Failed,
}

impl TrialState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Outcome of a finished trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrialStatus {
    Ok,
    Error,
}

/// Immutable record of one finished trial.
///
/// `score` is present iff `status == Ok`; `error` is present iff
/// `status == Error`. Use [`TrialResult::ok`] and [`TrialResult::failed`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialResult {
    pub trial_id: TrialId,
    pub params: Candidate,
    pub status: TrialStatus,
    pub score: Option<f64>,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    /// Evaluator-specific echo of what ran (e.g. the rendered command line).
    pub command: String,
    pub error: Option<String>,
}

impl TrialResult {
    pub fn ok(
        trial_id: TrialId,
        params: Candidate,
        score: f64,
        started_at: DateTime<Utc>,
        duration_ms: u64,
        command: String,
    ) -> Self {
        Self {
            trial_id,
            params,
            status: TrialStatus::Ok,
            score: Some(score),
            started_at,
            duration_ms,
            command,
            error: None,
        }
    }

    pub fn failed(
        trial_id: TrialId,
        params: Candidate,
        error: String,
        started_at: DateTime<Utc>,
        duration_ms: u64,
    ) -> Self {
        Self {
            trial_id,
            params,
            status: TrialStatus::Error,
            score: None,
            started_at,
            duration_ms,
            command: String::new(),
            error: Some(error),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == TrialStatus::Ok
    }

    /// Terminal scheduler state matching this result.
    pub fn final_state(&self) -> TrialState {
        match self.status {
            TrialStatus::Ok => TrialState::Completed,
            TrialStatus::Error => TrialState::Failed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::ParamValue;

    fn params() -> Candidate {
        Candidate::new().with("x", ParamValue::Float(0.25))
    }

    #[test]
    fn ok_result_carries_score_only() {
        let result = TrialResult::ok(3, params(), 1.5, Utc::now(), 12, "train --x 0.25".into());
        assert!(result.is_ok());
        assert_eq!(result.score, Some(1.5));
        assert!(result.error.is_none());
        assert_eq!(result.final_state(), TrialState::Completed);
    }

    #[test]
    fn failed_result_carries_error_only() {
        let result = TrialResult::failed(4, params(), "exit=1".into(), Utc::now(), 7);
        assert!(!result.is_ok());
        assert!(result.score.is_none());
        assert_eq!(result.error.as_deref(), Some("exit=1"));
        assert!(result.command.is_empty());
        assert_eq!(result.final_state(), TrialState::Failed);
        assert!(result.final_state().is_terminal());
    }

    #[test]
    fn status_serializes_lowercase() {
        let result = TrialResult::failed(0, params(), "boom".into(), Utc::now(), 0);
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["status"], "error");
        assert_eq!(value["score"], serde_json::Value::Null);
        assert_eq!(value["params"]["x"], 0.25);
    }

    #[test]
    fn running_is_not_terminal() {
        assert!(!TrialState::Proposed.is_terminal());
        assert!(!TrialState::Launched.is_terminal());
        assert!(!TrialState::Running.is_terminal());
    }
}
