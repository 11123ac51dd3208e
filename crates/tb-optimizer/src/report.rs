//! Result aggregation.

use tb_types::{ObjectiveDirection, StudyError, StudyReport, TrialResult};

/// Collects finished trials and builds the final [`StudyReport`].
#[derive(Debug, Clone)]
pub struct ResultAggregator {
    direction: ObjectiveDirection,
    trials: Vec<TrialResult>,
}

impl ResultAggregator {
    pub fn new(direction: ObjectiveDirection) -> Self {
        Self {
            direction,
            trials: Vec::new(),
        }
    }

    pub fn with_capacity(direction: ObjectiveDirection, capacity: usize) -> Self {
        Self {
            direction,
            trials: Vec::with_capacity(capacity),
        }
    }

    pub fn record(&mut self, result: TrialResult) {
        self.trials.push(result);
    }

    pub fn len(&self) -> usize {
        self.trials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trials.is_empty()
    }

    pub fn successful(&self) -> usize {
        self.trials.iter().filter(|t| t.is_ok()).count()
    }

    /// Best successful trial so far; the earliest trial id wins ties.
    pub fn best(&self) -> Option<&TrialResult> {
        let mut ordered: Vec<&TrialResult> = self.trials.iter().collect();
        ordered.sort_by_key(|t| t.trial_id);
        select_best(ordered, self.direction)
    }

    /// Sort by trial id and pick the best. Fails when no trial succeeded.
    pub fn finish(mut self) -> Result<StudyReport, StudyError> {
        self.trials.sort_by_key(|t| t.trial_id);

        let best = select_best(self.trials.iter(), self.direction).ok_or(
            StudyError::AllTrialsFailed {
                n_trials: self.trials.len(),
            },
        )?;
        let (best_trial_id, best_params, best_score) = (
            best.trial_id,
            best.params.clone(),
            best.score.unwrap_or(f64::NAN),
        );

        let successful_trials = self.trials.iter().filter(|t| t.is_ok()).count();
        Ok(StudyReport {
            best_trial_id,
            best_params,
            best_score,
            successful_trials,
            failed_trials: self.trials.len() - successful_trials,
            trials: self.trials,
        })
    }
}

fn select_best<'a, I>(trials: I, direction: ObjectiveDirection) -> Option<&'a TrialResult>
where
    I: IntoIterator<Item = &'a TrialResult>,
{
    let mut best: Option<(&TrialResult, f64)> = None;
    for trial in trials {
        let Some(score) = trial.score.filter(|_| trial.is_ok()) else {
            continue;
        };
        let dominated = match best {
            None => true,
            Some((_, current)) => direction.is_better(score, current),
        };
        if dominated {
            best = Some((trial, score));
        }
    }
    best.map(|(trial, _)| trial)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tb_types::{Candidate, ParamValue};

    fn ok(id: u64, score: f64) -> TrialResult {
        let params = Candidate::new().with("x", ParamValue::Int(id as i64));
        TrialResult::ok(id, params, score, Utc::now(), 1, format!("trial {id}"))
    }

    fn failed(id: u64) -> TrialResult {
        TrialResult::failed(id, Candidate::new(), "exit=1".into(), Utc::now(), 1)
    }

    #[test]
    fn best_trial_tracking_maximize() {
        let mut agg = ResultAggregator::new(ObjectiveDirection::Maximize);
        agg.record(ok(0, 1.5));
        assert_eq!(agg.best().unwrap().trial_id, 0);
        agg.record(ok(1, 2.0));
        assert_eq!(agg.best().unwrap().trial_id, 1);
        // worse result should not replace
        agg.record(ok(2, 1.0));
        assert_eq!(agg.best().unwrap().score, Some(2.0));
    }

    #[test]
    fn best_trial_tracking_minimize() {
        let mut agg = ResultAggregator::new(ObjectiveDirection::Minimize);
        agg.record(ok(0, 0.15));
        agg.record(ok(1, 0.05));
        agg.record(failed(2));
        let report = agg.finish().unwrap();
        assert_eq!(report.best_trial_id, 1);
        assert_eq!(report.best_score, 0.05);
    }

    #[test]
    fn ties_go_to_lowest_trial_id() {
        let mut agg = ResultAggregator::new(ObjectiveDirection::Maximize);
        // arrival order differs from id order
        agg.record(ok(3, 4.0));
        agg.record(ok(1, 4.0));
        agg.record(ok(2, 1.0));
        let report = agg.finish().unwrap();
        assert_eq!(report.best_trial_id, 1);
    }

    #[test]
    fn report_is_sorted_and_counted() {
        let mut agg = ResultAggregator::with_capacity(ObjectiveDirection::Maximize, 4);
        agg.record(ok(2, 0.3));
        agg.record(failed(0));
        agg.record(ok(3, 0.9));
        agg.record(failed(1));
        assert_eq!(agg.len(), 4);
        assert_eq!(agg.successful(), 2);

        let report = agg.finish().unwrap();
        let ids: Vec<u64> = report.trials.iter().map(|t| t.trial_id).collect();
        assert_eq!(ids, vec![0, 1, 2, 3]);
        assert_eq!(report.successful_trials, 2);
        assert_eq!(report.failed_trials, 2);
        assert_eq!(report.total_trials(), 4);
        assert_eq!(report.best_trial().unwrap().score, Some(0.9));
        assert_eq!(report.best_params.get("x"), Some(&ParamValue::Int(3)));
    }

    #[test]
    fn all_failed_is_an_error() {
        let mut agg = ResultAggregator::new(ObjectiveDirection::Maximize);
        agg.record(failed(0));
        agg.record(failed(1));
        assert_eq!(
            agg.finish(),
            Err(StudyError::AllTrialsFailed { n_trials: 2 })
        );
    }
}
