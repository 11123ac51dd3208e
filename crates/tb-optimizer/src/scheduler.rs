//! Trial scheduler: proposal, deduplication, dispatch and completion.
//!
//! One orchestrating thread (the caller of [`Study::run`]) owns every piece
//! of mutable state: the RNG, the seen/pending key sets, the history and
//! the counters. Evaluations run on a `rayon` pool of `parallelism`
//! threads; a worker gets an owned [`Candidate`] and reports back over a
//! channel, never touching scheduler state.
//!
//! Results are committed strictly in trial-id order. A trial that finishes
//! early is buffered until every lower id has been committed, and each
//! commit frees exactly one launch slot. The proposal for trial `k`
//! therefore always sees the same history, whatever order the workers
//! finish in.

use chrono::Utc;
use crossbeam_channel::{Receiver, Sender};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::{BTreeMap, HashSet};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use tb_types::{
    internal_error, Candidate, EvaluationError, StudyConfig, StudyError, StudyReport,
    SurrogateError, TbResult, TrialId, TrialResult, TrialState,
};

use crate::acquisition::ExpectedImprovement;
use crate::objective::Objective;
use crate::report::ResultAggregator;
use crate::space::ParameterSpace;
use crate::surrogate::{standardize, RbfSurrogate};

/// Fresh random samples tried when a proposal collides with a seen or
/// pending candidate, before the duplicate is accepted.
pub const MAX_DEDUP_RETRIES: usize = 32;

/// A configured optimization run.
pub struct Study {
    config: StudyConfig,
    space: ParameterSpace,
    objective: Arc<dyn Objective>,
}

impl Study {
    pub fn new(
        config: StudyConfig,
        space: ParameterSpace,
        objective: Arc<dyn Objective>,
    ) -> TbResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            space,
            objective,
        })
    }

    pub fn config(&self) -> &StudyConfig {
        &self.config
    }

    pub fn space(&self) -> &ParameterSpace {
        &self.space
    }

    /// Run the full trial budget and aggregate the results.
    ///
    /// Individual trial failures are recorded in the report; the only
    /// study-level failure is every trial failing.
    ///
    /// Results are committed in trial-id order, so one slow trial holds
    /// back the commits behind it. New proposals wait on that commit, and
    /// workers can sit idle until the slow trial finishes.
    pub fn run(&self) -> TbResult<StudyReport> {
        info!(
            n_trials = self.config.n_trials,
            parallelism = self.config.parallelism,
            init_random = self.config.init_random,
            seed = self.config.seed,
            dims = self.space.dims(),
            "Starting study"
        );

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.parallelism)
            .thread_name(|i| format!("tb-worker-{i}"))
            .build()
            .map_err(|e| internal_error!("failed to build worker pool: {e}"))?;

        let report = TrialScheduler::new(self).run(&pool)?;

        info!(
            best_trial_id = report.best_trial_id,
            best_score = report.best_score,
            successful = report.successful_trials,
            failed = report.failed_trials,
            "Study finished"
        );
        Ok(report)
    }
}

/// Message from a worker back to the orchestrator.
#[derive(Debug)]
enum TrialEvent {
    Started { trial_id: TrialId },
    Finished(TrialResult),
}

#[derive(Debug)]
struct InFlight {
    key: String,
    state: TrialState,
}

/// Produces candidates: random during warm-up, surrogate-guided afterwards.
pub(crate) struct Proposer<'a> {
    space: &'a ParameterSpace,
    config: &'a StudyConfig,
    rng: ChaCha8Rng,
    surrogate: RbfSurrogate,
    acquisition: ExpectedImprovement,
}

impl<'a> Proposer<'a> {
    pub(crate) fn new(space: &'a ParameterSpace, config: &'a StudyConfig) -> Self {
        Self {
            space,
            config,
            rng: ChaCha8Rng::seed_from_u64(config.seed),
            surrogate: RbfSurrogate::default(),
            acquisition: ExpectedImprovement::new(config.candidate_pool, config.exploration),
        }
    }

    #[cfg(test)]
    pub(crate) fn with_surrogate(mut self, surrogate: RbfSurrogate) -> Self {
        self.surrogate = surrogate;
        self
    }

    pub(crate) fn random(&mut self) -> Candidate {
        self.space.sample(&mut self.rng)
    }

    /// `history` holds successful trials only, in commit order.
    pub(crate) fn propose(&mut self, history: &[TrialResult]) -> TbResult<Candidate> {
        if history.len() < self.config.warmup_trials() {
            return Ok(self.random());
        }

        let direction = self.config.direction;
        let y: Vec<f64> = history
            .iter()
            .map(|t| direction.orient(t.score.unwrap_or(f64::NAN)))
            .collect();
        if y.iter().any(|v| !v.is_finite()) {
            debug!("Non-finite score in history, proposing at random");
            return Ok(self.random());
        }

        let x = history
            .iter()
            .map(|t| self.space.encode(&t.params))
            .collect::<Result<Vec<_>, _>>()?;
        let y_norm = standardize(&y);

        match self.surrogate.fit(&x, &y_norm) {
            Ok(()) => {}
            Err(SurrogateError::Singular) => {
                warn!("Kernel matrix is singular, proposing at random");
                return Ok(self.random());
            }
            Err(e) => return Err(e.into()),
        }

        let best = y_norm.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let candidate = self
            .acquisition
            .select(self.space, &self.surrogate, best, &mut self.rng)?;
        Ok(candidate)
    }
}

struct TrialScheduler<'a> {
    study: &'a Study,
    proposer: Proposer<'a>,
    /// Successful trials in commit order.
    history: Vec<TrialResult>,
    results: ResultAggregator,
    seen: HashSet<String>,
    pending: HashSet<String>,
    in_flight: BTreeMap<TrialId, InFlight>,
    /// Finished trials waiting for all lower ids to commit.
    finished: BTreeMap<TrialId, TrialResult>,
    launched: usize,
    completed: usize,
}

impl<'a> TrialScheduler<'a> {
    fn new(study: &'a Study) -> Self {
        let n_trials = study.config.n_trials;
        Self {
            study,
            proposer: Proposer::new(&study.space, &study.config),
            history: Vec::new(),
            results: ResultAggregator::with_capacity(study.config.direction, n_trials),
            seen: HashSet::with_capacity(n_trials),
            pending: HashSet::new(),
            in_flight: BTreeMap::new(),
            finished: BTreeMap::new(),
            launched: 0,
            completed: 0,
        }
    }

    fn run(mut self, pool: &rayon::ThreadPool) -> TbResult<StudyReport> {
        let (tx, rx) = crossbeam_channel::unbounded();
        let n_trials = self.study.config.n_trials;
        let parallelism = self.study.config.parallelism;

        while self.completed < n_trials {
            while self.launched < n_trials && self.in_flight.len() < parallelism {
                self.launch(pool, &tx)?;
            }

            let next = match self.in_flight.keys().next() {
                Some(id) => *id,
                None => return Err(internal_error!("no trial in flight while waiting")),
            };
            let result = self.wait_for(next, &rx)?;
            self.commit(result);
        }

        Ok(self.results.finish()?)
    }

    fn launch(&mut self, pool: &rayon::ThreadPool, tx: &Sender<TrialEvent>) -> TbResult<()> {
        let mut candidate = self.proposer.propose(&self.history)?;
        let mut key = candidate.canonical_key()?;

        let mut retries = 0;
        while self.is_duplicate(&key) && retries < MAX_DEDUP_RETRIES {
            candidate = self.proposer.random();
            key = candidate.canonical_key()?;
            retries += 1;
        }
        if self.is_duplicate(&key) {
            warn!(
                retries,
                candidate = %candidate,
                "Dedup retries exhausted, launching duplicate candidate"
            );
        }

        let trial_id = self.launched as TrialId;
        self.launched += 1;
        self.pending.insert(key.clone());
        self.in_flight.insert(
            trial_id,
            InFlight {
                key,
                state: TrialState::Proposed,
            },
        );
        debug!(trial_id, candidate = %candidate, "Launching trial");

        let objective = Arc::clone(&self.study.objective);
        let tx = tx.clone();
        pool.spawn(move || run_trial(trial_id, candidate, objective.as_ref(), &tx));
        if let Some(flight) = self.in_flight.get_mut(&trial_id) {
            flight.state = TrialState::Launched;
        }
        Ok(())
    }

    fn is_duplicate(&self, key: &str) -> bool {
        self.seen.contains(key) || self.pending.contains(key)
    }

    /// Block until `next` has finished, buffering other completions.
    fn wait_for(&mut self, next: TrialId, rx: &Receiver<TrialEvent>) -> TbResult<TrialResult> {
        loop {
            if let Some(result) = self.finished.remove(&next) {
                return Ok(result);
            }
            match rx.recv() {
                Ok(TrialEvent::Started { trial_id }) => {
                    if let Some(flight) = self.in_flight.get_mut(&trial_id) {
                        flight.state = TrialState::Running;
                    }
                    debug!(trial_id, "Trial running");
                }
                Ok(TrialEvent::Finished(result)) => {
                    if let Some(flight) = self.in_flight.get_mut(&result.trial_id) {
                        flight.state = result.final_state();
                    }
                    self.finished.insert(result.trial_id, result);
                }
                Err(_) => {
                    return Err(StudyError::WorkerDisconnected {
                        in_flight: self.in_flight.len(),
                    }
                    .into())
                }
            }
        }
    }

    fn commit(&mut self, result: TrialResult) {
        if let Some(flight) = self.in_flight.remove(&result.trial_id) {
            debug_assert!(flight.state.is_terminal());
            self.pending.remove(&flight.key);
            self.seen.insert(flight.key);
        }

        match (&result.score, &result.error) {
            (Some(score), _) => {
                info!(
                    trial_id = result.trial_id,
                    score,
                    duration_ms = result.duration_ms,
                    "Trial completed"
                );
                self.history.push(result.clone());
            }
            (None, error) => {
                warn!(
                    trial_id = result.trial_id,
                    error = error.as_deref().unwrap_or("unknown"),
                    "Trial failed"
                );
            }
        }

        self.results.record(result);
        self.completed += 1;
    }
}

/// Worker body: evaluate one candidate and report the result.
fn run_trial(
    trial_id: TrialId,
    candidate: Candidate,
    objective: &dyn Objective,
    tx: &Sender<TrialEvent>,
) {
    let _ = tx.send(TrialEvent::Started { trial_id });

    let started_at = Utc::now();
    let t0 = Instant::now();
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| objective.evaluate(&candidate)))
        .unwrap_or_else(|payload| {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(EvaluationError::Panicked { message })
        });
    let duration_ms = t0.elapsed().as_millis() as u64;

    let result = match outcome {
        Ok(evaluation) => TrialResult::ok(
            trial_id,
            candidate,
            evaluation.score,
            started_at,
            duration_ms,
            evaluation.descriptor,
        ),
        Err(e) => TrialResult::failed(trial_id, candidate, e.to_string(), started_at, duration_ms),
    };

    // The orchestrator holds its own sender, so the channel outlives every worker.
    let _ = tx.send(TrialEvent::Finished(result));
}
