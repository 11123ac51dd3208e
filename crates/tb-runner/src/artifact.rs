//! Study artifact: the JSON record of a finished run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use uuid::Uuid;

use tb_types::{Candidate, ObjectiveDirection, StudyReport, TbResult, TrialId, TrialResult};

use crate::config::StudyFile;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudyArtifact {
    pub study: StudyEcho,
    pub runner: RunnerEcho,
    pub best: BestTrial,
    pub stats: RunStats,
    pub trials: Vec<TrialResult>,
}

/// The resolved `[study]` settings plus run identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudyEcho {
    pub id: String,
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub n_trials: usize,
    pub init_random: usize,
    pub parallelism: usize,
    pub seed: u64,
    pub maximize: bool,
    pub metric_key: String,
    pub candidate_pool: usize,
    pub exploration: f64,
    pub config_path: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunnerEcho {
    pub command: String,
    pub timeout_sec: u64,
    pub workdir: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BestTrial {
    pub trial_id: TrialId,
    pub params: Candidate,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunStats {
    pub successful_trials: usize,
    pub failed_trials: usize,
    pub duration_ms: u64,
}

impl StudyArtifact {
    pub fn new(
        file: &StudyFile,
        report: StudyReport,
        run_id: Uuid,
        started_at: DateTime<Utc>,
        duration_ms: u64,
    ) -> Self {
        let config = &file.study.config;
        Self {
            study: StudyEcho {
                id: file.study.id.clone(),
                run_id,
                started_at,
                n_trials: config.n_trials,
                init_random: config.init_random,
                parallelism: config.parallelism,
                seed: config.seed,
                maximize: config.direction == ObjectiveDirection::Maximize,
                metric_key: file.study.metric_key.clone(),
                candidate_pool: config.candidate_pool,
                exploration: config.exploration,
                config_path: file.path.display().to_string(),
            },
            runner: RunnerEcho {
                command: file.runner.command.clone(),
                timeout_sec: file.runner.timeout_sec,
                workdir: file.runner.workdir.display().to_string(),
            },
            best: BestTrial {
                trial_id: report.best_trial_id,
                params: report.best_params,
                score: report.best_score,
            },
            stats: RunStats {
                successful_trials: report.successful_trials,
                failed_trials: report.failed_trials,
                duration_ms,
            },
            trials: report.trials,
        }
    }

    /// Write pretty JSON to `path`, creating parent directories.
    pub fn write(&self, path: &Path) -> TbResult<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let mut json = serde_json::to_string_pretty(self)?;
        json.push('\n');
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn read(path: &Path) -> TbResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// One-line summary printed by the CLI.
    pub fn summary(&self, output_path: &Path) -> serde_json::Value {
        serde_json::json!({
            "status": "ok",
            "study_id": self.study.id,
            "run_id": self.study.run_id,
            "output_path": output_path.display().to_string(),
            "best_trial_id": self.best.trial_id,
            "best_score": self.best.score,
            "best_params": self.best.params,
            "successful_trials": self.stats.successful_trials,
            "failed_trials": self.stats.failed_trials,
            "duration_ms": self.stats.duration_ms,
        })
    }
}
