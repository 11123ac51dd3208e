//! # tb-runner
//!
//! Runs a Tunebay study described by a TOML file: every trial executes an
//! external command, and the finished study is written as a JSON artifact.

mod artifact;
mod command;
mod config;

pub use artifact::{BestTrial, RunStats, RunnerEcho, StudyArtifact, StudyEcho};
pub use command::{cli_value, extract_metric, format_general, split_args, CommandEvaluator};
pub use config::{
    RunnerConfig, StudyFile, StudySettings, DEFAULT_METRIC_KEY, DEFAULT_OUTPUT_PATH,
    DEFAULT_STUDY_ID, DEFAULT_TIMEOUT_SEC,
};

use anyhow::Context;
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::info;
use uuid::Uuid;

use tb_optimizer::Study;

/// Outcome of [`run_study_file`]: where the artifact went and what it holds.
#[derive(Debug, Clone)]
pub struct StudyRun {
    pub output_path: PathBuf,
    pub artifact: StudyArtifact,
}

impl StudyRun {
    pub fn summary(&self) -> serde_json::Value {
        self.artifact.summary(&self.output_path)
    }
}

/// Load `config_path`, run the study and write its artifact.
///
/// `output_override` replaces `study.output_path` from the file.
pub fn run_study_file(
    config_path: &Path,
    output_override: Option<&Path>,
) -> anyhow::Result<StudyRun> {
    let file = StudyFile::load(config_path)
        .with_context(|| format!("loading study file {}", config_path.display()))?;
    let output_path = output_override
        .map(Path::to_path_buf)
        .unwrap_or_else(|| file.study.output_path.clone());

    let run_id = Uuid::new_v4();
    info!(
        study_id = %file.study.id,
        %run_id,
        command = %file.runner.command,
        "Loaded study file"
    );

    let evaluator = CommandEvaluator::new(&file.runner, file.study.metric_key.clone())
        .context("building command evaluator")?;
    let study = Study::new(file.study.config.clone(), file.space.clone(), Arc::new(evaluator))?;

    let started_at = Utc::now();
    let t0 = Instant::now();
    let report = study
        .run()
        .with_context(|| format!("study {} failed", file.study.id))?;
    let duration_ms = t0.elapsed().as_millis() as u64;

    let artifact = StudyArtifact::new(&file, report, run_id, started_at, duration_ms);
    artifact
        .write(&output_path)
        .with_context(|| format!("writing artifact {}", output_path.display()))?;
    info!(output_path = %output_path.display(), duration_ms, "Wrote study artifact");

    Ok(StudyRun {
        output_path,
        artifact,
    })
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn write_study(dir: &Path, command: &str, n_trials: usize) -> PathBuf {
        let text = format!(
            r#"
[study]
id = "e2e"
n_trials = {n_trials}
init_random = 3
parallelism = 2
seed = 5
output_path = "{out}"

[runner]
command = '''{command} '''
timeout_sec = 10

[space.x]
type = "float"
low = 0.0
high = 1.0

[space.mode]
type = "categorical"
choices = ["a", "b"]
"#,
            out = dir.join("out").join("study.json").display(),
        );
        let path = dir.join("study.toml");
        std::fs::write(&path, text).unwrap();
        path
    }

    #[test]
    fn runs_study_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let config = write_study(dir.path(), r#"echo '{"score": {x}, "mode": "{mode}"}'"#, 6);

        let run = run_study_file(&config, None).unwrap();
        assert_eq!(run.output_path, dir.path().join("out").join("study.json"));
        assert!(run.output_path.exists());

        let artifact = StudyArtifact::read(&run.output_path).unwrap();
        assert_eq!(artifact.study.id, "e2e");
        assert_eq!(artifact.trials.len(), 6);
        assert_eq!(artifact.stats.successful_trials, 6);
        let max = artifact
            .trials
            .iter()
            .filter_map(|t| t.score)
            .fold(f64::NEG_INFINITY, f64::max);
        assert_eq!(artifact.best.score, max);
        assert!(artifact.trials.iter().all(|t| t.command.starts_with("echo {\"score\": ")));

        let summary = run.summary();
        assert_eq!(summary["status"], "ok");
        assert_eq!(summary["study_id"], "e2e");
    }

    #[test]
    fn output_override_wins() {
        let dir = tempfile::tempdir().unwrap();
        let config = write_study(dir.path(), r#"echo '{"score": 1}'"#, 2);
        let target = dir.path().join("elsewhere.json");

        let run = run_study_file(&config, Some(&target)).unwrap();
        assert_eq!(run.output_path, target);
        assert!(target.exists());
        assert!(!dir.path().join("out").join("study.json").exists());
    }

    #[test]
    fn all_failed_trials_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = write_study(dir.path(), "sh -c 'exit 2'", 3);

        let err = run_study_file(&config, None).unwrap_err();
        assert!(format!("{err:#}").contains("All 3 trials failed"));
        assert!(!dir.path().join("out").join("study.json").exists());
    }

    #[test]
    fn missing_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = run_study_file(&dir.path().join("nope.toml"), None).unwrap_err();
        assert!(format!("{err:#}").contains("loading study file"));
    }
}
