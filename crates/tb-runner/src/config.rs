//! Study file loading.
//!
//! A study file is TOML with three sections: `[study]` (budget, seed and
//! output settings), `[runner]` (the command template) and one
//! `[space.<name>]` table per parameter. Out-of-range numeric settings are
//! clamped to their minimums; structural problems are errors.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tb_optimizer::ParameterSpace;
use tb_types::{config_error, ObjectiveDirection, ParamSpec, StudyConfig, TbResult};

pub const DEFAULT_STUDY_ID: &str = "study";
pub const DEFAULT_METRIC_KEY: &str = "score";
pub const DEFAULT_OUTPUT_PATH: &str = "runs/optimize/study.json";
pub const DEFAULT_TIMEOUT_SEC: u64 = 3600;

const MIN_CANDIDATE_POOL: i64 = 32;

/// Fully resolved study file.
#[derive(Debug, Clone)]
pub struct StudyFile {
    /// Where the file was loaded from, echoed into the artifact.
    pub path: PathBuf,
    pub study: StudySettings,
    pub runner: RunnerConfig,
    pub space: ParameterSpace,
}

/// `[study]` after defaults and clamping.
#[derive(Debug, Clone, PartialEq)]
pub struct StudySettings {
    pub id: String,
    pub metric_key: String,
    pub output_path: PathBuf,
    pub config: StudyConfig,
}

/// `[runner]` after defaults and clamping.
#[derive(Debug, Clone, PartialEq)]
pub struct RunnerConfig {
    pub command: String,
    pub timeout_sec: u64,
    pub workdir: PathBuf,
}

impl RunnerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_sec)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawFile {
    #[serde(default)]
    study: RawStudy,
    #[serde(default)]
    runner: RawRunner,
    #[serde(default)]
    space: BTreeMap<String, RawParam>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawStudy {
    id: Option<String>,
    n_trials: Option<i64>,
    init_random: Option<i64>,
    parallelism: Option<i64>,
    seed: Option<i64>,
    maximize: Option<bool>,
    metric_key: Option<String>,
    output_path: Option<PathBuf>,
    candidate_pool: Option<i64>,
    exploration: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawRunner {
    command: Option<String>,
    timeout_sec: Option<i64>,
    workdir: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawParam {
    #[serde(rename = "type", default)]
    kind: String,
    low: Option<f64>,
    high: Option<f64>,
    choices: Option<Vec<serde_json::Value>>,
}

impl StudyFile {
    pub fn load(path: impl AsRef<Path>) -> TbResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| config_error!("cannot read {}: {e}", path.display()))?;
        Self::parse(&text, path)
    }

    /// Parse TOML text; `path` is only recorded, never read.
    pub fn parse(text: &str, path: impl Into<PathBuf>) -> TbResult<Self> {
        let raw: RawFile =
            toml::from_str(text).map_err(|e| config_error!("invalid study file: {e}"))?;

        let study = resolve_study(raw.study);
        let runner = resolve_runner(raw.runner)?;

        if raw.space.is_empty() {
            return Err(config_error!("[space] must define at least one parameter"));
        }
        // BTreeMap iteration keeps parameters ordered by name.
        let specs = raw
            .space
            .into_iter()
            .map(|(name, p)| ParamSpec::from_parts(name, p.kind.trim(), p.low, p.high, p.choices))
            .collect::<Result<Vec<_>, _>>()?;
        let space = ParameterSpace::new(specs)?;

        Ok(Self {
            path: path.into(),
            study,
            runner,
            space,
        })
    }
}

fn resolve_study(raw: RawStudy) -> StudySettings {
    let defaults = StudyConfig::default();
    let id = raw
        .id
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| DEFAULT_STUDY_ID.to_string());

    let config = StudyConfig {
        n_trials: at_least(raw.n_trials, defaults.n_trials, 1),
        init_random: at_least(raw.init_random, defaults.init_random, 1),
        parallelism: at_least(raw.parallelism, defaults.parallelism, 1),
        // Negative seeds are accepted and reinterpreted bitwise.
        seed: raw.seed.map(|s| s as u64).unwrap_or(defaults.seed),
        direction: ObjectiveDirection::from_maximize(raw.maximize.unwrap_or(true)),
        candidate_pool: at_least(raw.candidate_pool, defaults.candidate_pool, MIN_CANDIDATE_POOL),
        exploration: raw.exploration.unwrap_or(defaults.exploration).max(0.0),
    };

    StudySettings {
        id,
        metric_key: raw
            .metric_key
            .unwrap_or_else(|| DEFAULT_METRIC_KEY.to_string()),
        output_path: raw
            .output_path
            .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_PATH)),
        config,
    }
}

fn resolve_runner(raw: RawRunner) -> TbResult<RunnerConfig> {
    let command = raw.command.unwrap_or_default().trim().to_string();
    if command.is_empty() {
        return Err(config_error!("runner.command is required"));
    }
    Ok(RunnerConfig {
        command,
        timeout_sec: raw
            .timeout_sec
            .map(|t| t.max(1) as u64)
            .unwrap_or(DEFAULT_TIMEOUT_SEC),
        workdir: raw.workdir.unwrap_or_else(|| PathBuf::from(".")),
    })
}

fn at_least(value: Option<i64>, default: usize, min: i64) -> usize {
    value.map(|v| v.max(min) as usize).unwrap_or(default)
}
