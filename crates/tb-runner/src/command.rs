//! Shell-command objective.
//!
//! Each trial renders the command template with the candidate's values,
//! runs it as a child process with a timeout and reads the metric from the
//! JSON it prints on stdout.

use regex::{Captures, Regex};
use std::path::PathBuf;
use std::process::{Output, Stdio};
use std::time::{Duration, Instant};
use tokio::process::Command;
use tokio::runtime::Runtime;
use tracing::debug;

use tb_optimizer::{Evaluation, Objective};
use tb_types::{internal_error, Candidate, EvaluationError, ParamValue, TbResult};

use crate::config::RunnerConfig;

const PLACEHOLDER_PATTERN: &str = r"\{([A-Za-z_][A-Za-z0-9_]*)\}";

/// Runs the study's command for each candidate.
pub struct CommandEvaluator {
    template: String,
    metric_key: String,
    timeout: Duration,
    workdir: PathBuf,
    placeholder: Regex,
    runtime: Runtime,
}

impl CommandEvaluator {
    pub fn new(runner: &RunnerConfig, metric_key: impl Into<String>) -> TbResult<Self> {
        Self::with_timeout(runner, metric_key, runner.timeout())
    }

    pub fn with_timeout(
        runner: &RunnerConfig,
        metric_key: impl Into<String>,
        timeout: Duration,
    ) -> TbResult<Self> {
        let placeholder = Regex::new(PLACEHOLDER_PATTERN)
            .map_err(|e| internal_error!("invalid placeholder pattern: {e}"))?;
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("tb-runner-io")
            .enable_all()
            .build()?;

        Ok(Self {
            template: runner.command.clone(),
            metric_key: metric_key.into(),
            timeout,
            workdir: runner.workdir.clone(),
            placeholder,
            runtime,
        })
    }

    /// Substitute `{name}` placeholders; unknown names are left verbatim.
    pub fn render(&self, candidate: &Candidate) -> String {
        self.placeholder
            .replace_all(&self.template, |caps: &Captures| match candidate.get(&caps[1]) {
                Some(value) => cli_value(value),
                None => caps[0].to_string(),
            })
            .into_owned()
    }

    /// Render and split into argv.
    pub fn argv(&self, candidate: &Candidate) -> Result<Vec<String>, EvaluationError> {
        split_args(&self.render(candidate))
    }

    async fn spawn(&self, argv: &[String]) -> Result<Output, EvaluationError> {
        let (program, args) = argv.split_first().ok_or(EvaluationError::EmptyCommand)?;
        let child = Command::new(program)
            .args(args)
            .current_dir(&self.workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| EvaluationError::Spawn {
                message: format!("{program}: {e}"),
            })?;

        // Dropping the wait future on timeout drops the child, which kills it.
        match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(output) => output.map_err(|e| EvaluationError::Spawn {
                message: format!("{program}: {e}"),
            }),
            Err(_) => Err(EvaluationError::Timeout {
                timeout_secs: self.timeout.as_secs_f64(),
            }),
        }
    }
}

impl Objective for CommandEvaluator {
    fn evaluate(&self, candidate: &Candidate) -> Result<Evaluation, EvaluationError> {
        let argv = self.argv(candidate)?;
        if argv.is_empty() {
            return Err(EvaluationError::EmptyCommand);
        }
        let command = argv.join(" ");
        debug!(%command, "Running trial command");

        let started = Instant::now();
        let output = self.runtime.block_on(self.spawn(&argv))?;
        let elapsed_secs = started.elapsed().as_secs_f64();

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(EvaluationError::NonZeroExit {
                code: exit_code(&output.status),
                elapsed_secs,
                tail: last_line(&stderr, &stdout),
            });
        }

        let score = extract_metric(&stdout, &self.metric_key)?;
        debug!(%command, score, elapsed_secs, "Trial command finished");
        Ok(Evaluation::new(score, command))
    }
}

fn exit_code(status: &std::process::ExitStatus) -> String {
    if let Some(code) = status.code() {
        return code.to_string();
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return format!("-{signal}");
        }
    }
    "unknown".to_string()
}

/// Last line of stderr, or of stdout when stderr is blank.
fn last_line(stderr: &str, stdout: &str) -> String {
    let text = if stderr.trim().is_empty() { stdout } else { stderr };
    text.trim().lines().last().unwrap_or("").to_string()
}

/// Command-line text for one parameter value. Floats use 12 significant
/// digits; strings are inserted without quotes.
pub fn cli_value(value: &ParamValue) -> String {
    match value {
        ParamValue::Int(v) => v.to_string(),
        ParamValue::Float(v) => format_general(*v, 12),
        ParamValue::Choice(serde_json::Value::String(s)) => s.clone(),
        ParamValue::Choice(serde_json::Value::Number(n)) if n.is_f64() => {
            n.as_f64().map(|v| format_general(v, 12)).unwrap_or_else(|| n.to_string())
        }
        ParamValue::Choice(v) => v.to_string(),
    }
}

/// `%g`-style formatting: shortest of fixed or scientific notation with
/// `precision` significant digits and trailing zeros removed.
pub fn format_general(x: f64, precision: usize) -> String {
    if x.is_nan() {
        return "nan".to_string();
    }
    if x.is_infinite() {
        return if x > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    if x == 0.0 {
        return if x.is_sign_negative() { "-0" } else { "0" }.to_string();
    }

    let precision = precision.max(1);
    let sci = format!("{:.*e}", precision - 1, x);
    let (mantissa, exp) = match sci.split_once('e') {
        Some((m, e)) => (m, e.parse::<i32>().unwrap_or(0)),
        None => (sci.as_str(), 0),
    };

    if exp < -4 || exp >= precision as i32 {
        let sign = if exp < 0 { '-' } else { '+' };
        format!("{}e{}{:02}", trim_fraction(mantissa), sign, exp.abs())
    } else {
        let decimals = (precision as i32 - 1 - exp).max(0) as usize;
        trim_fraction(&format!("{:.*}", decimals, x)).to_string()
    }
}

fn trim_fraction(s: &str) -> &str {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.')
    } else {
        s
    }
}

/// Split a command line into arguments using POSIX shell quoting rules:
/// whitespace separates words, single quotes are literal, double quotes
/// allow `\"`, `\\`, `\$` and `` \` `` escapes, and a bare backslash
/// escapes the next character.
pub fn split_args(line: &str) -> Result<Vec<String>, EvaluationError> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        match c {
            c if c.is_whitespace() => {
                if in_word {
                    args.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            '\'' => {
                in_word = true;
                loop {
                    match chars.next() {
                        Some('\'') => break,
                        Some(c) => current.push(c),
                        None => return Err(EvaluationError::failed("no closing quotation")),
                    }
                }
            }
            '"' => {
                in_word = true;
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some(c @ ('"' | '\\' | '$' | '`')) => current.push(c),
                            Some('\n') => {}
                            Some(c) => {
                                current.push('\\');
                                current.push(c);
                            }
                            None => return Err(EvaluationError::failed("no closing quotation")),
                        },
                        Some(c) => current.push(c),
                        None => return Err(EvaluationError::failed("no closing quotation")),
                    }
                }
            }
            '\\' => {
                in_word = true;
                match chars.next() {
                    Some(c) => current.push(c),
                    None => return Err(EvaluationError::failed("no escaped character")),
                }
            }
            c => {
                in_word = true;
                current.push(c);
            }
        }
    }
    if in_word {
        args.push(current);
    }
    Ok(args)
}

/// Find `metric_key` in the JSON printed on stdout.
///
/// Non-empty lines are scanned from the last one; the first `{...}` line
/// that parses as an object containing the key wins. Failing that, the
/// whole of stdout is tried as a single object.
pub fn extract_metric(stdout: &str, metric_key: &str) -> Result<f64, EvaluationError> {
    let lines = stdout.lines().map(str::trim).filter(|l| !l.is_empty());
    for line in lines.rev() {
        if !(line.starts_with('{') && line.ends_with('}')) {
            continue;
        }
        let Ok(serde_json::Value::Object(obj)) = serde_json::from_str::<serde_json::Value>(line)
        else {
            continue;
        };
        if let Some(value) = obj.get(metric_key) {
            return metric_value(metric_key, value);
        }
    }

    let text = stdout.trim();
    if text.starts_with('{') && text.ends_with('}') {
        if let Ok(serde_json::Value::Object(obj)) = serde_json::from_str(text) {
            if let Some(value) = obj.get(metric_key) {
                return metric_value(metric_key, value);
            }
        }
    }

    Err(EvaluationError::MissingMetric {
        key: metric_key.to_string(),
    })
}

fn metric_value(key: &str, value: &serde_json::Value) -> Result<f64, EvaluationError> {
    let invalid = || EvaluationError::InvalidMetric {
        key: key.to_string(),
        value: value.to_string(),
    };
    match value {
        serde_json::Value::Number(n) => n.as_f64().ok_or_else(invalid),
        serde_json::Value::String(s) => s.trim().parse::<f64>().map_err(|_| invalid()),
        serde_json::Value::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
        _ => Err(invalid()),
    }
}
