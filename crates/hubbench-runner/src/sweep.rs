use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use chrono::Utc;
use hubbench_core::{ParameterGrid, TrialConfig, TrialResult, CSV_HEADER};
use serde_json::{json, Value};
use tracing::info;

use crate::error::{SweepError, TrialError};
use crate::trial::{run_trial, TrialOptions};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorKind {
    /// One fresh worker process per trial, the default.
    Subprocess,
    /// Same process, still one fresh scheduler per trial.
    InProcess,
}

#[derive(Debug, Clone)]
pub struct SweepOptions {
    pub executor: ExecutorKind,
    pub trial: TrialOptions,
    /// Worker binary for subprocess trials; defaults to the current
    /// executable.
    pub worker: Option<PathBuf>,
}

impl Default for SweepOptions {
    fn default() -> Self {
        Self {
            executor: ExecutorKind::Subprocess,
            trial: TrialOptions::default(),
            worker: None,
        }
    }
}

/// Executes the grid in program order, one trial at a time, streaming
/// one CSV row per completed trial. The first failure aborts the sweep;
/// rows already written stay valid and no row is emitted for the failed
/// configuration.
pub fn run_sweep<W: Write>(
    grid: &ParameterGrid,
    options: &SweepOptions,
    out: &mut W,
) -> Result<(), SweepError> {
    let sweep_id = format!("sweep_{}", Utc::now().format("%Y%m%d_%H%M%S"));
    let scratch = tempfile::Builder::new().prefix(&sweep_id).tempdir()?;
    info!(
        sweep = %sweep_id,
        trials = grid.len(),
        executor = ?options.executor,
        "starting sweep"
    );

    writeln!(out, "{CSV_HEADER}")?;
    out.flush()?;
    for (index, config) in grid.iter().enumerate() {
        let result = match options.executor {
            ExecutorKind::InProcess => run_trial(config, &options.trial)?,
            ExecutorKind::Subprocess => {
                run_trial_in_worker(config, options, scratch.path(), index)?
            }
        };
        writeln!(out, "{}", result.csv_row(config))?;
        out.flush()?;
        info!(
            population = config.population,
            active = config.active,
            running = result.running,
            "trial complete"
        );
    }
    Ok(())
}

pub fn write_worker_input(
    path: &Path,
    config: &TrialConfig,
    options: &TrialOptions,
) -> Result<(), SweepError> {
    let input = json!({ "config": config, "options": options });
    fs::write(path, serde_json::to_vec_pretty(&input)?)?;
    Ok(())
}

pub fn read_worker_input(path: &Path) -> Result<(TrialConfig, TrialOptions), SweepError> {
    let input: Value = serde_json::from_slice(&fs::read(path)?)?;
    let config = serde_json::from_value(input.get("config").cloned().unwrap_or(Value::Null))?;
    let options = serde_json::from_value(input.get("options").cloned().unwrap_or(Value::Null))?;
    Ok((config, options))
}

pub fn write_worker_output(
    path: &Path,
    outcome: &Result<TrialResult, TrialError>,
) -> Result<(), SweepError> {
    let envelope = match outcome {
        Ok(result) => json!({ "ok": true, "result": result }),
        Err(err) => json!({ "ok": false, "kind": err.kind(), "error": err.to_string() }),
    };
    fs::write(path, serde_json::to_vec_pretty(&envelope)?)?;
    Ok(())
}

pub fn parse_worker_output(raw: &[u8]) -> Result<TrialResult, TrialError> {
    let envelope: Value = serde_json::from_slice(raw).map_err(|err| TrialError::Worker {
        kind: "worker".to_string(),
        message: format!("unreadable trial output: {err}"),
    })?;
    if envelope.pointer("/ok").and_then(Value::as_bool) == Some(true) {
        let result = envelope
            .pointer("/result")
            .cloned()
            .ok_or_else(|| TrialError::Worker {
                kind: "worker".to_string(),
                message: "missing result in trial output".to_string(),
            })?;
        serde_json::from_value(result).map_err(|err| TrialError::Worker {
            kind: "worker".to_string(),
            message: format!("malformed trial result: {err}"),
        })
    } else {
        Err(TrialError::Worker {
            kind: envelope
                .pointer("/kind")
                .and_then(Value::as_str)
                .unwrap_or("worker")
                .to_string(),
            message: envelope
                .pointer("/error")
                .and_then(Value::as_str)
                .unwrap_or("trial worker reported failure")
                .to_string(),
        })
    }
}

fn run_trial_in_worker(
    config: &TrialConfig,
    options: &SweepOptions,
    scratch: &Path,
    index: usize,
) -> Result<TrialResult, SweepError> {
    let input_path = scratch.join(format!("trial_{index}_input.json"));
    let output_path = scratch.join(format!("trial_{index}_output.json"));
    write_worker_input(&input_path, config, &options.trial)?;

    let worker = match &options.worker {
        Some(path) => path.clone(),
        None => std::env::current_exe()?,
    };
    let output = Command::new(&worker)
        .arg("trial")
        .arg("--input")
        .arg(&input_path)
        .arg("--output")
        .arg(&output_path)
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()?;

    if !output_path.exists() {
        let stderr_tail = String::from_utf8_lossy(&output.stderr)
            .lines()
            .rev()
            .find(|line| !line.trim().is_empty())
            .unwrap_or("trial worker exited without writing a result")
            .to_string();
        return Err(TrialError::Worker {
            kind: "worker".to_string(),
            message: format!("worker exited with {}: {}", output.status, stderr_tail),
        }
        .into());
    }
    parse_worker_output(&fs::read(&output_path)?).map_err(Into::into)
}
