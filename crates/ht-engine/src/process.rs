//! Runs an external trainer once per evaluation.

use crate::config::TrainerCommand;
use ht_optimizer::{Evaluator, Metrics, TrainingConfig};
use ht_types::ObjectiveError;
use serde_json::Value;
use std::process::{Command, Stdio};
use std::time::Instant;
use tracing::{debug, info};

const STDERR_TAIL_LINES: usize = 20;

/// Evaluator backed by a child process.
#[derive(Debug, Clone)]
pub struct CommandEvaluator {
    command: TrainerCommand,
}

impl CommandEvaluator {
    pub fn new(command: TrainerCommand) -> Self {
        Self { command }
    }

    fn build(&self, config: &TrainingConfig) -> Command {
        let mut cmd = Command::new(&self.command.program);
        cmd.args(&self.command.args)
            .args(config.to_args())
            .stdin(Stdio::null());
        if let Some(dir) = &self.command.working_dir {
            cmd.current_dir(dir);
        }
        cmd
    }
}

impl Evaluator for CommandEvaluator {
    fn evaluate(&mut self, config: &TrainingConfig) -> Result<Metrics, ObjectiveError> {
        let program = &self.command.program;
        info!("launching {} {}", program, config.to_args().join(" "));
        let started = Instant::now();

        let output = self
            .build(config)
            .output()
            .map_err(|e| ObjectiveError::EvaluatorFailed {
                message: format!("failed to launch {program}: {e}"),
            })?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() {
            return Err(ObjectiveError::EvaluatorFailed {
                message: format!("{program} exited with {}: {}", output.status, tail(&stderr)),
            });
        }
        debug!(
            "{} finished in {:.1}s, stderr tail: {}",
            program,
            started.elapsed().as_secs_f64(),
            tail(&stderr)
        );

        parse_metrics(&String::from_utf8_lossy(&output.stdout))
    }
}

fn tail(text: &str) -> String {
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("\n")
}

/// Parse the last non-empty line of trainer output as `{"metric": number}`.
pub fn parse_metrics(stdout: &str) -> Result<Metrics, ObjectiveError> {
    let line = stdout
        .lines()
        .rev()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .ok_or_else(|| ObjectiveError::InvalidOutput {
            message: "trainer printed nothing on stdout".into(),
        })?;

    let value: Value = serde_json::from_str(line).map_err(|e| ObjectiveError::InvalidOutput {
        message: format!("last line is not JSON ({e}): {line}"),
    })?;
    let object = value.as_object().ok_or_else(|| ObjectiveError::InvalidOutput {
        message: format!("expected a JSON object of metrics, got: {line}"),
    })?;

    object
        .iter()
        .map(|(name, v)| {
            v.as_f64()
                .map(|x| (name.clone(), x))
                .ok_or_else(|| ObjectiveError::InvalidOutput {
                    message: format!("metric {name} is not a number: {v}"),
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ht_optimizer::{NamedParameters, ParameterValue, SearchSpace, TrainerSettings};

    fn training_config(lr0: f64) -> TrainingConfig {
        let space = SearchSpace::new().add_log_real("lr0", 0.001, 0.1);
        let params: NamedParameters = space.to_named(&[ParameterValue::Float(lr0)]).unwrap();
        TrainerSettings::default().merge(&params).unwrap()
    }

    fn shell(script: &str) -> CommandEvaluator {
        CommandEvaluator::new(TrainerCommand {
            program: "sh".into(),
            args: vec!["-c".into(), script.into(), "trainer".into()],
            working_dir: None,
        })
    }

    #[test]
    fn last_line_carries_metrics() {
        let out = "Epoch 1/100 ...\nEpoch 2/100 ...\n{\"metrics/recall(B)\": 0.61, \"metrics/mAP50(B)\": 0.7}\n\n";
        let metrics = parse_metrics(out).unwrap();
        assert_eq!(metrics["metrics/recall(B)"], 0.61);
        assert_eq!(metrics.len(), 2);
    }

    #[test]
    fn malformed_output_is_rejected() {
        for out in ["", "  \n", "done", "[0.5]", "{\"recall\": \"high\"}"] {
            assert!(
                matches!(parse_metrics(out), Err(ObjectiveError::InvalidOutput { .. })),
                "accepted {out:?}"
            );
        }
    }

    #[cfg(unix)]
    #[test]
    fn parameters_reach_the_trainer() {
        let mut evaluator = shell(
            r#"for a in "$@"; do case $a in lr0=*) echo "{\"metrics/recall(B)\": ${a#lr0=}}";; esac; done"#,
        );
        let metrics = evaluator.evaluate(&training_config(0.01)).unwrap();
        assert_eq!(metrics["metrics/recall(B)"], 0.01);
    }

    #[cfg(unix)]
    #[test]
    fn failing_trainer_reports_stderr() {
        let mut evaluator = shell("echo 'CUDA out of memory' >&2; exit 3");
        match evaluator.evaluate(&training_config(0.01)) {
            Err(ObjectiveError::EvaluatorFailed { message }) => {
                assert!(message.contains("CUDA out of memory"), "{message}");
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[test]
    fn missing_program_is_an_evaluator_failure() {
        let mut evaluator = CommandEvaluator::new(TrainerCommand {
            program: "hypertune-no-such-trainer".into(),
            ..TrainerCommand::default()
        });
        assert!(matches!(
            evaluator.evaluate(&training_config(0.01)),
            Err(ObjectiveError::EvaluatorFailed { .. })
        ));
    }
}
