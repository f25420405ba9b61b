//! Result Classification
//!
//! Turns a raw [`ProcessOutcome`] into the caller-facing [`InvocationResult`].
//! Checks run in a fixed order: a timeout wins over the non-zero status the
//! kill itself produces, and a zero exit still fails without real output.
//! Output left over from an earlier run does not count: the expected file
//! must have been written after the process was launched.

use super::command::CommandPlan;
use super::executor::ProcessOutcome;
use super::result::{FailureKind, InvocationFailure, InvocationResult, InvocationSuccess};
use std::time::Duration;

/// Largest stderr excerpt attached to a failure (4 KiB)
pub const MAX_EXCERPT_BYTES: usize = 4 * 1024;

/// File timestamps may trail the launch clock or be rounded to whole seconds
const MTIME_SLACK: Duration = Duration::from_secs(1);

/// Classify a finished process
pub fn classify(outcome: &ProcessOutcome, plan: &CommandPlan) -> InvocationResult {
    let operation = plan.operation.name();
    let failure = |kind: FailureKind, message: String| {
        let excerpt = tail_excerpt(&outcome.stderr, MAX_EXCERPT_BYTES);
        let stderr_truncated =
            outcome.stderr_truncated || excerpt.len() < outcome.stderr.trim_end().len();
        InvocationResult::Failure(InvocationFailure {
            operation: operation.to_string(),
            kind,
            message,
            stderr_excerpt: (!excerpt.is_empty()).then_some(excerpt),
            stderr_truncated,
        })
    };

    if outcome.timed_out {
        return failure(
            FailureKind::Timeout,
            format!(
                "{} timed out after {:.1}s and was killed",
                operation,
                outcome.duration.as_secs_f64()
            ),
        );
    }

    if outcome.launch_failed() {
        return InvocationResult::failure(operation, FailureKind::LaunchError, outcome.stderr.clone());
    }

    let Some(code) = outcome.exit_code else {
        let signal = outcome
            .signal
            .map_or_else(|| "unknown".to_string(), |s| s.to_string());
        return failure(
            FailureKind::ExecutionError,
            format!("{operation} was terminated by signal {signal}"),
        );
    };

    if code != 0 {
        return failure(
            FailureKind::ExecutionError,
            format!("{operation} exited with code {code}"),
        );
    }

    let meta = match std::fs::metadata(&plan.expected_output) {
        Ok(meta) if meta.is_file() => meta,
        _ => {
            return failure(
                FailureKind::NoOutputProduced,
                format!(
                    "{} exited successfully but {} was not created",
                    operation,
                    plan.expected_output.display()
                ),
            );
        }
    };
    let launched = outcome
        .started_at
        .checked_sub(MTIME_SLACK)
        .unwrap_or(outcome.started_at);
    if matches!(meta.modified(), Ok(modified) if modified < launched) {
        return failure(
            FailureKind::NoOutputProduced,
            format!(
                "{} exited successfully but {} was not written by this run",
                operation,
                plan.expected_output.display()
            ),
        );
    }
    let size = meta.len();
    if size == 0 {
        return failure(
            FailureKind::NoOutputProduced,
            format!(
                "{} exited successfully but {} is empty",
                operation,
                plan.expected_output.display()
            ),
        );
    }

    InvocationResult::Success(InvocationSuccess {
        operation: operation.to_string(),
        output_path: plan.expected_output.clone(),
        output_size_bytes: size,
        duration_ms: outcome.duration.as_millis() as u64,
        artifacts: plan
            .artifacts
            .iter()
            .filter(|p| p.exists())
            .cloned()
            .collect(),
        notes: plan.notes.clone(),
    })
}

/// Last `max_bytes` of `text`, cut on a character boundary
pub fn tail_excerpt(text: &str, max_bytes: usize) -> String {
    let text = text.trim_end();
    if text.len() <= max_bytes {
        return text.to_string();
    }
    let mut start = text.len() - max_bytes;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    text[start..].to_string()
}
