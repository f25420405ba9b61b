//! Invocation Results
//!
//! `InvocationResult` is the only outcome type the engine hands back to its
//! caller. Failures are data, never panics or transport errors.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Classification of a failed invocation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// No operation with the requested name exists
    UnknownOperation,
    /// A required parameter was not supplied
    MissingParameter,
    /// An enum parameter was outside its allowed set
    InvalidChoice,
    /// A value had the wrong type, was out of range or malformed
    InvalidValue,
    /// A path parameter does not point at an existing file
    FileNotFound,
    /// An input file exceeds the configured size ceiling
    FileTooLarge,
    /// The aligner exceeded its wall-clock limit and was killed
    Timeout,
    /// The aligner could not be started
    LaunchError,
    /// The aligner exited non-zero or was killed by a signal
    ExecutionError,
    /// The aligner exited zero but left no usable output
    NoOutputProduced,
}

impl FailureKind {
    /// Stable label used in logs and metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UnknownOperation => "unknown_operation",
            Self::MissingParameter => "missing_parameter",
            Self::InvalidChoice => "invalid_choice",
            Self::InvalidValue => "invalid_value",
            Self::FileNotFound => "file_not_found",
            Self::FileTooLarge => "file_too_large",
            Self::Timeout => "timeout",
            Self::LaunchError => "launch_error",
            Self::ExecutionError => "execution_error",
            Self::NoOutputProduced => "no_output_produced",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A completed invocation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InvocationSuccess {
    /// Operation that ran
    pub operation: String,

    /// Primary output artifact (SAM/SAI file, or the `.bwt` of a new index)
    pub output_path: PathBuf,

    /// Size of `output_path` in bytes
    pub output_size_bytes: u64,

    /// Wall-clock duration of the aligner process in milliseconds
    pub duration_ms: u64,

    /// Every artifact the operation produced, including `output_path`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<PathBuf>,

    /// Operation-specific notes for the caller
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
}

/// A failed invocation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InvocationFailure {
    /// Operation requested (may be unknown)
    pub operation: String,

    /// Failure classification
    pub kind: FailureKind,

    /// Human-readable description
    pub message: String,

    /// Tail of the aligner's stderr, when a process ran
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stderr_excerpt: Option<String>,

    /// Whether the beginning of stderr was dropped from the excerpt
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub stderr_truncated: bool,
}

/// Outcome of one invocation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum InvocationResult {
    Success(InvocationSuccess),
    Failure(InvocationFailure),
}

impl InvocationResult {
    /// Create a failure result without stderr
    pub fn failure(operation: impl Into<String>, kind: FailureKind, message: impl Into<String>) -> Self {
        Self::Failure(InvocationFailure {
            operation: operation.into(),
            kind,
            message: message.into(),
            stderr_excerpt: None,
            stderr_truncated: false,
        })
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Failure kind, if this is a failure
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            Self::Success(_) => None,
            Self::Failure(f) => Some(f.kind),
        }
    }

    /// Label used for the `outcome` metric dimension
    pub fn outcome_label(&self) -> &'static str {
        match self {
            Self::Success(_) => "success",
            Self::Failure(f) => f.kind.as_str(),
        }
    }

    /// Get a human-readable summary
    pub fn summary(&self) -> String {
        match self {
            Self::Success(s) => {
                let mut text = format!(
                    "{} completed in {}ms\n\nOutput file: {}\nOutput size: {} bytes",
                    s.operation,
                    s.duration_ms,
                    s.output_path.display(),
                    s.output_size_bytes
                );
                if s.artifacts.len() > 1 {
                    text.push_str("\nFiles created:");
                    for artifact in &s.artifacts {
                        text.push_str(&format!("\n  - {}", artifact.display()));
                    }
                }
                for note in &s.notes {
                    text.push('\n');
                    text.push_str(note);
                }
                text
            }
            Self::Failure(f) => {
                let mut text = format!("{} failed ({}): {}", f.operation, f.kind, f.message);
                if let Some(ref stderr) = f.stderr_excerpt {
                    if !stderr.is_empty() {
                        text.push_str(if f.stderr_truncated {
                            "\n\nstderr (truncated, last lines):\n"
                        } else {
                            "\n\nstderr:\n"
                        });
                        text.push_str(stderr);
                    }
                }
                text
            }
        }
    }
}
