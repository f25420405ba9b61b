//! Tool Dispatcher
//!
//! Single entry point for running a named operation: catalog lookup,
//! validation, command construction, execution and classification, in that
//! order, stopping at the first failure. Holds nothing but the read-only
//! configuration and a runner, so one dispatcher serves any number of
//! concurrent calls.

use super::catalog::{self, OperationSpec};
use super::classifier::classify;
use super::command::{self, CommandPlan};
use super::executor::{ProcessRunner, TokioProcessRunner};
use super::result::{FailureKind, InvocationResult};
use super::timeout::ExecutionTimeout;
use super::validator::{json_type_name, validate};
use crate::config::Config;
use crate::metrics::{self, ActiveInvocation};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

#[derive(Clone)]
pub struct ToolDispatcher {
    config: Arc<Config>,
    runner: Arc<dyn ProcessRunner>,
}

impl std::fmt::Debug for ToolDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolDispatcher")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ToolDispatcher {
    /// Dispatcher that runs the real aligner
    pub fn new(config: Arc<Config>) -> Self {
        Self::with_runner(config, Arc::new(TokioProcessRunner::new()))
    }

    /// Dispatcher with a custom process runner
    pub fn with_runner(config: Arc<Config>, runner: Arc<dyn ProcessRunner>) -> Self {
        Self { config, runner }
    }

    /// Operations this dispatcher accepts
    pub fn operations(&self) -> &'static [OperationSpec] {
        catalog::catalog()
    }

    /// Run `name` with `arguments`
    ///
    /// Never fails: unknown names, bad arguments and aligner failures all come
    /// back as [`InvocationResult::Failure`]. `null` arguments are treated as
    /// an empty object.
    pub async fn dispatch(&self, name: &str, arguments: &Value) -> InvocationResult {
        let started = Instant::now();
        let result = self.dispatch_inner(name, arguments).await;
        let elapsed = started.elapsed();

        match &result {
            InvocationResult::Success(s) => info!(
                operation = name,
                output = %s.output_path.display(),
                bytes = s.output_size_bytes,
                elapsed_ms = elapsed.as_millis() as u64,
                "Tool call succeeded"
            ),
            InvocationResult::Failure(f) => warn!(
                operation = name,
                kind = %f.kind,
                elapsed_ms = elapsed.as_millis() as u64,
                "Tool call failed: {}",
                f.message
            ),
        }

        // Unknown names are caller-controlled; keep them out of label values
        let label = if catalog::lookup(name).is_some() {
            name
        } else {
            "unknown"
        };
        metrics::record_tool_call(label, result.outcome_label(), elapsed);

        result
    }

    async fn dispatch_inner(&self, name: &str, arguments: &Value) -> InvocationResult {
        let Some(spec) = catalog::lookup(name) else {
            return InvocationResult::failure(
                name,
                FailureKind::UnknownOperation,
                format!(
                    "unknown operation '{}'; available operations: {}",
                    name,
                    catalog::operation_names()
                ),
            );
        };

        let empty = Map::new();
        let raw = match arguments {
            Value::Object(map) => map,
            Value::Null => &empty,
            other => {
                return InvocationResult::failure(
                    name,
                    FailureKind::InvalidValue,
                    format!("arguments must be a JSON object, got {}", json_type_name(other)),
                );
            }
        };

        let validated = match validate(spec, raw, &self.config) {
            Ok(v) => v,
            Err(e) => {
                debug!(operation = name, parameter = e.parameter(), "Validation failed");
                return InvocationResult::failure(name, e.kind(), e.to_string());
            }
        };

        let plan = command::build(&validated, &self.config);
        let outcome = {
            let _active = ActiveInvocation::start();
            self.runner
                .run(&plan, ExecutionTimeout::from(self.config.as_ref()))
                .await
        };

        let result = classify(&outcome, &plan);
        if !result.is_success() {
            discard_output(&plan);
        }
        result
    }
}

/// Remove a redirected output file left behind by a failed run
fn discard_output(plan: &CommandPlan) {
    if let Some(ref path) = plan.output_redirect {
        match std::fs::remove_file(path) {
            Ok(()) => debug!(path = %path.display(), "Removed output of failed run"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove output file"),
        }
    }
}
