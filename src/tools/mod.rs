//! Aligner Invocation Engine
//!
//! Turns a named operation plus loosely typed JSON arguments into one run of
//! the `bwa` binary and a structured result.
//!
//! # Security Features
//!
//! - **Closed Catalog**: Only the five declared operations can be invoked
//! - **List Invocation**: Arguments are passed as a vector, never through a shell
//! - **Timeout Enforcement**: Every run has a wall-clock limit that kills the whole process group
//! - **Input Validation**: Paths, ranges and choices are checked before anything is spawned
//! - **Size Limits**: Oversized inputs are rejected up front
//!
//! # Architecture
//!
//! The pipeline runs one stage per module:
//! - `catalog.rs`: Operation and parameter declarations
//! - `validator.rs`: Argument checking and normalization
//! - `command.rs`: Argument vector and output path construction
//! - `executor.rs`: Subprocess execution with timeout handling
//! - `classifier.rs`: Mapping process outcomes to results
//! - `dispatcher.rs`: The entry point tying the stages together
//!
//! # Example
//!
//! ```no_run
//! use bio_mcp_bwa::config::Config;
//! use bio_mcp_bwa::tools::ToolDispatcher;
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let dispatcher = ToolDispatcher::new(Arc::new(Config::resolve()?));
//!
//!     let result = dispatcher
//!         .dispatch("bwa_index", &json!({ "reference_fasta": "/data/genome.fa" }))
//!         .await;
//!     println!("{}", result.summary());
//!
//!     Ok(())
//! }
//! ```

pub mod catalog;
mod classifier;
pub mod command;
mod dispatcher;
mod executor;
mod result;
mod timeout;
pub mod validator;

pub use catalog::{lookup, OperationId, OperationSpec};
pub use classifier::{classify, tail_excerpt};
pub use command::CommandPlan;
pub use dispatcher::ToolDispatcher;
pub use executor::{ProcessOutcome, ProcessRunner, TokioProcessRunner};
pub use result::{FailureKind, InvocationFailure, InvocationResult, InvocationSuccess};
pub use timeout::{ExecutionTimeout, TimeoutElapsed};
pub use validator::{validate, ValidatedArguments, ValidationError};
