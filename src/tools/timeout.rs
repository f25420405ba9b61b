//! Execution Timeout Management
//!
//! Wall-clock bound applied to every aligner process.

use std::time::Duration;
use tokio::time;

/// Returned when the bounded future did not finish in time
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("execution timed out after {0:?}")]
pub struct TimeoutElapsed(pub Duration);

/// Execution timeout configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionTimeout {
    /// The timeout duration
    duration: Duration,
}

impl Default for ExecutionTimeout {
    fn default() -> Self {
        Self::from_secs(crate::config::DEFAULT_TIMEOUT_SECS)
    }
}

impl ExecutionTimeout {
    /// Create a new execution timeout
    ///
    /// # Example
    ///
    /// ```
    /// use std::time::Duration;
    /// use bio_mcp_bwa::tools::ExecutionTimeout;
    ///
    /// let timeout = ExecutionTimeout::new(Duration::from_secs(30));
    /// assert_eq!(timeout.duration(), Duration::from_secs(30));
    /// ```
    pub fn new(duration: Duration) -> Self {
        Self { duration }
    }

    /// Create a timeout from seconds
    pub fn from_secs(secs: u64) -> Self {
        Self::new(Duration::from_secs(secs))
    }

    /// Get the timeout duration
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Drive a future to completion, or give up once the timeout elapses
    ///
    /// The future is dropped on timeout; cleaning up whatever it was waiting
    /// on is the caller's job.
    pub async fn run<F>(&self, future: F) -> Result<F::Output, TimeoutElapsed>
    where
        F: std::future::Future,
    {
        time::timeout(self.duration, future)
            .await
            .map_err(|_| TimeoutElapsed(self.duration))
    }
}

impl From<&crate::config::Config> for ExecutionTimeout {
    fn from(config: &crate::config::Config) -> Self {
        Self::new(config.timeout())
    }
}
