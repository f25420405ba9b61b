// Prometheus metrics for the aligner tool server
//
// Exposed on the optional /metrics HTTP endpoint:
// - Tool calls by outcome (counter)
// - Tool call latency (histogram)
// - Aligner processes currently running (gauge)

use lazy_static::lazy_static;
use prometheus::{
    core::Collector, CounterVec, Encoder, HistogramVec, IntGauge, Registry, TextEncoder,
};
use std::sync::Arc;
use std::time::Duration;

lazy_static! {
    pub static ref REGISTRY: Arc<Registry> = Arc::new(Registry::new());

    pub static ref TOOL_CALLS_TOTAL: CounterVec = CounterVec::new(
        prometheus::Opts::new("bwa_tool_calls_total", "Total number of tool calls by outcome"),
        &["tool", "outcome"]
    ).expect("Failed to create tool calls metric");

    pub static ref TOOL_CALL_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        prometheus::HistogramOpts::new("bwa_tool_call_duration_seconds", "Duration of tool calls in seconds")
            .buckets(vec![0.01, 0.1, 1.0, 10.0, 60.0, 300.0, 900.0, 1800.0, 3600.0]),
        &["tool"]
    ).expect("Failed to create tool call duration metric");

    pub static ref ACTIVE_INVOCATIONS: IntGauge = IntGauge::new(
        "bwa_active_invocations",
        "Number of aligner processes currently running"
    ).expect("Failed to create active invocations metric");
}

/// Register all metrics with [`REGISTRY`]. Safe to call more than once.
pub fn init() -> prometheus::Result<()> {
    register(Box::new(TOOL_CALLS_TOTAL.clone()))?;
    register(Box::new(TOOL_CALL_DURATION_SECONDS.clone()))?;
    register(Box::new(ACTIVE_INVOCATIONS.clone()))?;
    Ok(())
}

fn register(collector: Box<dyn Collector>) -> prometheus::Result<()> {
    match REGISTRY.register(collector) {
        Err(prometheus::Error::AlreadyReg) => Ok(()),
        other => other,
    }
}

/// Record one finished tool call
pub fn record_tool_call(tool: &str, outcome: &str, elapsed: Duration) {
    TOOL_CALLS_TOTAL.with_label_values(&[tool, outcome]).inc();
    TOOL_CALL_DURATION_SECONDS
        .with_label_values(&[tool])
        .observe(elapsed.as_secs_f64());
}

/// Decrements [`ACTIVE_INVOCATIONS`] when dropped
#[derive(Debug)]
pub struct ActiveInvocation(());

impl ActiveInvocation {
    pub fn start() -> Self {
        ACTIVE_INVOCATIONS.inc();
        Self(())
    }
}

impl Drop for ActiveInvocation {
    fn drop(&mut self) {
        ACTIVE_INVOCATIONS.dec();
    }
}

/// Gather all metrics in Prometheus text format
pub fn gather_metrics() -> anyhow::Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| anyhow::anyhow!("Failed to encode metrics: {}", e))?;
    String::from_utf8(buffer).map_err(|e| anyhow::anyhow!("Invalid UTF-8 in metrics: {}", e))
}
