use once_cell::sync::OnceCell;
use opentelemetry::metrics::{Counter, Histogram, Meter};
use opentelemetry::{KeyValue, global};
use tracing::info;

struct AnalysisMetrics {
    agent_runs: Counter<u64>,
    agent_duration_ms: Histogram<f64>,
    analysis_runs: Counter<u64>,
}

static METRICS: OnceCell<AnalysisMetrics> = OnceCell::new();

fn handles() -> &'static AnalysisMetrics {
    METRICS.get_or_init(|| {
        let meter: Meter = global::meter("newslens.analysis");
        AnalysisMetrics {
            agent_runs: meter
                .u64_counter("agent_runs_total")
                .with_description("Agent task completions by agent and status")
                .init(),
            agent_duration_ms: meter
                .f64_histogram("agent_duration_ms")
                .with_description("Agent task runtime in milliseconds")
                .init(),
            analysis_runs: meter
                .u64_counter("analysis_runs_total")
                .with_description("Analysis runs by outcome")
                .init(),
        }
    })
}

/// Hint to operators that OTEL metrics export can be configured externally.
pub fn init_metrics_from_env(service_name: &str) {
    if let Ok(endpoint) = std::env::var("NEWSLENS_OTEL_ENDPOINT") {
        info!(
            target: "telemetry",
            %endpoint,
            "NEWSLENS_OTEL_ENDPOINT set for {service_name}; install an OTLP meter provider to export analysis metrics"
        );
    }
}

/// Record one terminal agent task (no-op if no provider installed).
pub fn record_agent_run(agent: &str, status: &str, duration_ms: u64) {
    let metrics = handles();
    let attrs = [
        KeyValue::new("agent", agent.to_string()),
        KeyValue::new("status", status.to_string()),
    ];
    metrics.agent_runs.add(1, &attrs);
    metrics
        .agent_duration_ms
        .record(duration_ms as f64, &[KeyValue::new("agent", agent.to_string())]);
}

/// Record a finished run: `completed`, `aborted` or `cancelled`.
pub fn record_analysis_run(outcome: &str) {
    handles()
        .analysis_runs
        .add(1, &[KeyValue::new("outcome", outcome.to_string())]);
}
