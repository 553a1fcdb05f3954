use tracing::info;

pub fn init_telemetry(endpoint: &str) {
    info!(
        target: "telemetry.server",
        endpoint,
        "OpenTelemetry endpoint configured; forward tracing spans via collector-side subscriber"
    );
}

pub fn run_started(run_key: &str, url: &str, active_runs: usize, available_permits: usize) {
    info!(
        target: "telemetry.server",
        run_key,
        url,
        active_runs,
        available_permits,
        event = "run_started"
    );
}

pub fn run_completed(
    run_key: &str,
    outcome: &str,
    duration_ms: u64,
    agents_failed: usize,
    active_runs: usize,
) {
    info!(
        target: "telemetry.server",
        run_key,
        outcome,
        duration_ms,
        agents_failed,
        active_runs,
        event = "run_completed"
    );
}

pub fn run_failed(run_key: &str, error: &str, active_runs: usize) {
    info!(
        target: "telemetry.server",
        run_key,
        error,
        active_runs,
        event = "run_failed"
    );
}

pub fn run_rejected(active_runs: usize) {
    info!(
        target: "telemetry.server",
        active_runs,
        event = "run_rejected"
    );
}
