//! Shared helpers for the integration tests.

use desync_client::{boundary::RecordingBoundary, sandbox::Scenario, ModuleHost, TickReport};
use desync_shared::config::DesyncConfig;

/// Installs a test-writer subscriber once per test binary.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("debug")
        .with_test_writer()
        .try_init();
}

/// Host for `scenario` with default tuning, recording everything it sends.
pub fn recording_host(scenario: &Scenario) -> anyhow::Result<ModuleHost<RecordingBoundary>> {
    scenario.build_host(&DesyncConfig::default(), RecordingBoundary::new())
}

/// Steps the scenario `ticks` times.
pub fn run_ticks(
    scenario: &mut Scenario,
    host: &mut ModuleHost<RecordingBoundary>,
    ticks: usize,
) -> Vec<TickReport> {
    (0..ticks).map(|_| scenario.step(host)).collect()
}
