//! Shared logging initialization for the agent binary and its tests.

use std::sync::OnceLock;

static INIT: OnceLock<()> = OnceLock::new();

fn parse_level() -> tracing::Level {
    match std::env::var("TCA_LOG")
        .unwrap_or_else(|_| "info".to_string())
        .to_ascii_lowercase()
        .as_str()
    {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "warn" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    }
}

/// Initialize process-level tracing output from `TCA_LOG`.
///
/// Safe to call multiple times; only the first call installs the
/// subscriber. Intentionally best-effort and never returns an error.
pub fn init() {
    init_with_level(parse_level());
}

/// Initialize with an explicit level, ignoring `TCA_LOG`. Used by the
/// binary when `--verbose` is passed.
pub fn init_with_level(level: tracing::Level) {
    if INIT.get().is_some() {
        return;
    }
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .try_init();
    let _ = INIT.set(());
}
