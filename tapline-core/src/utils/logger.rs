//! Tracing subscriber initialization shared by binaries and tests.

use anyhow::Result;
use tracing_subscriber::EnvFilter;

/// Initialize the global tracing subscriber.
///
/// `RUST_LOG` wins over the configured level when set. Hot-path code never
/// logs per-packet; only startup, shutdown, shed transitions, and config
/// warnings go through here.
pub fn init_logging(log_level: &str, json_logs: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(log_level))?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true);

    // The builder carries the shared settings; JSON only swaps the format.
    if json_logs {
        builder.json().init();
    } else {
        builder.init();
    }

    Ok(())
}
