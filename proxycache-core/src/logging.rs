//! Logger initialisation
//!
//! Everything logs through the standard `log` macros; this only installs the
//! `env_logger` backend. `RUST_LOG`, when set, refines the configured level.

use crate::config::LoggingConfig;

/// Install the global logger. Safe to call more than once; later calls are no-ops.
pub fn init_logging(config: &LoggingConfig) -> anyhow::Result<()> {
    let level = config.level_filter()?;

    let _ = env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .format_timestamp_millis()
        .format_module_path(false)
        .try_init();

    Ok(())
}
