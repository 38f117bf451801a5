use tracing_subscriber::EnvFilter;

/// Environment variable holding a log filter directive.
pub const LOG_ENV: &str = "AUTHCODE_LOG";

/// Filter used when `AUTHCODE_LOG` is unset or invalid.
pub fn fallback_directive(config_level: &str, verbose: bool) -> String {
    if verbose {
        "debug".to_string()
    } else if config_level.trim().is_empty() {
        "info".to_string()
    } else {
        config_level.trim().to_string()
    }
}

/// Install the stderr subscriber. `log` records from the library crates
/// are bridged in. Safe to call more than once; later calls are no-ops.
pub fn init(config_level: &str, verbose: bool) {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new(fallback_directive(config_level, verbose)));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
