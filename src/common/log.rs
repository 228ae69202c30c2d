//! Logging helpers
//!
//! Thin wrapper around `env_logger` so the binary and tests share one setup path.

use log::LevelFilter;

/// Initialize the logging system
///
/// `RUST_LOG` takes precedence over `level` when it is set. The logger is
/// built permissive and `level` is applied through [`set_log_level`], so the
/// level can still change once the configuration is loaded.
///
/// # Parameters
///
/// * `level` - Default log level (error, warn, info, debug, trace)
pub fn init_logger(level: &str) {
    let env = env_logger::Env::default().filter_or("RUST_LOG", "trace");

    // A second initialization (e.g. from several tests) is not an error for us.
    let _ = env_logger::Builder::from_env(env).try_init();
    set_log_level(level);
}

/// Change the active log level
///
/// Ignored when `RUST_LOG` is set. Unknown levels fall back to info.
pub fn set_log_level(level: &str) {
    if std::env::var_os("RUST_LOG").is_some() {
        return;
    }
    log::set_max_level(parse_level(level));
}

fn parse_level(level: &str) -> LevelFilter {
    level.parse().unwrap_or(LevelFilter::Info)
}
