//! Logging utilities and structured logging support

pub use log::{debug, info, warn, error, trace};

use crate::core::config::LoggingConfig;

/// Initialize the logging system
///
/// The configured level is the default filter; `RUST_LOG` still takes
/// precedence when set. Calling this more than once is harmless.
pub fn init(config: &LoggingConfig) {
    let env = env_logger::Env::default().default_filter_or(config.level.as_str());
    let mut builder = env_logger::Builder::from_env(env);
    builder.format_timestamp_millis();
    if builder.try_init().is_err() {
        log::trace!("Logger already initialized");
    }
}

/// Initialize logging for unit and integration tests
pub fn init_for_tests() {
    let _ = env_logger::builder().is_test(true).try_init();
}
