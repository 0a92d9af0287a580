//! Logging bootstrap on top of `env_logger`
//!
//! `RUST_LOG` always wins over the level passed in code.

pub use log::{debug, error, info, trace, warn, LevelFilter};

/// Initialize the logging system at `Info`
pub fn init() {
    init_with_level(LevelFilter::Info);
}

/// Initialize the logging system with a default level
///
/// Calling this more than once is harmless; later calls are ignored.
pub fn init_with_level(level: LevelFilter) {
    let mut builder = env_logger::Builder::new();
    builder.filter_level(level);
    builder.parse_env("RUST_LOG");

    if builder.try_init().is_err() {
        log::debug!("Logger already initialized");
    }
}
