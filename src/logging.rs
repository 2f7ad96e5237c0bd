//! Logging setup, selected by `AppConfig::env`.
//!
//! Mirrors `internal/logger/slogpretty` (a colourized, single-line console
//! format used for `env: local`) and the plain `slog.NewJSONHandler` used for
//! `env: prod`, built on top of the teacher's `log`/`env_logger` stack rather
//! than introducing a new logging crate.

use std::io::Write;

use log::LevelFilter;

/// Installs the process-wide logger for the given `env` (`"local"` or
/// `"prod"`). Any other value falls back to `env_logger`'s default
/// `RUST_LOG`-driven initialization, mirroring the original's `slog.Default()`
/// fallback for unrecognised environments.
pub fn init(env: &str) {
    match env {
        "local" => init_local(),
        "prod" => init_prod(),
        _ => env_logger::init(),
    }
}

/// Colourized, single-line console format for local development.
fn init_local() {
    env_logger::Builder::new()
        .filter_level(LevelFilter::Debug)
        .parse_default_env()
        .format(|buf, record| {
            let level = record.level();
            let color = match level {
                log::Level::Error => "\x1b[31m",
                log::Level::Warn => "\x1b[33m",
                log::Level::Info => "\x1b[32m",
                log::Level::Debug => "\x1b[36m",
                log::Level::Trace => "\x1b[90m",
            };
            writeln!(
                buf,
                "{color}{:<5}\x1b[0m {} {}",
                level,
                buf.timestamp_millis(),
                record.args()
            )
        })
        .init();
}

/// Structured `key=value` format at a reduced verbosity for production,
/// mirroring `slog.NewJSONHandler` pinned at `LevelError`.
fn init_prod() {
    env_logger::Builder::new()
        .filter_level(LevelFilter::Error)
        .parse_default_env()
        .init();
}
