//! Logging initialization for sevhash-core.
//!
//! Uses the `log` facade with `env_logger`, controlled by the `DEBUG_SEVHASH`
//! env var. Embedders that install their own `log` backend can skip [`init`]
//! entirely.

use std::sync::OnceLock;

static INIT: OnceLock<()> = OnceLock::new();

/// Initialize the logging subsystem.
///
/// Idempotent; only the first call has any effect.
///
/// - If `DEBUG_SEVHASH=1` or `DEBUG_SEVHASH=true` is set, enables DEBUG level
/// - If the `debug-logging` feature is enabled, enables DEBUG level
/// - Otherwise logging is set to ERROR level
pub fn init() {
    INIT.get_or_init(|| {
        init_impl();
    });
}

fn init_impl() {
    use log::LevelFilter;

    let debug_enabled = cfg!(feature = "debug-logging") || is_debug_env_set();

    let level = if debug_enabled {
        LevelFilter::Debug
    } else {
        LevelFilter::Error
    };

    env_logger::Builder::new()
        .filter_module("sevhash_core", level)
        .format_timestamp_millis()
        .try_init()
        .ok(); // Ignore error if already initialized
}

fn is_debug_env_set() -> bool {
    std::env::var("DEBUG_SEVHASH")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}
