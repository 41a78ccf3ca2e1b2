//! Output-mode helpers shared by every command.
//!
//! `main` exports the global CLI flags as environment variables so that
//! nested code can check the active mode without plumbing flags through
//! every call signature.

use serde_json::Value;

/// True when `--json` was passed: stdout carries machine-readable JSON only.
pub fn is_json() -> bool {
    std::env::var("REELSCAN_JSON").is_ok()
}

/// True when `--quiet` was passed: suppress summaries and hints.
pub fn is_quiet() -> bool {
    std::env::var("REELSCAN_QUIET").is_ok()
}

/// True when `--verbose` was passed: default log filter drops to debug.
pub fn is_verbose() -> bool {
    std::env::var("REELSCAN_VERBOSE").is_ok()
}

/// True when `--no-color` was passed or the standard `NO_COLOR` is set.
pub fn is_no_color() -> bool {
    std::env::var("REELSCAN_NO_COLOR").is_ok() || std::env::var("NO_COLOR").is_ok()
}

/// Pretty-print a JSON value to stdout.
pub fn print_json(value: &Value) {
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{s}"),
        Err(_) => println!("{value}"),
    }
}
