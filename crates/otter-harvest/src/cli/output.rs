//! Output mode flags shared by the subcommands.
//!
//! `main` records the global `--json` / `--quiet` flags in the environment so
//! every command can check them without threading them through.

/// Whether machine-readable output was requested.
pub fn is_json() -> bool {
    std::env::var("OTTER_JSON").is_ok_and(|v| v == "1")
}

/// Whether non-essential output should be suppressed.
pub fn is_quiet() -> bool {
    std::env::var("OTTER_QUIET").is_ok_and(|v| v == "1")
}

/// Print a JSON value on stdout.
pub fn print_json(value: &serde_json::Value) {
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{s}"),
        Err(_) => println!("{value}"),
    }
}
