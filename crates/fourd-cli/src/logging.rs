// crates/fourd-cli/src/logging.rs
//
// One tracing-subscriber setup shared by every fourd-* binary: env-filter
// driven, defaulting to `info` when RUST_LOG isn't set, so the same binary
// is quiet in normal operation and verbose under `RUST_LOG=debug` without
// a recompile.

use tracing_subscriber::EnvFilter;

pub fn init(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
