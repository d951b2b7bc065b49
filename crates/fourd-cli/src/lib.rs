// crates/fourd-cli/src/lib.rs
//
// Shared pieces across the fourd-* binaries: config loading and the
// tracing-subscriber setup every binary calls first in main().

pub mod config;
pub mod error;
pub mod logging;
pub mod slave_runtime;

pub use config::Config;
