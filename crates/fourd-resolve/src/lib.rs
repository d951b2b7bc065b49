// crates/fourd-resolve/src/lib.rs
//
// Post-initialize pipeline pieces that don't belong to the farm submission
// state machine itself: the worker pool everything else here runs on, the
// per-frame resolve cache, and the export engine that turns a resolved job
// into .obj/.4dh/.abc output.

pub mod cache;
pub mod engine;
pub mod error;
pub mod events;
pub mod export;
pub mod pool;

pub use cache::{negotiate_resolution, ResolveCache};
pub use engine::{engine_from_env, CommandLineEngine, PhotogrammetryEngine, UnconfiguredEngine};
pub use error::{ResolveError, Result};
pub use events::{ResolveEvent, ResolveStage};
pub use export::{export_ordered_abc, export_parallel, sanitize_folder_name, sibling_export_dir, AudioTrimmer, CommandLineAudioTrimmer, ExportFormat};
pub use pool::{as_completed, join_all, CancelToken, JobHandle, WorkerPool};
