// crates/fourd-resolve/src/engine.rs
//
// The photogrammetry engine is an opaque black box (spec §1) — same
// treatment as the camera SDK and farm driver: a trait is the seam, and the
// only concrete implementation shells out to an external tool rather than
// embedding one, mirroring `CommandLineAudioTrimmer`.

use std::process::Command;

use fourd_core::SubmissionSheet;

use crate::error::{Result, ResolveError};

pub trait PhotogrammetryEngine: Send + Sync {
    /// Stage INITIALIZE: load the calibration archive and set up project state.
    fn initialize(&self, sheet: &SubmissionSheet) -> Result<()>;
    /// Stage RESOLVE: reconstruct one frame's mesh + texture, returning the
    /// opaque bundle the resolve cache stores.
    fn resolve_frame(&self, sheet: &SubmissionSheet, frame: i64) -> Result<Vec<u8>>;
    /// Stage CONVERSION: derive downstream formats (glb/draco/texture) from
    /// an already-resolved frame.
    fn convert_frame(&self, sheet: &SubmissionSheet, frame: i64) -> Result<()>;
}

/// Invokes an external photogrammetry tool as a subprocess, one call per
/// operation. Nothing in this crate's test suite exercises this directly —
/// it needs a real binary on `PATH`.
pub struct CommandLineEngine {
    pub binary: std::path::PathBuf,
}

impl CommandLineEngine {
    fn run(&self, args: &[&str]) -> Result<()> {
        let status = Command::new(&self.binary)
            .args(args)
            .status()
            .map_err(|e| ResolveError::ExportFailed(format!("spawning {}: {e}", self.binary.display())))?;
        if status.success() {
            Ok(())
        } else {
            Err(ResolveError::ExportFailed(format!("{} exited with {status}", self.binary.display())))
        }
    }
}

impl PhotogrammetryEngine for CommandLineEngine {
    fn initialize(&self, sheet: &SubmissionSheet) -> Result<()> {
        self.run(&["initialize", "--cali-path", &sheet.cali_path, "--job-path", &sheet.job_path])
    }

    fn resolve_frame(&self, sheet: &SubmissionSheet, frame: i64) -> Result<Vec<u8>> {
        let out = std::env::temp_dir().join(format!("resolve_{}_{frame}.bin", sheet.job_id));
        self.run(&["resolve", "--job-path", &sheet.job_path, "--frame", &frame.to_string(), "--out", out.to_str().unwrap_or_default()])?;
        std::fs::read(&out).map_err(ResolveError::from)
    }

    fn convert_frame(&self, sheet: &SubmissionSheet, frame: i64) -> Result<()> {
        self.run(&["convert", "--job-path", &sheet.job_path, "--frame", &frame.to_string()])
    }
}

/// A stand-in engine used where no external tool is configured: every
/// operation fails with `ExternalToolFailure`'s Rust-side counterpart
/// (spec §4.N), rather than silently producing empty output.
pub struct UnconfiguredEngine;

impl PhotogrammetryEngine for UnconfiguredEngine {
    fn initialize(&self, _sheet: &SubmissionSheet) -> Result<()> {
        Err(ResolveError::ExportFailed("no photogrammetry engine configured".into()))
    }

    fn resolve_frame(&self, _sheet: &SubmissionSheet, _frame: i64) -> Result<Vec<u8>> {
        Err(ResolveError::ExportFailed("no photogrammetry engine configured".into()))
    }

    fn convert_frame(&self, _sheet: &SubmissionSheet, _frame: i64) -> Result<()> {
        Err(ResolveError::ExportFailed("no photogrammetry engine configured".into()))
    }
}

pub fn engine_from_env() -> Box<dyn PhotogrammetryEngine> {
    match std::env::var_os("FOURD_PHOTOGRAMMETRY_BIN") {
        Some(binary) => Box::new(CommandLineEngine { binary: binary.into() }),
        None => Box::new(UnconfiguredEngine),
    }
}
