// crates/fourd-resolve/src/export.rs
//
// Export Engine (spec §4.K): turns a job's resolved frame range into
// on-disk output. .obj and .4dh are written independently per frame so
// export is simply "fan out across the pool, wait for all" — order
// doesn't matter because each frame is its own file. .abc (Alembic) is one
// file holding every frame in sequence, so out-of-order completions are
// buffered by frame number and only flushed once the next frame the writer
// is waiting for actually lands (a pending-buffer + cursor, the same shape
// `Roll::pack` uses for its positional index, just applied to a live
// writer instead of a finished byte buffer).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{Result, ResolveError};
use crate::pool::WorkerPool;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExportFormat {
    Obj,
    FourDh,
    Abc,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Obj => "obj",
            ExportFormat::FourDh => "4dh",
            ExportFormat::Abc => "abc",
        }
    }

    fn folder_suffix(&self) -> &'static str {
        match self {
            ExportFormat::Obj => "export_obj",
            ExportFormat::FourDh => "export_4dh",
            ExportFormat::Abc => "export_abc",
        }
    }
}

/// Replaces every non-alphanumeric character with `_` (spec §4.K: sibling
/// export folders must be filesystem-safe regardless of job name content).
pub fn sanitize_folder_name(name: &str) -> String {
    name.chars().map(|c| if c.is_alphanumeric() { c } else { '_' }).collect()
}

/// The export folder sits next to the job folder, not inside it, named
/// after the job plus the format's suffix.
pub fn sibling_export_dir(job_dir: &Path, job_name: &str, format: ExportFormat) -> PathBuf {
    let parent = job_dir.parent().unwrap_or(job_dir);
    parent.join(format!("{}_{}", sanitize_folder_name(job_name), format.folder_suffix()))
}

/// Parallel per-frame export for formats where each frame is a standalone
/// file (.obj, .4dh).
pub fn export_parallel(
    pool: &WorkerPool,
    frame_range: (i64, i64),
    format: ExportFormat,
    dest_dir: &Path,
    export_frame: impl Fn(i64) -> Result<Vec<u8>> + Send + Sync + 'static,
) -> Result<usize> {
    std::fs::create_dir_all(dest_dir)?;
    let export_frame = std::sync::Arc::new(export_frame);

    let handles: Vec<_> = (frame_range.0..=frame_range.1)
        .map(|frame| {
            let export_frame = std::sync::Arc::clone(&export_frame);
            let dest = dest_dir.join(format!("frame_{:06}.{}", frame, format.extension()));
            pool.submit(move || (frame, export_frame(frame).and_then(|bytes| std::fs::write(&dest, bytes).map_err(ResolveError::from))))
        })
        .collect();

    let mut written = 0;
    for handle in handles {
        match handle.join() {
            Some((_, Ok(()))) => written += 1,
            // A frame missing on disk ticks and is skipped, it doesn't
            // abort the export (spec §4.K).
            Some((frame, Err(ResolveError::ResourceMissing(reason)))) => {
                debug!(frame, %reason, "frame missing during export, skipping");
            }
            Some((_, Err(err))) => return Err(err),
            None => return Err(ResolveError::ExportFailed("worker dropped before finishing".into())),
        }
    }
    Ok(written)
}

/// Ordered export for .abc: every frame renders in parallel, but `sink` is
/// only ever called in frame order. Frames that finish early sit in
/// `pending` until the cursor reaches them. A frame missing on disk ticks
/// and is omitted from the written samples rather than aborting the export
/// (spec §4.K).
pub fn export_ordered_abc(
    pool: &WorkerPool,
    frame_range: (i64, i64),
    export_frame: impl Fn(i64) -> Result<Vec<u8>> + Send + Sync + 'static,
    mut sink: impl FnMut(i64, Vec<u8>) -> Result<()>,
) -> Result<()> {
    let export_frame = std::sync::Arc::new(export_frame);
    let results = crate::pool::as_completed(
        (frame_range.0..=frame_range.1)
            .map(|frame| {
                let export_frame = std::sync::Arc::clone(&export_frame);
                pool.submit(move || (frame, export_frame(frame)))
            })
            .collect(),
    );

    let mut pending: BTreeMap<i64, Option<Vec<u8>>> = BTreeMap::new();
    let mut cursor = frame_range.0;

    for (frame, outcome) in results {
        let slot = match outcome {
            Ok(bytes) => Some(bytes),
            Err(ResolveError::ResourceMissing(reason)) => {
                debug!(frame, %reason, "frame missing during export, skipping");
                None
            }
            Err(err) => return Err(err),
        };
        pending.insert(frame, slot);
        while let Some(slot) = pending.remove(&cursor) {
            if let Some(bytes) = slot {
                sink(cursor, bytes)?;
            }
            cursor += 1;
        }
    }

    if cursor <= frame_range.1 {
        return Err(ResolveError::ExportFailed(format!("frame {} never completed", cursor)));
    }
    Ok(())
}

/// External audio-trim tool invocation (spec §4.K). The actual encoder is
/// an opaque collaborator, same treatment as the camera SDK and farm driver
/// (spec §1) — this trait is the seam, `CommandLineAudioTrimmer` the real
/// implementation nothing in this crate's tests exercises directly.
pub trait AudioTrimmer {
    fn trim(&self, input: &Path, output: &Path, start_seconds: f64, end_seconds: f64) -> Result<()>;
}

pub struct CommandLineAudioTrimmer {
    pub binary: PathBuf,
}

impl AudioTrimmer for CommandLineAudioTrimmer {
    fn trim(&self, input: &Path, output: &Path, start_seconds: f64, end_seconds: f64) -> Result<()> {
        let status = std::process::Command::new(&self.binary)
            .arg("-i")
            .arg(input)
            .arg("-ss")
            .arg(start_seconds.to_string())
            .arg("-to")
            .arg(end_seconds.to_string())
            .arg(output)
            .status()?;
        if status.success() {
            Ok(())
        } else {
            Err(ResolveError::ExportFailed(format!("audio trim tool exited with {status}")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn sanitizes_non_alnum_characters() {
        assert_eq!(sanitize_folder_name("take 1 (final)!"), "take_1__final__");
    }

    #[test]
    fn sibling_dir_sits_next_to_job_not_inside_it() {
        let job_dir = Path::new("/submit/proj/shot/jobs/take-1");
        let export_dir = sibling_export_dir(job_dir, "take-1", ExportFormat::Obj);
        assert_eq!(export_dir, Path::new("/submit/proj/shot/jobs/take_1_export_obj"));
    }

    #[test]
    fn export_parallel_writes_one_file_per_frame() {
        let dir = tempdir().unwrap();
        let pool = WorkerPool::new(4);
        let written = export_parallel(&pool, (0, 4), ExportFormat::Obj, dir.path(), |frame| Ok(vec![frame as u8])).unwrap();
        assert_eq!(written, 5);
        assert!(dir.path().join("frame_000000.obj").exists());
        assert!(dir.path().join("frame_000004.obj").exists());
    }

    #[test]
    fn ordered_abc_export_receives_frames_strictly_in_order_despite_reverse_completion() {
        let pool = WorkerPool::new(4);
        let order = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let order_ref = std::sync::Arc::clone(&order);

        export_ordered_abc(
            &pool,
            (0, 4),
            |frame| {
                // Frames finish in reverse order to stress the buffering.
                std::thread::sleep(std::time::Duration::from_millis(((4 - frame) * 5) as u64));
                Ok(vec![frame as u8])
            },
            move |frame, bytes| {
                order_ref.lock().unwrap().push(frame);
                assert_eq!(bytes, vec![frame as u8]);
                Ok(())
            },
        )
        .unwrap();

        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn export_parallel_skips_a_missing_frame_instead_of_aborting() {
        let dir = tempdir().unwrap();
        let pool = WorkerPool::new(4);
        let written = export_parallel(&pool, (0, 4), ExportFormat::Obj, dir.path(), |frame| {
            if frame == 2 {
                Err(ResolveError::ResourceMissing(format!("frame {frame} absent")))
            } else {
                Ok(vec![frame as u8])
            }
        })
        .unwrap();

        assert_eq!(written, 4, "the missing frame is not counted as written");
        assert!(!dir.path().join("frame_000002.obj").exists());
        assert!(dir.path().join("frame_000003.obj").exists());
    }

    #[test]
    fn export_parallel_still_aborts_on_a_genuine_failure() {
        let dir = tempdir().unwrap();
        let pool = WorkerPool::new(4);
        let err = export_parallel(&pool, (0, 2), ExportFormat::Obj, dir.path(), |frame| {
            if frame == 1 {
                Err(ResolveError::ExportFailed("encoder crashed".into()))
            } else {
                Ok(vec![frame as u8])
            }
        })
        .unwrap_err();

        assert!(matches!(err, ResolveError::ExportFailed(_)));
    }

    #[test]
    fn ordered_abc_export_omits_a_missing_frame_but_keeps_going_in_order() {
        let pool = WorkerPool::new(4);
        let order = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let order_ref = std::sync::Arc::clone(&order);

        export_ordered_abc(
            &pool,
            (0, 4),
            |frame| {
                if frame == 2 {
                    Err(ResolveError::ResourceMissing("frame 2 absent".into()))
                } else {
                    Ok(vec![frame as u8])
                }
            },
            move |frame, bytes| {
                order_ref.lock().unwrap().push(frame);
                assert_eq!(bytes, vec![frame as u8]);
                Ok(())
            },
        )
        .unwrap();

        assert_eq!(*order.lock().unwrap(), vec![0, 1, 3, 4], "frame 2 is omitted, not aborted on");
    }
}
