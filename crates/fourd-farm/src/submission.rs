// crates/fourd-farm/src/submission.rs
//
// Submission builder (spec §4.I): turns a SubmitOrder plus Shot/Project
// context into a SubmissionSheet, writes it next to the job folder, and
// walks the four-stage job graph against a FarmDriver. Calibration shots
// additionally get their source images archived once INITIALIZE completes,
// since the render farm driver only ever sees the archive, not the raw
// capture directory (spec §4.I step 2).

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::info;
use uuid::Uuid;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

use fourd_core::{Job, Project, Shot, Stage, SubmissionSheet, SubmitOrder};

use crate::error::{FarmError, Result};

/// Per-stage job parameters handed to the farm driver (spec §6): which
/// frames the stage's tasks chunk over, whether each task depends on the
/// matching frame of the previous stage rather than the whole batch, and
/// the `ExtraInfoKeyValue` pairs every stage carries (`resolve_stage`,
/// `yaml_path`) — grounded in `deadline.py`'s `job_info` dict and
/// `sync_cloud.py`'s conversion/export payloads.
pub struct StageJobInfo {
    pub stage: Stage,
    /// "0" for whole-job stages (initialize, export), "A-B" otherwise.
    pub frames: String,
    pub chunk_size: u32,
    /// True only for conversion: each task depends on the same frame's
    /// resolve task rather than on the resolve batch as a whole.
    pub frame_dependent: bool,
    pub depends_on: Option<String>,
    pub extra_info: Vec<(String, String)>,
}

/// Opaque collaborator: the actual render farm submission API (spec §1).
/// `submit_stage` returns the farm's batch id for the stage just queued.
pub trait FarmDriver: Send + Sync {
    fn submit_stage(&self, job_id: Uuid, sheet: &SubmissionSheet, info: &StageJobInfo) -> Result<String>;
}

pub fn build_sheet(order: &SubmitOrder, project: &Project, shot: &Shot, job_id: Uuid, submit_root: &Path) -> SubmissionSheet {
    let shot_path = submit_root.join(&project.name).join(&shot.name);
    let job_path = shot_path.join("jobs").join(&order.job_name);
    let cali_path = shot_path.join("calibration");

    SubmissionSheet {
        version: "1".into(),
        start_frame: order.frame_range.0 - order.params.offset_frame,
        end_frame: order.frame_range.1 - order.params.offset_frame,
        offset_frame: order.params.offset_frame,
        shot_path: shot_path.to_string_lossy().into_owned(),
        job_path: job_path.to_string_lossy().into_owned(),
        cali_path: cali_path.to_string_lossy().into_owned(),
        project_name: project.name.clone(),
        project_id: project.id.to_string(),
        shot_name: shot.name.clone(),
        shot_id: shot.id.to_string(),
        job_name: order.job_name.clone(),
        job_id: job_id.to_string(),
        no_cloud_sync: shot.is_calibration,
        texture_size: order.params.texture_size,
        region_size: order.params.region_size,
        smooth_model: order.params.smooth_factor,
        match_photos_interval: order.params.match_photos_interval,
        mesh_clean_faces_threshold: order.params.mesh_clean_faces_threshold,
        skip_masks: order.params.skip_masks,
    }
}

pub fn write_sheet(sheet: &SubmissionSheet) -> Result<PathBuf> {
    let job_path = PathBuf::from(&sheet.job_path);
    std::fs::create_dir_all(&job_path)?;
    let path = job_path.join("submit.yaml");
    let yaml = serde_yaml::to_string(sheet)?;
    std::fs::write(&path, yaml)?;
    Ok(path)
}

/// Zips every file directly under `source_dir` into `cali_path` (spec
/// §4.I step 2: calibration archive built right after INITIALIZE).
pub fn archive_calibration(source_dir: &Path, cali_path: &Path) -> Result<()> {
    if let Some(parent) = cali_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = File::create(cali_path)?;
    let mut writer = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    let mut entries: Vec<_> = std::fs::read_dir(source_dir)?.filter_map(|e| e.ok()).collect();
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        writer.start_file(name, options).map_err(|e| FarmError::ProtocolViolation(e.to_string()))?;
        let bytes = std::fs::read(&path)?;
        writer.write_all(&bytes)?;
    }
    writer.finish().map_err(|e| FarmError::ProtocolViolation(e.to_string()))?;
    Ok(())
}

/// Walks INITIALIZE -> RESOLVE [-> CONVERSION -> EXPORT], feeding each
/// stage's batch id to the next as its dependency (spec §4.I), recording
/// the returned batch ids onto `job.batch_ids` in stage order.
pub fn build_job_graph(driver: &dyn FarmDriver, job: &mut Job, sheet: &SubmissionSheet, yaml_path: &Path, resolve_only: bool) -> Result<()> {
    let plan = Stage::plan(resolve_only);
    let yaml_path = yaml_path.to_string_lossy().into_owned();
    let mut depends_on: Option<String> = None;

    for stage in plan {
        let info = StageJobInfo {
            stage,
            frames: stage_frames(stage, sheet),
            chunk_size: 1,
            frame_dependent: matches!(stage, Stage::Conversion),
            depends_on: depends_on.clone(),
            extra_info: vec![
                ("resolve_stage".to_string(), stage.label().to_string()),
                ("yaml_path".to_string(), yaml_path.clone()),
            ],
        };
        let batch_id = driver.submit_stage(job.id, sheet, &info)?;
        info!(job = %job.id, stage = stage.label(), batch = %batch_id, "stage queued");
        job.batch_ids.push(batch_id.clone());
        depends_on = Some(batch_id);
    }
    Ok(())
}

/// Frame selector for a stage's job_info (spec §6): initialize and export
/// run once over the whole job, resolve and conversion chunk per frame.
fn stage_frames(stage: Stage, sheet: &SubmissionSheet) -> String {
    match stage {
        Stage::Initialize | Stage::Export => "0".to_string(),
        Stage::Resolve | Stage::Conversion => format!("{}-{}", sheet.start_frame, sheet.end_frame),
    }
}

/// Concrete `FarmDriver`: shells out to the Deadline command-line submitter
/// the same way `CommandLineEngine`/`CommandLineCameraDriver` shell out to
/// their own opaque collaborators (spec §1). `deadline.py`'s
/// `submit_deadline` posts a `job_info` dict through Deadline's Python API;
/// `deadlinecommand -SubmitJob <file>` is the equivalent entry point for a
/// process that only has a binary to call, not an embedded Python client.
pub struct CommandLineFarmDriver {
    pub binary: PathBuf,
}

impl FarmDriver for CommandLineFarmDriver {
    fn submit_stage(&self, job_id: Uuid, sheet: &SubmissionSheet, info: &StageJobInfo) -> Result<String> {
        let job_info_path = self.write_job_info_file(job_id, sheet, info)?;
        let output = std::process::Command::new(&self.binary).arg("-SubmitJob").arg(&job_info_path).output()?;
        if !output.status.success() {
            return Err(FarmError::DriverRejected(format!("deadlinecommand exited with {}", output.status)));
        }
        String::from_utf8_lossy(&output.stdout)
            .lines()
            .find_map(|line| line.strip_prefix("JobID="))
            .map(str::to_string)
            .ok_or_else(|| FarmError::ProtocolViolation("deadlinecommand did not report a JobID".into()))
    }
}

impl CommandLineFarmDriver {
    fn write_job_info_file(&self, job_id: Uuid, sheet: &SubmissionSheet, info: &StageJobInfo) -> Result<PathBuf> {
        let path = std::env::temp_dir().join(format!("{job_id}_{}_job_info.job", info.stage.label()));
        let mut file = File::create(&path)?;
        writeln!(file, "Plugin=4DREC")?;
        writeln!(file, "Name={}-{}", sheet.job_name, info.stage.label())?;
        writeln!(file, "Frames={}", info.frames)?;
        writeln!(file, "ChunkSize={}", info.chunk_size)?;
        writeln!(file, "IsFrameDependent={}", info.frame_dependent)?;
        if let Some(depends_on) = &info.depends_on {
            writeln!(file, "JobDependencies={depends_on}")?;
        }
        for (index, (key, value)) in info.extra_info.iter().enumerate() {
            writeln!(file, "ExtraInfoKeyValue{index}={key}={value}")?;
        }
        Ok(path)
    }
}

/// Fallback used when no farm driver binary is configured — fails loudly
/// rather than fabricating a batch id (same shape as `UnconfiguredEngine`
/// and `NoCameraDriver`).
pub struct NoFarmDriver;

impl FarmDriver for NoFarmDriver {
    fn submit_stage(&self, _job_id: Uuid, _sheet: &SubmissionSheet, _info: &StageJobInfo) -> Result<String> {
        Err(FarmError::DriverRejected("no farm driver configured".into()))
    }
}

/// Selects the real driver when `FOURD_FARM_DRIVER_BIN` is set, the
/// no-op fallback otherwise (spec §1).
pub fn farm_driver_from_env() -> Box<dyn FarmDriver> {
    match std::env::var_os("FOURD_FARM_DRIVER_BIN") {
        Some(binary) => Box::new(CommandLineFarmDriver { binary: binary.into() }),
        None => Box::new(NoFarmDriver),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fourd_core::{JobCacheProgress, JobState, SubmitParams};
    use std::sync::Mutex;
    use tempfile::tempdir;

    struct RecordingDriver {
        calls: Mutex<Vec<(Stage, String, bool, Option<String>, Vec<(String, String)>)>>,
    }

    impl FarmDriver for RecordingDriver {
        fn submit_stage(&self, _job_id: Uuid, _sheet: &SubmissionSheet, info: &StageJobInfo) -> Result<String> {
            self.calls.lock().unwrap().push((
                info.stage,
                info.frames.clone(),
                info.frame_dependent,
                info.depends_on.clone(),
                info.extra_info.clone(),
            ));
            Ok(format!("batch-{}", info.stage.label()))
        }
    }

    #[test]
    fn build_sheet_fills_every_path_and_param_field() {
        let project = Project::new("proj-a");
        let shot = Shot::new(project.id, "shot-a", false);
        let order = SubmitOrder {
            shot_id: shot.id,
            job_name: "job-a".into(),
            frame_range: (0, 9),
            params: SubmitParams::default(),
        };
        let sheet = build_sheet(&order, &project, &shot, Uuid::new_v4(), Path::new("/submit"));
        assert_eq!(sheet.start_frame, 0);
        assert_eq!(sheet.end_frame, 9);
        assert!(sheet.job_path.contains("job-a"));
        assert!(sheet.shot_path.contains("shot-a"));
    }

    #[test]
    fn build_sheet_subtracts_offset_from_the_submitted_frame_range() {
        let project = Project::new("proj-a");
        let shot = Shot::new(project.id, "shot-a", false);
        let order = SubmitOrder {
            shot_id: shot.id,
            job_name: "job-a".into(),
            frame_range: (5, 17),
            params: SubmitParams { offset_frame: 5, ..Default::default() },
        };
        let sheet = build_sheet(&order, &project, &shot, Uuid::new_v4(), Path::new("/submit"));
        assert_eq!(sheet.start_frame, 0);
        assert_eq!(sheet.end_frame, 12);
    }

    #[test]
    fn resolve_only_graph_skips_conversion_and_export() {
        let driver = RecordingDriver { calls: Mutex::new(Vec::new()) };
        let mut job = Job::new(Uuid::new_v4(), "job-a", (0, 9), SubmitParams::default());
        let sheet = build_sheet(
            &SubmitOrder { shot_id: job.shot_id, job_name: job.name.clone(), frame_range: job.frame_range, params: SubmitParams { resolve_only: true, ..Default::default() } },
            &Project::new("p"),
            &Shot::new(Uuid::new_v4(), "s", false),
            job.id,
            Path::new("/submit"),
        );

        build_job_graph(&driver, &mut job, &sheet, Path::new("/submit/job-a/submit.yaml"), true).unwrap();

        assert_eq!(job.batch_ids.len(), 2);
        let calls = driver.calls.lock().unwrap();
        assert_eq!(calls[0].0, Stage::Initialize);
        assert_eq!(calls[0].1, "0");
        assert!(!calls[0].2);
        assert_eq!(calls[0].3, None);
        assert!(calls[0].4.contains(&("resolve_stage".to_string(), "initialize".to_string())));
        assert!(calls[0].4.iter().any(|(k, v)| k == "yaml_path" && v.contains("submit.yaml")));

        assert_eq!(calls[1].0, Stage::Resolve);
        assert_eq!(calls[1].1, "0-9");
        assert!(!calls[1].2);
        assert_eq!(calls[1].3, Some("batch-initialize".into()));
        assert_eq!(job.state, JobState::Created);
        let _ = JobCacheProgress::default();
    }

    #[test]
    fn conversion_stage_is_frame_dependent_on_resolve() {
        let driver = RecordingDriver { calls: Mutex::new(Vec::new()) };
        let mut job = Job::new(Uuid::new_v4(), "job-a", (0, 9), SubmitParams::default());
        let sheet = build_sheet(
            &SubmitOrder { shot_id: job.shot_id, job_name: job.name.clone(), frame_range: job.frame_range, params: SubmitParams::default() },
            &Project::new("p"),
            &Shot::new(Uuid::new_v4(), "s", false),
            job.id,
            Path::new("/submit"),
        );

        build_job_graph(&driver, &mut job, &sheet, Path::new("/submit/job-a/submit.yaml"), false).unwrap();

        assert_eq!(job.batch_ids.len(), 4);
        let calls = driver.calls.lock().unwrap();
        assert_eq!(calls[2].0, Stage::Conversion);
        assert!(calls[2].2, "conversion must be frame-dependent on the matching resolve task");
        assert_eq!(calls[3].0, Stage::Export);
        assert_eq!(calls[3].1, "0");
        assert!(!calls[3].2);
    }

    #[test]
    fn calibration_archive_contains_every_source_file() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("cali_src");
        std::fs::create_dir_all(&source).unwrap();
        std::fs::write(source.join("a.jpg"), b"one").unwrap();
        std::fs::write(source.join("b.jpg"), b"two").unwrap();

        let archive = dir.path().join("cali.zip");
        archive_calibration(&source, &archive).unwrap();

        let file = File::open(&archive).unwrap();
        let mut zip = zip::ZipArchive::new(file).unwrap();
        assert_eq!(zip.len(), 2);
    }
}
