// crates/fourd-core/src/submission.rs
//
// Submission parameter set and per-stage job graph shapes (spec §4.I, wire
// schema in §6). Pure data; building the graph against a real farm driver
// and polling it lives in fourd-farm::submission / fourd-farm::poller.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Parameters the operator chose for a submission (spec §4.I step 1).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SubmitParams {
    pub offset_frame: i64,
    pub resolution: u32,
    pub texture_size: u32,
    pub mesh_clean_faces_threshold: f32,
    pub smooth_factor: f32,
    pub region_size: u32,
    pub skip_masks: bool,
    pub match_photos_interval: u32,
    pub resolve_only: bool,
}

impl Default for SubmitParams {
    fn default() -> Self {
        Self {
            offset_frame: 0,
            resolution: 2048,
            texture_size: 2048,
            mesh_clean_faces_threshold: 0.0,
            smooth_factor: 0.0,
            region_size: 0,
            skip_masks: false,
            match_photos_interval: 1,
            resolve_only: false,
        }
    }
}

/// An operator's request to submit a Shot's frame range as a Job.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SubmitOrder {
    pub shot_id: Uuid,
    pub job_name: String,
    /// Shot-relative [start, end].
    pub frame_range: (i64, i64),
    pub params: SubmitParams,
}

/// The four pipeline stages a submission walks through (spec §4.I).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stage {
    Initialize,
    Resolve,
    Conversion,
    Export,
}

impl Stage {
    pub fn label(&self) -> &'static str {
        match self {
            Stage::Initialize => "initialize",
            Stage::Resolve => "resolve",
            Stage::Conversion => "conversion",
            Stage::Export => "export",
        }
    }

    /// Build the ordered stage list for a submission, omitting conversion
    /// and export when the order is resolve-only (spec §4.I).
    pub fn plan(resolve_only: bool) -> Vec<Stage> {
        if resolve_only {
            vec![Stage::Initialize, Stage::Resolve]
        } else {
            vec![Stage::Initialize, Stage::Resolve, Stage::Conversion, Stage::Export]
        }
    }
}

/// The YAML parameter sheet written next to the job folder (spec §6).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SubmissionSheet {
    pub version: String,
    pub start_frame: i64,
    pub end_frame: i64,
    pub offset_frame: i64,
    pub shot_path: String,
    pub job_path: String,
    pub cali_path: String,
    pub project_name: String,
    pub project_id: String,
    pub shot_name: String,
    pub shot_id: String,
    pub job_name: String,
    pub job_id: String,
    pub no_cloud_sync: bool,
    pub texture_size: u32,
    pub region_size: u32,
    pub smooth_model: f32,
    pub match_photos_interval: u32,
    pub mesh_clean_faces_threshold: f32,
    pub skip_masks: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_only_omits_conversion_and_export() {
        assert_eq!(Stage::plan(true), vec![Stage::Initialize, Stage::Resolve]);
        assert_eq!(
            Stage::plan(false),
            vec![Stage::Initialize, Stage::Resolve, Stage::Conversion, Stage::Export]
        );
    }

    #[test]
    fn sheet_round_trips_through_yaml() {
        let sheet = SubmissionSheet {
            version: "1".into(),
            start_frame: 0,
            end_frame: 12,
            offset_frame: 5,
            shot_path: "/shots/s1".into(),
            job_path: "/shots/s1/jobs/j1".into(),
            cali_path: "/shots/s1/cali".into(),
            project_name: "p".into(),
            project_id: "p-1".into(),
            shot_name: "s1".into(),
            shot_id: "s-1".into(),
            job_name: "j1".into(),
            job_id: "j-1".into(),
            no_cloud_sync: false,
            texture_size: 4096,
            region_size: 8,
            smooth_model: 0.5,
            match_photos_interval: 1,
            mesh_clean_faces_threshold: 0.1,
            skip_masks: false,
        };
        let yaml = serde_yaml::to_string(&sheet).unwrap();
        let back: SubmissionSheet = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back.job_id, sheet.job_id);
        assert_eq!(back.end_frame, 12);
    }
}
