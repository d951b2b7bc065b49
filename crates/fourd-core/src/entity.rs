// crates/fourd-core/src/entity.rs
//
// Project/Shot/Job entity model (spec §3). These are plain records; the
// document-store behaviour (persistence, cascading remove, callbacks) lives
// in fourd-farm::store::EntityStore. Keeping the data separate from the
// store mirrors the teacher's `state.rs` (pure ProjectState) vs `app.rs`
// (the thing that mutates it and emits events) split.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Monotonic lifecycle of a Shot (spec §3: state is monotonically non-decreasing).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum ShotState {
    Created = 0,
    Recorded = 1,
    Submitted = 2,
}

/// Monotonic lifecycle of a Job.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum JobState {
    Created = 0,
    Resolved = 1,
}

/// Per-frame farm task state. Deadline-style numeric encoding, per the
/// DESIGN NOTES open question — see DESIGN.md for the rationale.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum TaskState {
    Queued = 2,
    Suspended = 3,
    Rendering = 4,
    Completed = 5,
    Failed = 6,
    Pending = 8,
}

/// Per-camera, per-type cache-progress accumulator for a Shot (spec §4.H).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ShotCacheProgress {
    /// camera serial -> frames cached at full resolution.
    pub full_res_cached: HashMap<String, BTreeSet<i64>>,
    /// frame -> fraction of the working camera set that produced a thumbnail.
    pub thumbnail_fraction: BTreeMap<i64, f32>,
}

/// Job-level cache progress + last known per-frame farm task state (spec §4.H).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct JobCacheProgress {
    pub fully_cached_frames: BTreeSet<i64>,
    pub task_states: BTreeMap<i64, TaskState>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Shot {
    pub id: Uuid,
    pub project_id: Uuid,
    pub name: String,
    /// [start, end] inclusive, or None before recording.
    pub frame_range: Option<(i64, i64)>,
    pub total_size: u64,
    /// camera serial -> missing frame numbers reported by that camera.
    pub missing_frames: HashMap<String, BTreeSet<i64>>,
    pub is_calibration: bool,
    pub state: ShotState,
    #[serde(default)]
    pub cache_progress: ShotCacheProgress,
}

impl Shot {
    pub fn new(project_id: Uuid, name: impl Into<String>, is_calibration: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            project_id,
            name: name.into(),
            frame_range: None,
            total_size: 0,
            missing_frames: HashMap::new(),
            is_calibration,
            state: ShotState::Created,
            cache_progress: ShotCacheProgress::default(),
        }
    }

    /// Union of every camera's missing-frame set (spec §8 invariant).
    pub fn all_missing_frames(&self) -> BTreeSet<i64> {
        self.missing_frames.values().flatten().copied().collect()
    }

    /// Advance state, refusing to move it backwards (spec §3 invariant).
    pub fn advance_state(&mut self, next: ShotState) {
        if next > self.state {
            self.state = next;
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub shot_id: Uuid,
    pub name: String,
    /// Frame range, shot-relative.
    pub frame_range: (i64, i64),
    pub params: crate::submission::SubmitParams,
    pub state: JobState,
    /// External farm batch ids, ordered by stage (initialize, resolve,
    /// conversion, export — the last two absent when resolve_only).
    pub batch_ids: Vec<String>,
    #[serde(default)]
    pub cache: JobCacheProgress,
}

impl Job {
    pub fn new(shot_id: Uuid, name: impl Into<String>, frame_range: (i64, i64), params: crate::submission::SubmitParams) -> Self {
        Self {
            id: Uuid::new_v4(),
            shot_id,
            name: name.into(),
            frame_range,
            params,
            state: JobState::Created,
            batch_ids: Vec::new(),
            cache: JobCacheProgress::default(),
        }
    }

    /// Frame count covered by this job's range.
    pub fn frame_count(&self) -> i64 {
        self.frame_range.1 - self.frame_range.0 + 1
    }

    /// spec §8 invariant: state == RESOLVED iff every frame is COMPLETED.
    pub fn recompute_resolved_state(&mut self) {
        let all_completed = (self.frame_range.0..=self.frame_range.1).all(|f| {
            matches!(self.cache.task_states.get(&f), Some(TaskState::Completed))
        });
        if all_completed {
            self.state = JobState::Resolved;
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Project {
    pub id: Uuid,
    pub name: String,
}

impl Project {
    pub fn new(name: impl Into<String>) -> Self {
        Self { id: Uuid::new_v4(), name: name.into() }
    }
}

/// Kind of change carried by an EntityEvent (spec §3).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    Create,
    Modify,
    Remove,
    Progress,
}

/// Which kind of entity and which id an EntityEvent refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntityKind {
    Project,
    Shot,
    Job,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRef {
    pub kind: EntityKind,
    pub id: Uuid,
}

/// A tagged record broadcast to registered listeners (spec §3).
/// Invariant: REMOVE on a parent cascades REMOVE to children first — enforced
/// by the emitter (fourd_farm::store::EntityStore), not by this type.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct EntityEvent {
    pub kind: EventKind,
    pub entity: EntityRef,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shot_state_never_regresses() {
        let mut shot = Shot::new(Uuid::new_v4(), "take1", false);
        shot.advance_state(ShotState::Recorded);
        assert_eq!(shot.state, ShotState::Recorded);
        shot.advance_state(ShotState::Created);
        assert_eq!(shot.state, ShotState::Recorded, "state must not regress");
    }

    #[test]
    fn missing_frames_union_across_cameras() {
        let mut shot = Shot::new(Uuid::new_v4(), "take1", false);
        shot.missing_frames.insert("A".into(), BTreeSet::from([103]));
        shot.missing_frames.insert("B".into(), BTreeSet::new());
        assert_eq!(shot.all_missing_frames(), BTreeSet::from([103]));
    }

    #[test]
    fn job_resolves_only_when_every_frame_completed() {
        let mut job = Job::new(Uuid::new_v4(), "job1", (0, 2), crate::submission::SubmitParams::default());
        job.cache.task_states.insert(0, TaskState::Completed);
        job.cache.task_states.insert(1, TaskState::Completed);
        job.cache.task_states.insert(2, TaskState::Rendering);
        job.recompute_resolved_state();
        assert_eq!(job.state, JobState::Created);

        job.cache.task_states.insert(2, TaskState::Completed);
        job.recompute_resolved_state();
        assert_eq!(job.state, JobState::Resolved);
    }
}
