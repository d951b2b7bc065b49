// crates/fourd-farm/src/database.rs
//
// Ties the three per-kind EntityStores together the way `database.py`'s
// `ProjectEntity`/`ShotEntity`/`JobEntity` share one Mongo collection and
// walk `get_parent()`/`_jobs` to cascade a remove: a Shot's remove() first
// removes every Job under it, a Project's remove() first removes every Shot
// under it, and each level also deletes its own on-disk folder
// (`shutil.rmtree(self.get_folder_path())` in the original).
//
// Cross-kind cascading can't live inside a single `EntityStore<T>` — each
// instance only ever indexes children of its own kind (Job rows keyed by
// shot_id, Shot rows keyed by project_id) — so this is the explicit,
// caller-driven helper that walks all three.

use std::path::{Path, PathBuf};

use uuid::Uuid;

use fourd_core::{Job, Project, Shot};

use crate::store::EntityStore;

/// Owns the whole entity tree for one submit root and knows how to cascade
/// a remove across Project -> Shot -> Job, deleting each level's on-disk
/// folder as it goes (spec §3, §4.H).
pub struct ProjectDatabase {
    root: PathBuf,
    pub projects: EntityStore<Project>,
    pub shots: EntityStore<Shot>,
    pub jobs: EntityStore<Job>,
}

impl ProjectDatabase {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into(), projects: EntityStore::new(), shots: EntityStore::new(), jobs: EntityStore::new() }
    }

    pub fn project_folder(&self, project: &Project) -> PathBuf {
        self.root.join(&project.name)
    }

    pub fn shot_folder(&self, project: &Project, shot: &Shot) -> PathBuf {
        self.project_folder(project).join(&shot.name)
    }

    pub fn job_folder(&self, project: &Project, shot: &Shot, job: &Job) -> PathBuf {
        self.shot_folder(project, shot).join("jobs").join(&job.name)
    }

    /// Removes a Job and its output folder. Returns `false` if the job
    /// doesn't exist.
    pub fn remove_job(&self, job_id: Uuid) -> bool {
        let Some(job) = self.jobs.get(job_id) else {
            return false;
        };
        let ancestors = self.shots.get(job.shot_id).and_then(|shot| self.projects.get(shot.project_id).map(|project| (project, shot)));
        match ancestors {
            Some((project, shot)) => self.jobs.remove_with_folder(job_id, |job| self.job_folder(&project, &shot, job)),
            None => self.jobs.remove(job_id),
        }
    }

    /// Removes a Shot, cascading to every Job under it first, then deletes
    /// the shot's own folder (spec §3 cascading-remove invariant).
    pub fn remove_shot(&self, shot_id: Uuid) -> bool {
        let Some(shot) = self.shots.get(shot_id) else {
            return false;
        };
        for job_id in self.jobs.children_of(shot_id) {
            self.remove_job(job_id);
        }
        match self.projects.get(shot.project_id) {
            Some(project) => self.shots.remove_with_folder(shot_id, |shot| self.shot_folder(&project, shot)),
            None => self.shots.remove(shot_id),
        }
    }

    /// Removes a Project, cascading to every Shot (and transitively every
    /// Job) under it first, then deletes the project's own folder.
    pub fn remove_project(&self, project_id: Uuid) -> bool {
        if !self.projects.contains(project_id) {
            return false;
        }
        for shot_id in self.shots.children_of(project_id) {
            self.remove_shot(shot_id);
        }
        self.projects.remove_with_folder(project_id, |project| self.project_folder(project))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fourd_core::SubmitParams;
    use tempfile::tempdir;

    fn seeded(root: &Path) -> (ProjectDatabase, Uuid, Uuid, Uuid) {
        let db = ProjectDatabase::new(root);
        let project = Project::new("proj-a");
        let project_id = db.projects.create(project.clone());
        let shot = Shot::new(project_id, "shot-a", false);
        let shot_id = db.shots.create(shot.clone());
        let job = Job::new(shot_id, "job-a", (0, 9), SubmitParams::default());
        let job_id = db.jobs.create(job.clone());

        std::fs::create_dir_all(db.job_folder(&project, &shot, &job)).unwrap();
        (db, project_id, shot_id, job_id)
    }

    #[test]
    fn removing_a_shot_cascades_to_its_jobs_and_deletes_both_folders() {
        let dir = tempdir().unwrap();
        let (db, project_id, shot_id, job_id) = seeded(dir.path());
        let project = db.projects.get(project_id).unwrap();
        let shot = db.shots.get(shot_id).unwrap();
        let job = db.jobs.get(job_id).unwrap();
        let job_folder = db.job_folder(&project, &shot, &job);
        let shot_folder = db.shot_folder(&project, &shot);
        assert!(job_folder.exists());

        assert!(db.remove_shot(shot_id));

        assert!(!db.shots.contains(shot_id));
        assert!(!db.jobs.contains(job_id), "removing a shot must cascade to its jobs");
        assert!(!job_folder.exists(), "job folder must be deleted");
        assert!(!shot_folder.exists(), "shot folder must be deleted");
    }

    #[test]
    fn removing_a_project_cascades_through_shot_into_job() {
        let dir = tempdir().unwrap();
        let (db, project_id, shot_id, job_id) = seeded(dir.path());

        assert!(db.remove_project(project_id));

        assert!(!db.projects.contains(project_id));
        assert!(!db.shots.contains(shot_id));
        assert!(!db.jobs.contains(job_id));
    }

    #[test]
    fn removing_an_unknown_shot_is_a_no_op() {
        let dir = tempdir().unwrap();
        let db = ProjectDatabase::new(dir.path());
        assert!(!db.remove_shot(Uuid::new_v4()));
    }
}
