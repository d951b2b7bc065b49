// crates/fourd-farm/src/store.rs
//
// Entity Store (spec §4.H): an in-memory document store keyed by Uuid with
// a secondary index on parent id for cascading REMOVE, plus a callback
// registry that drops listeners which panic or error rather than letting
// one bad subscriber wedge every future event — the same self-healing
// listener idea the teacher applies to its per-job encode cancel flags
// (`velocut-media::worker`: a stale entry is simply superseded, never left
// to jam the whole worker).

use std::collections::{HashMap, HashSet};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::warn;
use uuid::Uuid;

use fourd_core::{EntityEvent, EntityKind, EntityRef, EventKind};

/// Implemented by every entity kind the store can hold (Project, Shot, Job).
pub trait StoreEntity {
    fn id(&self) -> Uuid;
    fn parent_id(&self) -> Option<Uuid>;
    fn kind() -> EntityKind;
    /// The entity's own on-disk folder name, one path segment (spec §4.H).
    fn folder_name(&self) -> &str;
}

impl StoreEntity for fourd_core::Project {
    fn id(&self) -> Uuid {
        self.id
    }
    fn parent_id(&self) -> Option<Uuid> {
        None
    }
    fn kind() -> EntityKind {
        EntityKind::Project
    }
    fn folder_name(&self) -> &str {
        &self.name
    }
}

impl StoreEntity for fourd_core::Shot {
    fn id(&self) -> Uuid {
        self.id
    }
    fn parent_id(&self) -> Option<Uuid> {
        Some(self.project_id)
    }
    fn kind() -> EntityKind {
        EntityKind::Shot
    }
    fn folder_name(&self) -> &str {
        &self.name
    }
}

impl StoreEntity for fourd_core::Job {
    fn id(&self) -> Uuid {
        self.id
    }
    fn parent_id(&self) -> Option<Uuid> {
        Some(self.shot_id)
    }
    fn kind() -> EntityKind {
        EntityKind::Job
    }
    fn folder_name(&self) -> &str {
        &self.name
    }
}

type Callback = Box<dyn Fn(EntityEvent) -> std::result::Result<(), String> + Send + Sync>;

pub struct EntityStore<T: StoreEntity> {
    items: Mutex<HashMap<Uuid, T>>,
    children_of: Mutex<HashMap<Uuid, HashSet<Uuid>>>,
    callbacks: Mutex<HashMap<Uuid, Callback>>,
}

impl<T: StoreEntity> Default for EntityStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: StoreEntity> EntityStore<T> {
    pub fn new() -> Self {
        Self { items: Mutex::new(HashMap::new()), children_of: Mutex::new(HashMap::new()), callbacks: Mutex::new(HashMap::new()) }
    }

    pub fn create(&self, item: T) -> Uuid {
        let id = item.id();
        if let Some(parent) = item.parent_id() {
            self.children_of.lock().unwrap().entry(parent).or_default().insert(id);
        }
        self.items.lock().unwrap().insert(id, item);
        self.emit(EntityEvent { kind: EventKind::Create, entity: EntityRef { kind: T::kind(), id } });
        id
    }

    pub fn get(&self, id: Uuid) -> Option<T>
    where
        T: Clone,
    {
        self.items.lock().unwrap().get(&id).cloned()
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.items.lock().unwrap().contains_key(&id)
    }

    pub fn update(&self, id: Uuid, mutator: impl FnOnce(&mut T)) -> bool {
        let mut items = self.items.lock().unwrap();
        let Some(item) = items.get_mut(&id) else {
            return false;
        };
        mutator(item);
        drop(items);
        self.emit(EntityEvent { kind: EventKind::Modify, entity: EntityRef { kind: T::kind(), id } });
        true
    }

    pub fn progress(&self, id: Uuid) {
        if self.contains(id) {
            self.emit(EntityEvent { kind: EventKind::Progress, entity: EntityRef { kind: T::kind(), id } });
        }
    }

    /// Removes `id` and, first, every descendant reachable through
    /// `children_of` — children are removed before their parent so
    /// listeners never observe an orphan (spec §3 cascading-remove
    /// invariant). Does not touch disk; use `remove_with_folder` when the
    /// entity has a folder that needs deleting too (spec §4.H).
    pub fn remove(&self, id: Uuid) -> bool {
        if !self.contains(id) {
            return false;
        }
        for child in self.collect_descendants(id) {
            self.remove_one(child, None);
        }
        self.remove_one(id, None);
        true
    }

    /// Same cascading behaviour as `remove`, but also deletes each removed
    /// entity's on-disk folder (spec §4.H: "remove() deletes the record and
    /// its on-disk folder", grounded in `database.py`'s `remove()` methods
    /// calling `shutil.rmtree`). `folder` computes a removed entity's
    /// folder path from the entity itself, right before it's dropped.
    pub fn remove_with_folder(&self, id: Uuid, folder: impl Fn(&T) -> PathBuf) -> bool {
        if !self.contains(id) {
            return false;
        }
        let folder: &dyn Fn(&T) -> PathBuf = &folder;
        for child in self.collect_descendants(id) {
            self.remove_one(child, Some(folder));
        }
        self.remove_one(id, Some(folder));
        true
    }

    /// Direct children of `parent_id` by this store's parent index. Used by
    /// `ProjectDatabase` to cascade a remove across store kinds, since each
    /// `EntityStore<T>` only ever indexes children of its own kind.
    pub fn children_of(&self, parent_id: Uuid) -> Vec<Uuid> {
        self.children_of.lock().unwrap().get(&parent_id).cloned().unwrap_or_default().into_iter().collect()
    }

    fn collect_descendants(&self, id: Uuid) -> Vec<Uuid> {
        let mut out = Vec::new();
        let mut frontier = vec![id];
        let children_of = self.children_of.lock().unwrap();
        while let Some(current) = frontier.pop() {
            if let Some(kids) = children_of.get(&current) {
                for &kid in kids {
                    out.push(kid);
                    frontier.push(kid);
                }
            }
        }
        // Deepest-first so removing in this order never removes a parent
        // before its own child.
        out.reverse();
        out
    }

    fn remove_one(&self, id: Uuid, folder: Option<&dyn Fn(&T) -> PathBuf>) {
        let Some(item) = self.items.lock().unwrap().remove(&id) else {
            return;
        };
        if let Some(folder) = folder {
            remove_folder_if_exists(&folder(&item));
        }
        self.children_of.lock().unwrap().remove(&id);
        self.emit(EntityEvent { kind: EventKind::Remove, entity: EntityRef { kind: T::kind(), id } });
    }

    /// Registers a listener, returning an id usable with `unregister_callback`.
    pub fn register_callback(&self, callback: impl Fn(EntityEvent) -> std::result::Result<(), String> + Send + Sync + 'static) -> Uuid {
        let id = Uuid::new_v4();
        self.callbacks.lock().unwrap().insert(id, Box::new(callback));
        id
    }

    pub fn unregister_callback(&self, id: Uuid) {
        self.callbacks.lock().unwrap().remove(&id);
    }

    fn emit(&self, event: EntityEvent) {
        let mut to_drop = Vec::new();
        {
            let callbacks = self.callbacks.lock().unwrap();
            for (id, callback) in callbacks.iter() {
                let outcome = catch_unwind(AssertUnwindSafe(|| callback(event)));
                match outcome {
                    Ok(Ok(())) => {}
                    Ok(Err(text)) => {
                        warn!(callback = %id, error = %text, "entity listener errored, removing it");
                        to_drop.push(*id);
                    }
                    Err(_) => {
                        warn!(callback = %id, "entity listener panicked, removing it");
                        to_drop.push(*id);
                    }
                }
            }
        }
        if !to_drop.is_empty() {
            let mut callbacks = self.callbacks.lock().unwrap();
            for id in to_drop {
                callbacks.remove(&id);
            }
        }
    }
}

fn remove_folder_if_exists(path: &Path) {
    if !path.exists() {
        return;
    }
    if let Err(e) = std::fs::remove_dir_all(path) {
        warn!(path = %path.display(), error = %e, "failed to remove entity folder");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fourd_core::{Job, Project, Shot, SubmitParams};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn cascading_remove_deletes_children_before_parent() {
        let shots: EntityStore<Shot> = EntityStore::new();
        let project_id = Uuid::new_v4();
        let shot = Shot::new(project_id, "take1", false);
        let shot_id = shot.id;
        shots.create(shot);

        let events = Arc::new(Mutex::new(Vec::new()));
        let recorder = Arc::clone(&events);
        shots.register_callback(move |event| {
            recorder.lock().unwrap().push(event);
            Ok(())
        });

        assert!(shots.remove(shot_id));
        let recorded = events.lock().unwrap();
        assert_eq!(recorded.last().unwrap().kind, EventKind::Remove);
    }

    #[test]
    fn job_removal_cascades_from_shot() {
        let jobs: EntityStore<Job> = EntityStore::new();
        let shot_id = Uuid::new_v4();
        let job_a = Job::new(shot_id, "a", (0, 10), SubmitParams::default());
        let job_b = Job::new(shot_id, "b", (0, 10), SubmitParams::default());
        let (job_a_id, job_b_id) = (job_a.id, job_b.id);
        jobs.create(job_a);
        jobs.create(job_b);

        for child in jobs.collect_descendants(shot_id) {
            assert!(child == job_a_id || child == job_b_id);
        }
    }

    #[test]
    fn panicking_callback_is_dropped_after_first_failure() {
        let projects: EntityStore<Project> = EntityStore::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        projects.register_callback(move |_event| {
            counter.fetch_add(1, Ordering::SeqCst);
            panic!("boom");
        });

        projects.create(Project::new("p1"));
        projects.create(Project::new("p2"));

        assert_eq!(calls.load(Ordering::SeqCst), 1, "callback should be dropped after its first panic");
    }

    #[test]
    fn update_emits_modify_and_returns_false_for_unknown_id() {
        let projects: EntityStore<Project> = EntityStore::new();
        let id = projects.create(Project::new("p1"));
        assert!(projects.update(id, |p| p.name = "renamed".into()));
        assert_eq!(projects.get(id).unwrap().name, "renamed");
        assert!(!projects.update(Uuid::new_v4(), |_| {}));
    }
}
