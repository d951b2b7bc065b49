// crates/fourd-farm/src/poller.rs
//
// Task poller (spec §4.I step 4 / §4.H): every `tick` interval (60s in
// production, configurable for tests) asks the farm driver for the batch's
// current per-frame task states, folds them into the Job's cache, and
// emits a PROGRESS event. Stops when the job resolves, when the job is
// deleted out from under it, or when asked to from outside — checked only
// at tick boundaries so a poll already in flight always finishes. Mirrors
// `database.py`'s `JobEntity._update_deadline_tasks`: `task_list is None`
// means the farm deleted the batch and the repeater stops; `task_list ==
// self.task_list` means nothing changed and the tick is a no-op.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};
use uuid::Uuid;

use fourd_core::{Job, JobState, TaskState};

use crate::error::Result;
use crate::store::EntityStore;

pub trait TaskStatePoll: Send + Sync {
    /// Returns `None` if the farm has deleted the batch out from under us;
    /// otherwise `Some` with the latest state for every frame the batch
    /// currently knows about.
    fn poll_task_states(&self, job_id: Uuid, batch_id: &str) -> Result<Option<Vec<(i64, TaskState)>>>;
}

const STOP_CHECK_INTERVAL: Duration = Duration::from_millis(50);

pub struct JobPoller {
    store: Arc<EntityStore<Job>>,
    driver: Arc<dyn TaskStatePoll>,
    stop: Arc<AtomicBool>,
}

impl JobPoller {
    pub fn new(store: Arc<EntityStore<Job>>, driver: Arc<dyn TaskStatePoll>) -> Self {
        Self { store, driver, stop: Arc::new(AtomicBool::new(false)) }
    }

    pub fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    /// One poll-and-fold pass. Returns `true` if the poller should stop
    /// (the job resolved, the farm deleted the batch, or the job vanished
    /// from the store).
    pub fn run_once(&self, job_id: Uuid) -> Result<bool> {
        let Some(job) = self.store.get(job_id) else {
            debug!(job = %job_id, "job deleted, stopping poll");
            return Ok(true);
        };

        let Some(batch_id) = job.batch_ids.last().cloned() else {
            return Ok(false);
        };

        let Some(states) = self.driver.poll_task_states(job_id, &batch_id)? else {
            info!(job = %job_id, batch = %batch_id, "farm deleted the batch, stopping poll");
            return Ok(true);
        };

        let incoming: BTreeMap<i64, TaskState> = states.into_iter().collect();
        if incoming == job.cache.task_states {
            return Ok(false);
        }

        self.store.update(job_id, |job| {
            for (frame, state) in incoming {
                job.cache.task_states.insert(frame, state);
                if state == TaskState::Completed {
                    job.cache.fully_cached_frames.insert(frame);
                }
            }
            job.recompute_resolved_state();
        });
        self.store.progress(job_id);

        let resolved = self.store.get(job_id).map(|j| j.state == JobState::Resolved).unwrap_or(true);
        if resolved {
            info!(job = %job_id, "job resolved, stopping poll");
        }
        Ok(resolved)
    }

    /// Blocks the calling thread, ticking until `run_once` says stop or
    /// `self.stop()` is called from another thread. Meant to be run on a
    /// dedicated worker thread, one per in-flight job.
    pub fn run(&self, job_id: Uuid, tick: Duration) -> Result<()> {
        loop {
            if self.stop.load(Ordering::Relaxed) {
                return Ok(());
            }
            if self.run_once(job_id)? {
                return Ok(());
            }
            self.sleep_checking_stop(tick);
            if self.stop.load(Ordering::Relaxed) {
                return Ok(());
            }
        }
    }

    fn sleep_checking_stop(&self, tick: Duration) {
        let mut elapsed = Duration::ZERO;
        while elapsed < tick {
            if self.stop.load(Ordering::Relaxed) {
                return;
            }
            let step = STOP_CHECK_INTERVAL.min(tick - elapsed);
            std::thread::sleep(step);
            elapsed += step;
        }
    }
}
