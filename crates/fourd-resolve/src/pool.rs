// crates/fourd-resolve/src/pool.rs
//
// Generic worker pool: a job queue shared by N worker threads, plus a
// per-submission result handle. Grounded on two corpus patterns at once —
// the shared job/result channel pair of `SebaB29-RoomRTC`'s
// `CameraThreadPool`, and the per-job cancel flag from
// `velocut-media::worker::MediaWorker` (`encode_cancels`), generalized here
// into a `CancelToken` any submitted closure can poll.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};

type Task = Box<dyn FnOnce() + Send>;

pub struct WorkerPool {
    job_tx: Sender<Task>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn new(num_threads: usize) -> Self {
        let (job_tx, job_rx) = unbounded::<Task>();
        let job_rx = Arc::new(Mutex::new(job_rx));

        let workers = (0..num_threads.max(1))
            .map(|_| {
                let job_rx = Arc::clone(&job_rx);
                thread::spawn(move || loop {
                    let task = { job_rx.lock().unwrap().recv() };
                    match task {
                        Ok(task) => task(),
                        Err(_) => return,
                    }
                })
            })
            .collect();

        Self { job_tx, workers }
    }

    pub fn thread_count(&self) -> usize {
        self.workers.len()
    }

    /// Queues `work`, returning a handle that blocks until it's done.
    pub fn submit<T, F>(&self, work: F) -> JobHandle<T>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let (result_tx, result_rx) = bounded(1);
        let task: Task = Box::new(move || {
            let _ = result_tx.send(work());
        });
        let _ = self.job_tx.send(task);
        JobHandle { rx: result_rx }
    }

    /// Like `submit`, but `work` is handed a token it can poll to stop
    /// early (spec §4.J cache resolution-change invalidation uses this to
    /// abandon a pre-cache pass when the viewer's resolution changes).
    pub fn submit_cancellable<T, F>(&self, work: F) -> (JobHandle<T>, CancelToken)
    where
        T: Send + 'static,
        F: FnOnce(CancelToken) -> T + Send + 'static,
    {
        let token = CancelToken::new();
        let worker_token = token.clone();
        let handle = self.submit(move || work(worker_token));
        (handle, token)
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // Dropping job_tx's clones (there's only the one) closes the
        // channel; workers see Err on recv and exit their loop.
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

pub struct JobHandle<T> {
    rx: Receiver<T>,
}

impl<T> JobHandle<T> {
    pub fn join(self) -> Option<T> {
        self.rx.recv().ok()
    }

    pub fn try_join(&self) -> Option<T> {
        self.rx.try_recv().ok()
    }
}

/// Waits for every handle, in submission order, regardless of which
/// finished first underneath — used wherever output order matters (the
/// .abc export path, spec §4.K).
pub fn join_all<T>(handles: Vec<JobHandle<T>>) -> Vec<Option<T>> {
    handles.into_iter().map(JobHandle::join).collect()
}

/// Drains results as they complete rather than in submission order — used
/// for the parallel .obj/.4dh export path where order doesn't matter.
pub fn as_completed<T: Send + 'static>(handles: Vec<JobHandle<T>>) -> Receiver<T> {
    let (tx, rx) = unbounded();
    for handle in handles {
        let tx = tx.clone();
        thread::spawn(move || {
            if let Some(value) = handle.join() {
                let _ = tx.send(value);
            }
        });
    }
    rx
}

#[derive(Clone)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    fn new() -> Self {
        Self { flag: Arc::new(AtomicBool::new(false)) }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn submit_runs_work_on_a_worker_thread_and_returns_result() {
        let pool = WorkerPool::new(2);
        let handle = pool.submit(|| 2 + 2);
        assert_eq!(handle.join(), Some(4));
    }

    #[test]
    fn join_all_preserves_submission_order() {
        let pool = WorkerPool::new(4);
        let handles: Vec<_> = (0..8)
            .map(|i| {
                pool.submit(move || {
                    std::thread::sleep(Duration::from_millis((8 - i) as u64));
                    i
                })
            })
            .collect();
        let results = join_all(handles);
        let expected: Vec<Option<i32>> = (0..8).map(Some).collect();
        assert_eq!(results, expected);
    }

    #[test]
    fn cancel_token_observed_by_submitted_work() {
        let pool = WorkerPool::new(1);
        let (handle, token) = pool.submit_cancellable(|token| {
            while !token.is_cancelled() {
                std::thread::sleep(Duration::from_millis(1));
            }
            "stopped"
        });
        std::thread::sleep(Duration::from_millis(5));
        token.cancel();
        assert_eq!(handle.join(), Some("stopped"));
    }
}
