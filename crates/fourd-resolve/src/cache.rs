// crates/fourd-resolve/src/cache.rs
//
// Resolve Cache (spec §4.J): caches one compressed bundle per (job, frame)
// fingerprint. A resolution change drops everything cached at the old
// resolution rather than keeping mismatched entries around; scrub requests
// are coalesced behind a short delay so a fast drag across the timeline
// doesn't queue a render per frame it passed over, only the one it settled
// on. Compression is LZ4 (`lz4_flex`) — fast enough to run on every
// cache write without becoming the bottleneck it would be with a stronger
// codec.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use uuid::Uuid;

use crate::error::{Result, ResolveError};
use crate::pool::WorkerPool;

const SCRUB_COALESCE_DELAY: Duration = Duration::from_secs(1);

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
struct Fingerprint {
    job_id: Uuid,
    frame: i64,
}

struct CachedBundle {
    compressed: Vec<u8>,
    resolution: u32,
}

/// Picks the resolution to actually render at and whether the caller needs
/// to bicubic-resample the result to match what was asked for.
pub fn negotiate_resolution(requested: u32, available: &[u32]) -> (u32, bool) {
    if available.contains(&requested) {
        return (requested, false);
    }
    let nearest = available
        .iter()
        .min_by_key(|&&candidate| (candidate as i64 - requested as i64).abs())
        .copied()
        .unwrap_or(requested);
    (nearest, true)
}

pub struct ResolveCache {
    entries: Arc<Mutex<HashMap<Fingerprint, CachedBundle>>>,
    resolution: Arc<Mutex<Option<u32>>>,
    scrub_generation: Arc<AtomicU64>,
}

impl Default for ResolveCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ResolveCache {
    pub fn new() -> Self {
        Self { entries: Arc::new(Mutex::new(HashMap::new())), resolution: Arc::new(Mutex::new(None)), scrub_generation: Arc::new(AtomicU64::new(0)) }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops the whole cache if `resolution` differs from what's currently
    /// cached (spec §4.J: resolution-gated invalidation, no mixed-res
    /// cache).
    fn ensure_resolution(&self, resolution: u32) {
        ensure_resolution(&self.resolution, &self.entries, resolution);
    }

    /// Fetches (from cache, or via `render`) the bundle for `frame`,
    /// compressing and storing a fresh render before returning it.
    pub fn request(&self, job_id: Uuid, frame: i64, resolution: u32, render: impl FnOnce() -> Result<Vec<u8>>) -> Result<Vec<u8>> {
        self.ensure_resolution(resolution);
        let fingerprint = Fingerprint { job_id, frame };

        if let Some(bundle) = self.entries.lock().unwrap().get(&fingerprint) {
            return decompress(&bundle.compressed);
        }

        let raw = render()?;
        let compressed = lz4_flex::compress_prepend_size(&raw);
        self.entries.lock().unwrap().insert(fingerprint, CachedBundle { compressed, resolution });
        Ok(raw)
    }

    /// Renders the entire job's frame range in parallel across `pool`,
    /// populating the cache; does not return the bytes, only the count of
    /// frames actually rendered (cache hits aren't counted).
    pub fn cache_whole_job(
        &self,
        pool: &WorkerPool,
        job_id: Uuid,
        frame_range: (i64, i64),
        resolution: u32,
        render: impl Fn(i64) -> Result<Vec<u8>> + Send + Sync + 'static,
    ) -> usize {
        self.ensure_resolution(resolution);
        let render = Arc::new(render);

        let handles: Vec<_> = (frame_range.0..=frame_range.1)
            .filter(|frame| !self.entries.lock().unwrap().contains_key(&Fingerprint { job_id, frame: *frame }))
            .map(|frame| {
                let render = Arc::clone(&render);
                pool.submit(move || (frame, render(frame)))
            })
            .collect();

        let mut rendered = 0;
        for handle in handles {
            if let Some((frame, Ok(raw))) = handle.join() {
                let compressed = lz4_flex::compress_prepend_size(&raw);
                self.entries.lock().unwrap().insert(Fingerprint { job_id, frame }, CachedBundle { compressed, resolution });
                rendered += 1;
            }
        }
        rendered
    }

    /// Schedules `render` to happen only if no newer scrub request
    /// supersedes it within the coalescing delay (spec §4.J). Re-checks the
    /// resolution right before rendering, so a resolution change that lands
    /// mid-scrub still invalidates the stale cache before this entry is
    /// written into it.
    pub fn request_scrub(&self, pool: &WorkerPool, job_id: Uuid, frame: i64, resolution: u32, render: impl FnOnce() -> Result<Vec<u8>> + Send + 'static) {
        let generation = self.scrub_generation.fetch_add(1, Ordering::Relaxed) + 1;
        let tracker = Arc::clone(&self.scrub_generation);
        let entries = Arc::clone(&self.entries);
        let resolution_state = Arc::clone(&self.resolution);
        pool.submit(move || {
            std::thread::sleep(SCRUB_COALESCE_DELAY);
            if tracker.load(Ordering::Relaxed) != generation {
                return; // superseded by a later scrub request
            }
            ensure_resolution(&resolution_state, &entries, resolution);
            if let Ok(raw) = render() {
                let compressed = lz4_flex::compress_prepend_size(&raw);
                entries.lock().unwrap().insert(Fingerprint { job_id, frame }, CachedBundle { compressed, resolution });
            }
        });
    }
}

fn ensure_resolution(resolution_state: &Mutex<Option<u32>>, entries: &Mutex<HashMap<Fingerprint, CachedBundle>>, resolution: u32) {
    let mut current = resolution_state.lock().unwrap();
    if *current != Some(resolution) {
        entries.lock().unwrap().clear();
        *current = Some(resolution);
    }
}

fn decompress(compressed: &[u8]) -> Result<Vec<u8>> {
    lz4_flex::decompress_size_prepended(compressed).map_err(|e| ResolveError::MalformedCacheEntry(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negotiate_resolution_prefers_exact_match() {
        assert_eq!(negotiate_resolution(2048, &[1024, 2048, 4096]), (2048, false));
    }

    #[test]
    fn negotiate_resolution_falls_back_to_nearest_and_flags_resample() {
        assert_eq!(negotiate_resolution(3000, &[1024, 2048, 4096]), (4096, true));
    }

    #[test]
    fn request_caches_after_first_render() {
        let cache = ResolveCache::new();
        let calls = Arc::new(AtomicU64::new(0));
        let job_id = Uuid::new_v4();

        for _ in 0..3 {
            let calls = Arc::clone(&calls);
            let bytes = cache
                .request(job_id, 0, 2048, move || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(vec![1, 2, 3])
                })
                .unwrap();
            assert_eq!(bytes, vec![1, 2, 3]);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn resolution_change_drops_the_whole_cache() {
        let cache = ResolveCache::new();
        let job_id = Uuid::new_v4();
        cache.request(job_id, 0, 2048, || Ok(vec![9])).unwrap();
        assert_eq!(cache.len(), 1);

        cache.request(job_id, 0, 4096, || Ok(vec![9])).unwrap();
        assert_eq!(cache.len(), 1, "old-resolution entry should have been dropped, not kept alongside");
    }

    #[test]
    fn scrub_requests_coalesce_to_only_the_last_one() {
        let cache = ResolveCache::new();
        let pool = WorkerPool::new(2);
        let job_id = Uuid::new_v4();
        let rendered = Arc::new(Mutex::new(Vec::new()));

        for frame in 0..5i64 {
            let rendered = Arc::clone(&rendered);
            cache.request_scrub(&pool, job_id, frame, 2048, move || {
                rendered.lock().unwrap().push(frame);
                Ok(vec![frame as u8])
            });
        }

        std::thread::sleep(Duration::from_millis(1300));
        assert_eq!(*rendered.lock().unwrap(), vec![4], "only the last scrub request should have actually rendered");
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn scrub_drops_stale_resolution_entries_before_writing_its_own() {
        let cache = ResolveCache::new();
        let pool = WorkerPool::new(2);
        let job_id = Uuid::new_v4();

        cache.request(job_id, 0, 2048, || Ok(vec![1])).unwrap();
        assert_eq!(cache.len(), 1);

        cache.request_scrub(&pool, job_id, 1, 4096, || Ok(vec![2]));
        std::thread::sleep(Duration::from_millis(1300));

        assert_eq!(cache.len(), 1, "the 2048 entry must be dropped, not kept alongside the 4096 scrub result");
        let bytes = cache.request(job_id, 1, 4096, || panic!("should already be cached by the scrub")).unwrap();
        assert_eq!(bytes, vec![2]);
    }

    #[test]
    fn cache_whole_job_skips_frames_already_cached() {
        let cache = ResolveCache::new();
        let pool = WorkerPool::new(4);
        let job_id = Uuid::new_v4();
        cache.request(job_id, 0, 2048, || Ok(vec![0])).unwrap();

        let rendered = cache.cache_whole_job(&pool, job_id, (0, 3), 2048, |frame| Ok(vec![frame as u8]));
        assert_eq!(rendered, 3); // frames 1, 2, 3 — frame 0 was already cached
        assert_eq!(cache.len(), 4);
    }
}
