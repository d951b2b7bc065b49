// crates/fourd-capture/src/registry.rs
//
// Master Camera Registry (spec §4.F): one CameraProxy per expected camera,
// holding the last CAMERA_STATUS reported for it and an offline deadline
// timer. Mirrors the teacher's proxy-per-resource pattern but the resource
// here is a physical camera rather than a media worker slot.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use fourd_core::{Camera, CameraState, CameraStatus};

/// One physical camera as tracked by the Master: its last known status plus
/// the deadline timer that declares it OFFLINE if nothing arrives in time.
pub struct CameraProxy {
    camera: Mutex<Camera>,
    deadline_at: Mutex<Instant>,
    offline_deadline: Duration,
}

impl CameraProxy {
    fn new(serial: impl Into<String>, offline_deadline: Duration, now: Instant) -> Self {
        Self {
            camera: Mutex::new(Camera::new(serial)),
            deadline_at: Mutex::new(now + offline_deadline),
            offline_deadline,
        }
    }

    pub fn status(&self) -> CameraStatus {
        self.camera.lock().unwrap().status
    }

    pub fn serial(&self) -> String {
        self.camera.lock().unwrap().serial.clone()
    }

    /// Apply an incoming CAMERA_STATUS. Returns `true` if it was forwarded
    /// (a real change, or the camera is CAPTURING and every frame tick must
    /// pass through regardless of whether the fields happen to repeat).
    fn apply_update(&self, status: CameraStatus, now: Instant) -> bool {
        *self.deadline_at.lock().unwrap() = now + self.offline_deadline;

        let mut camera = self.camera.lock().unwrap();
        let is_noop = status_eq(&camera.status, &status) && status.state != CameraState::Capturing;
        camera.status = status;
        !is_noop
    }

    /// True if `now` is past this camera's deadline and it isn't already
    /// marked OFFLINE.
    fn is_overdue(&self, now: Instant) -> bool {
        let still_waiting = now >= *self.deadline_at.lock().unwrap();
        still_waiting && self.camera.lock().unwrap().status.state != CameraState::Offline
    }

    /// Rewinds the deadline without touching status — used when the Master
    /// reconnects a Slave and wants to give its cameras a fresh grace period
    /// before the sweep can declare them offline again.
    fn rewind_deadline(&self, now: Instant) {
        *self.deadline_at.lock().unwrap() = now + self.offline_deadline;
    }

    fn force_offline(&self) -> CameraStatus {
        let mut camera = self.camera.lock().unwrap();
        camera.status = CameraStatus { state: CameraState::Offline, perf_bias: -1.0, current_frame: -1, record_frames_count: -1 };
        camera.status
    }
}

fn status_eq(a: &CameraStatus, b: &CameraStatus) -> bool {
    a.state == b.state
        && a.current_frame == b.current_frame
        && a.record_frames_count == b.record_frames_count
        && (a.perf_bias - b.perf_bias).abs() < f64::EPSILON
}

/// Registry of every camera the topology map expects. Pushes accepted
/// updates and synthetic offline transitions to a listener that represents
/// "the image library" (spec §4.F) — kept as a trait so tests don't need a
/// real one.
pub trait StatusSink: Send + Sync {
    fn push(&self, camera_id: &str, status: CameraStatus);
}

pub struct CameraRegistry {
    proxies: Mutex<HashMap<String, CameraProxy>>,
    offline_deadline: Duration,
}

impl CameraRegistry {
    pub fn new(expected_serials: &[String], offline_deadline: Duration, now: Instant) -> Self {
        let mut proxies = HashMap::new();
        for serial in expected_serials {
            proxies.insert(serial.clone(), CameraProxy::new(serial.clone(), offline_deadline, now));
        }
        Self { proxies: Mutex::new(proxies), offline_deadline }
    }

    pub fn on_camera_status(&self, camera_id: &str, status: CameraStatus, now: Instant, sink: &dyn StatusSink) {
        let proxies = self.proxies.lock().unwrap();
        let Some(proxy) = proxies.get(camera_id) else {
            warn!(camera = camera_id, "status from unexpected camera, ignoring");
            return;
        };
        if proxy.apply_update(status, now) {
            sink.push(camera_id, status);
        }
    }

    pub fn rewind_deadline(&self, camera_id: &str, now: Instant) {
        if let Some(proxy) = self.proxies.lock().unwrap().get(camera_id) {
            proxy.rewind_deadline(now);
        }
    }

    /// Checks every expected camera's deadline; any that are overdue get
    /// pushed a synthetic OFFLINE status. Returns the serials that flipped.
    pub fn sweep_offline(&self, now: Instant, sink: &dyn StatusSink) -> Vec<String> {
        let proxies = self.proxies.lock().unwrap();
        let mut newly_offline = Vec::new();
        for (serial, proxy) in proxies.iter() {
            if proxy.is_overdue(now) {
                let status = proxy.force_offline();
                info!(camera = serial, "camera declared offline by deadline sweep");
                sink.push(serial, status);
                newly_offline.push(serial.clone());
            }
        }
        newly_offline
    }

    pub fn snapshot(&self) -> HashMap<String, CameraStatus> {
        self.proxies.lock().unwrap().iter().map(|(k, v)| (k.clone(), v.status())).collect()
    }

    pub fn offline_deadline(&self) -> Duration {
        self.offline_deadline
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    struct RecordingSink {
        pushes: StdMutex<Vec<(String, CameraStatus)>>,
    }

    impl RecordingSink {
        fn new() -> Self {
            Self { pushes: StdMutex::new(Vec::new()) }
        }
    }

    impl StatusSink for RecordingSink {
        fn push(&self, camera_id: &str, status: CameraStatus) {
            self.pushes.lock().unwrap().push((camera_id.to_string(), status));
        }
    }

    fn standby(frame: i64) -> CameraStatus {
        CameraStatus { state: CameraState::Standby, perf_bias: 0.0, current_frame: frame, record_frames_count: 0 }
    }

    fn capturing(frame: i64) -> CameraStatus {
        CameraStatus { state: CameraState::Capturing, perf_bias: 0.0, current_frame: frame, record_frames_count: frame }
    }

    #[test]
    fn identical_standby_updates_are_suppressed_as_noop() {
        let now = Instant::now();
        let registry = CameraRegistry::new(&["CAM-1".into()], Duration::from_secs(5), now);
        let sink = RecordingSink::new();

        registry.on_camera_status("CAM-1", standby(-1), now, &sink);
        registry.on_camera_status("CAM-1", standby(-1), now, &sink);

        assert_eq!(sink.pushes.lock().unwrap().len(), 1);
    }

    #[test]
    fn identical_capturing_updates_always_pass_through() {
        let now = Instant::now();
        let registry = CameraRegistry::new(&["CAM-1".into()], Duration::from_secs(5), now);
        let sink = RecordingSink::new();

        registry.on_camera_status("CAM-1", capturing(5), now, &sink);
        registry.on_camera_status("CAM-1", capturing(5), now, &sink);

        assert_eq!(sink.pushes.lock().unwrap().len(), 2);
    }

    #[test]
    fn overdue_camera_is_pushed_synthetic_offline_once() {
        let now = Instant::now();
        let registry = CameraRegistry::new(&["CAM-1".into()], Duration::from_millis(10), now);
        let sink = RecordingSink::new();

        let later = now + Duration::from_millis(20);
        let flipped = registry.sweep_offline(later, &sink);
        assert_eq!(flipped, vec!["CAM-1".to_string()]);

        let flipped_again = registry.sweep_offline(later, &sink);
        assert!(flipped_again.is_empty(), "already-offline camera shouldn't flip twice");
        assert_eq!(sink.pushes.lock().unwrap().len(), 1);
    }

    #[test]
    fn status_from_camera_outside_topology_is_ignored() {
        let now = Instant::now();
        let registry = CameraRegistry::new(&["CAM-1".into()], Duration::from_secs(5), now);
        let sink = RecordingSink::new();
        registry.on_camera_status("CAM-GHOST", standby(0), now, &sink);
        assert!(sink.pushes.lock().unwrap().is_empty());
    }
}
