// crates/fourd-core/src/camera.rs
//
// Camera identity and state as mirrored on both the Slave (owner) and the
// Master (one CameraProxy per physical camera, see fourd-capture::registry).
// Pure data — no threads, no timers here; the offline deadline timer lives
// on the proxy that owns a Camera (fourd-capture), matching the teacher's
// split between `media_types.rs` (plain DTOs) and `worker.rs` (runtime).

use serde::{Deserialize, Serialize};

/// A camera's lifecycle state (spec §3).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CameraState {
    Capturing,
    Standby,
    Close,
    Offline,
}

impl Default for CameraState {
    fn default() -> Self {
        CameraState::Offline
    }
}

/// Everything a `CAMERA_STATUS` message carries about one camera.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct CameraStatus {
    pub state: CameraState,
    /// Reported capture-timing bias, in seconds.
    pub perf_bias: f64,
    /// Frame currently in progress, or -1 if none.
    pub current_frame: i64,
    pub record_frames_count: i64,
}

/// A physical camera identified by its stable vendor serial.
#[derive(Clone, Debug)]
pub struct Camera {
    pub serial: String,
    pub status: CameraStatus,
}

impl Camera {
    pub fn new(serial: impl Into<String>) -> Self {
        Self {
            serial: serial.into(),
            status: CameraStatus {
                state: CameraState::Offline,
                perf_bias: -1.0,
                current_frame: -1,
                record_frames_count: -1,
            },
        }
    }

    pub fn is_offline(&self) -> bool {
        self.status.state == CameraState::Offline
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_camera_starts_offline() {
        let cam = Camera::new("SN-001");
        assert!(cam.is_offline());
        assert_eq!(cam.status.current_frame, -1);
    }
}
