// crates/fourd-capture/src/supervisor.rs
//
// Slave Supervisor (spec §4.E): owns the per-process set of CameraRuntimes,
// enumerates them against the expected topology with a factory-reset retry
// loop, and routes bus directives to the camera(s) they name. Process exit
// on MASTER_DOWN or a SLAVE_RESTART naming this slave uses the same
// exit-code-as-signal idiom the teacher's worker pool uses for cancellation
// (`velocut-media::worker`'s cancel flag, generalized here to a process exit
// code because the Supervisor *is* the process).

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{info, warn};

use fourd_core::BusMessage;

use crate::bus::SlaveBus;
use crate::camera_runtime::CameraRuntime;

/// Exit code the Slave process returns when told to restart, either because
/// the Master went down or because it was named directly in SLAVE_RESTART
/// (spec §4.E, §7).
pub const EXIT_RESTART_REQUESTED: i32 = 4813;

/// Abstraction over the camera SDK's enumeration call, kept opaque the same
/// way the farm driver and the SDK itself are opaque elsewhere (spec §1).
pub trait CameraDriver: Send + Sync {
    fn try_open(&self, serial: &str) -> bool;
}

/// Shells out to an external SDK helper tool, the same pattern used for the
/// photogrammetry engine and the audio trimmer (spec §1's opaque
/// collaborators): nothing real to embed, so a subprocess is the seam.
pub struct CommandLineCameraDriver {
    pub binary: std::path::PathBuf,
}

impl CameraDriver for CommandLineCameraDriver {
    fn try_open(&self, serial: &str) -> bool {
        std::process::Command::new(&self.binary)
            .arg("try-open")
            .arg(serial)
            .status()
            .map(|status| status.success())
            .unwrap_or(false)
    }
}

/// Used where no SDK helper is configured: every camera stays unopened
/// rather than silently pretending to find hardware that isn't there.
pub struct NoCameraDriver;

impl CameraDriver for NoCameraDriver {
    fn try_open(&self, _serial: &str) -> bool {
        false
    }
}

pub fn camera_driver_from_env() -> Box<dyn CameraDriver> {
    match std::env::var_os("FOURD_CAMERA_SDK_BIN") {
        Some(binary) => Box::new(CommandLineCameraDriver { binary: binary.into() }),
        None => Box::new(NoCameraDriver),
    }
}

pub struct Supervisor {
    name: String,
    bus: SlaveBus,
    shot_dir: PathBuf,
    cameras: Mutex<HashMap<String, Arc<CameraRuntime>>>,
}

impl Supervisor {
    pub fn new(name: impl Into<String>, bus: SlaveBus, shot_dir: PathBuf) -> Self {
        Self { name: name.into(), bus, shot_dir, cameras: Mutex::new(HashMap::new()) }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Factory-reset retry loop: repeatedly calls the driver for every
    /// serial not yet open, sleeping `retry_interval` between sweeps, until
    /// every expected camera answers or `max_attempts` sweeps are spent.
    /// Successfully opened cameras get a live `CameraRuntime` registered.
    pub fn enumerate_cameras(
        &self,
        driver: &dyn CameraDriver,
        expected_serials: &[String],
        retry_interval: Duration,
        max_attempts: u32,
    ) -> Vec<String> {
        let mut pending: Vec<String> = expected_serials.to_vec();

        for attempt in 0..max_attempts {
            if pending.is_empty() {
                break;
            }
            if attempt > 0 {
                std::thread::sleep(retry_interval);
            }
            let mut still_pending = Vec::new();
            for serial in pending {
                if driver.try_open(&serial) {
                    self.register_camera(&serial);
                } else {
                    still_pending.push(serial);
                }
            }
            if !still_pending.is_empty() {
                warn!(slave = %self.name, remaining = still_pending.len(), attempt, "camera enumeration retry");
            }
            pending = still_pending;
        }

        pending
    }

    fn register_camera(&self, serial: &str) {
        info!(slave = %self.name, camera = serial, "camera online");
        let runtime = CameraRuntime::new(serial, self.shot_dir.clone(), self.bus.report_handle());
        self.cameras.lock().unwrap().insert(serial.to_string(), runtime);
    }

    pub fn camera(&self, serial: &str) -> Option<Arc<CameraRuntime>> {
        self.cameras.lock().unwrap().get(serial).cloned()
    }

    pub fn camera_serials(&self) -> Vec<String> {
        self.cameras.lock().unwrap().keys().cloned().collect()
    }

    /// Drives the message loop until told to exit; returns the process exit
    /// code (0 for a clean shutdown that wasn't requested by the bus).
    pub fn run(&self) -> i32 {
        loop {
            let Some(envelope) = self.bus.recv() else {
                return 0;
            };
            match envelope.message {
                BusMessage::MasterDown => {
                    warn!(slave = %self.name, "master down, restarting");
                    return EXIT_RESTART_REQUESTED;
                }
                BusMessage::SlaveRestart { slave_name } if slave_name == self.name => {
                    warn!(slave = %self.name, "restart requested");
                    return EXIT_RESTART_REQUESTED;
                }
                BusMessage::SlaveRestart { .. } => {
                    // Addressed to a different slave sharing the same bus in tests; ignore.
                }
                BusMessage::ToggleLiveView { camera_ids, quality, scale_length } => {
                    for camera in self.cameras_matching(&camera_ids) {
                        camera.toggle_live_view(true, quality, scale_length);
                    }
                }
                BusMessage::ToggleRecording { is_start, shot_id } => {
                    for camera in self.cameras.lock().unwrap().values() {
                        if let Err(err) = camera.toggle_recording(is_start, shot_id) {
                            warn!(camera = camera.serial(), %err, "toggle_recording failed");
                        }
                    }
                }
                BusMessage::GetShotImage { camera_id, shot_id, frame, quality, scale_length } => {
                    if let Some(camera) = self.camera(&camera_id) {
                        match camera.get_shot_image(shot_id, frame, quality, scale_length) {
                            Ok(jpeg) => self.bus.send(BusMessage::ShotImage { camera_id, shot_id, frame, jpeg }),
                            Err(err) => warn!(camera = %camera_id, %err, "get_shot_image failed"),
                        }
                    }
                }
                BusMessage::SubmitShot { shot_id, job_name, frame_range, .. } => {
                    for camera in self.cameras.lock().unwrap().values() {
                        let dest = self.shot_dir.join("submit").join(&job_name);
                        if let Err(err) = camera.submit_shot(shot_id, &job_name, frame_range, &dest, 90) {
                            warn!(camera = camera.serial(), %err, "submit_shot failed");
                        }
                    }
                }
                BusMessage::Retrigger => {
                    for camera in self.cameras.lock().unwrap().values() {
                        camera.on_trigger_edge();
                    }
                }
                other => {
                    info!(slave = %self.name, kind = ?other.kind(), "unhandled directive");
                }
            }
        }
    }

    fn cameras_matching(&self, ids: &[String]) -> Vec<Arc<CameraRuntime>> {
        let cameras = self.cameras.lock().unwrap();
        if ids.is_empty() {
            return cameras.values().cloned().collect();
        }
        ids.iter().filter_map(|id| cameras.get(id).cloned()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::MasterBus;
    use tempfile::tempdir;

    struct FlakyDriver {
        attempts_needed: usize,
        seen: Mutex<HashMap<String, usize>>,
    }

    impl CameraDriver for FlakyDriver {
        fn try_open(&self, serial: &str) -> bool {
            let mut seen = self.seen.lock().unwrap();
            let count = seen.entry(serial.to_string()).or_insert(0);
            *count += 1;
            *count >= self.attempts_needed
        }
    }

    #[test]
    fn enumeration_retries_until_every_camera_answers() {
        let dir = tempdir().unwrap();
        let master = MasterBus::new();
        let slave_bus = master.connect_slave("slave-1");
        let supervisor = Supervisor::new("slave-1", slave_bus, dir.path().to_path_buf());

        let driver = FlakyDriver { attempts_needed: 2, seen: Mutex::new(HashMap::new()) };
        let expected = vec!["A".to_string(), "B".to_string()];
        let still_missing = supervisor.enumerate_cameras(&driver, &expected, Duration::from_millis(1), 5);

        assert!(still_missing.is_empty());
        assert_eq!(supervisor.camera_serials().len(), 2);
    }

    #[test]
    fn enumeration_gives_up_after_max_attempts() {
        let dir = tempdir().unwrap();
        let master = MasterBus::new();
        let slave_bus = master.connect_slave("slave-1");
        let supervisor = Supervisor::new("slave-1", slave_bus, dir.path().to_path_buf());

        let driver = FlakyDriver { attempts_needed: 100, seen: Mutex::new(HashMap::new()) };
        let expected = vec!["A".to_string()];
        let still_missing = supervisor.enumerate_cameras(&driver, &expected, Duration::from_millis(1), 3);

        assert_eq!(still_missing, vec!["A".to_string()]);
    }

    #[test]
    fn master_down_returns_restart_exit_code() {
        let dir = tempdir().unwrap();
        let master = MasterBus::new();
        let slave_bus = master.connect_slave("slave-1");
        let supervisor = Supervisor::new("slave-1", slave_bus, dir.path().to_path_buf());

        master.broadcast(BusMessage::MasterDown);
        assert_eq!(supervisor.run(), EXIT_RESTART_REQUESTED);
    }

    #[test]
    fn restart_addressed_to_another_slave_is_ignored() {
        let dir = tempdir().unwrap();
        let master = MasterBus::new();
        let slave_bus = master.connect_slave("slave-1");
        let supervisor = Supervisor::new("slave-1", slave_bus, dir.path().to_path_buf());

        master.send_to("slave-1", BusMessage::SlaveRestart { slave_name: "slave-2".into() });
        master.send_to("slave-1", BusMessage::MasterDown);
        assert_eq!(supervisor.run(), EXIT_RESTART_REQUESTED);
    }
}
