// crates/fourd-cli/src/slave_runtime.rs
//
// The Slave-side boot sequence shared by `fourd-master` (which embeds every
// configured slave in-process, see bin/fourd_master.rs) and `fourd-slave`
// (which runs exactly one, against a loopback bus): enumerate the cameras
// this slave owns, then hand off to the Supervisor's message loop.

use std::path::PathBuf;
use std::time::Duration;

use tracing::{info, warn};

use fourd_capture::{camera_driver_from_env, SlaveBus, Supervisor};

const ENUMERATION_RETRY_INTERVAL: Duration = Duration::from_secs(2);
const ENUMERATION_MAX_ATTEMPTS: u32 = 10;

pub fn run_slave(bus: SlaveBus, shot_dir: PathBuf, expected_cameras: &[String]) -> i32 {
    let name = bus.name().to_string();
    let supervisor = Supervisor::new(name.clone(), bus, shot_dir);

    let driver = camera_driver_from_env();
    let still_missing = supervisor.enumerate_cameras(driver.as_ref(), expected_cameras, ENUMERATION_RETRY_INTERVAL, ENUMERATION_MAX_ATTEMPTS);
    if !still_missing.is_empty() {
        warn!(slave = %name, missing = ?still_missing, "starting with cameras still unopened");
    }
    info!(slave = %name, cameras = supervisor.camera_serials().len(), "slave ready");

    supervisor.run()
}
