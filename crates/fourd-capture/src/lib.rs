// crates/fourd-capture/src/lib.rs
//
// Runtime halves of the capture control plane: the in-process Message Bus,
// the Slave-side camera state machine and supervisor, and the Master-side
// camera registry and shot recorder. fourd-core supplies the data; this
// crate supplies the threads, mutexes, and files that move it around.

pub mod bus;
pub mod camera_runtime;
pub mod error;
pub mod mailbox;
pub mod recorder;
pub mod registry;
pub mod shot_file;
pub mod supervisor;

pub use bus::{MasterBus, SlaveBus, SlaveReportHandle};
pub use camera_runtime::{CameraRuntime, RawFrame, RuntimeState};
pub use error::{CaptureError, Result};
pub use mailbox::Mailbox;
pub use recorder::{ShotRecorder, SubmitProgress};
pub use registry::{CameraRegistry, CameraProxy, StatusSink};
pub use shot_file::{RawShotFrame, ShotFileReader, ShotFileWriter};
pub use supervisor::{camera_driver_from_env, CameraDriver, CommandLineCameraDriver, NoCameraDriver, Supervisor, EXIT_RESTART_REQUESTED};
