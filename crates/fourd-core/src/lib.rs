// crates/fourd-core/src/lib.rs
//
// Pure data types shared across the capture control plane: the Camera/
// Shot/Job entity model, Message Bus payloads, and the two binary container
// codecs (Frame Record, Roll). No threads, no sockets, no filesystem access
// beyond what the codecs need to turn bytes into structs and back.

pub mod camera;
pub mod entity;
pub mod error;
pub mod frame_record;
pub mod message;
pub mod roll;
pub mod submission;

pub use camera::{Camera, CameraState, CameraStatus};
pub use entity::{EntityEvent, EntityKind, EntityRef, EventKind, Job, JobCacheProgress, JobState, Project, Shot, ShotCacheProgress, ShotState, TaskState};
pub use error::{Error, Result};
pub use frame_record::FrameRecord;
pub use message::{BusMessage, Envelope, MessageKind};
pub use roll::{Roll, RollFrameInput, RollHeader, RollPositions};
pub use submission::{Stage, SubmitOrder, SubmitParams, SubmissionSheet};
