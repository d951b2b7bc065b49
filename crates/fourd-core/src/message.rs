// crates/fourd-core/src/message.rs
//
// Message Bus payload types (spec §4.A). These are the typed DTOs carried
// over fourd_capture::bus; this module only defines shapes, not transport.
// Each variant maps 1:1 onto a wire "kind"; MessageKind is used to enforce
// the per-(sender, kind) ordering guarantee (spec §5) without constraining
// cross-kind ordering.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::camera::CameraStatus;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageKind {
    MasterUp,
    MasterDown,
    SlaveDown,
    SlaveError,
    SlaveRestart,
    ToggleLiveView,
    LiveViewImage,
    ToggleRecording,
    RecordReport,
    GetShotImage,
    ShotImage,
    SubmitShot,
    SubmitReport,
    CameraStatus,
    CameraParm,
    Retrigger,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum BusMessage {
    MasterUp,
    MasterDown,
    SlaveDown { slave_name: String },
    SlaveError { slave_name: String, text: String, require_restart: bool },
    SlaveRestart { slave_name: String },

    ToggleLiveView { camera_ids: Vec<String>, quality: u8, scale_length: u32 },
    LiveViewImage { camera_id: String, jpeg: Vec<u8> },

    ToggleRecording { is_start: bool, shot_id: Uuid },
    RecordReport {
        camera_id: String,
        shot_id: Uuid,
        missing: Vec<i64>,
        range: (i64, i64),
        size: u64,
    },

    GetShotImage { camera_id: String, shot_id: Uuid, frame: i64, quality: u8, scale_length: u32 },
    ShotImage { camera_id: String, shot_id: Uuid, frame: i64, jpeg: Vec<u8> },

    SubmitShot {
        shot_id: Uuid,
        job_name: String,
        frame_range: (i64, i64),
        is_calibration: bool,
    },
    SubmitReport {
        camera_id: String,
        shot_id: Uuid,
        job_name: String,
        done: u64,
        total: u64,
    },

    CameraStatus { camera_id: String, status: CameraStatus },
    CameraParm { name: String, value: String },
    Retrigger,
}

impl BusMessage {
    pub fn kind(&self) -> MessageKind {
        match self {
            BusMessage::MasterUp => MessageKind::MasterUp,
            BusMessage::MasterDown => MessageKind::MasterDown,
            BusMessage::SlaveDown { .. } => MessageKind::SlaveDown,
            BusMessage::SlaveError { .. } => MessageKind::SlaveError,
            BusMessage::SlaveRestart { .. } => MessageKind::SlaveRestart,
            BusMessage::ToggleLiveView { .. } => MessageKind::ToggleLiveView,
            BusMessage::LiveViewImage { .. } => MessageKind::LiveViewImage,
            BusMessage::ToggleRecording { .. } => MessageKind::ToggleRecording,
            BusMessage::RecordReport { .. } => MessageKind::RecordReport,
            BusMessage::GetShotImage { .. } => MessageKind::GetShotImage,
            BusMessage::ShotImage { .. } => MessageKind::ShotImage,
            BusMessage::SubmitShot { .. } => MessageKind::SubmitShot,
            BusMessage::SubmitReport { .. } => MessageKind::SubmitReport,
            BusMessage::CameraStatus { .. } => MessageKind::CameraStatus,
            BusMessage::CameraParm { .. } => MessageKind::CameraParm,
            BusMessage::Retrigger => MessageKind::Retrigger,
        }
    }

    /// `require_restart=true` SLAVE_ERROR is a request the Master must honour
    /// by sending SLAVE_RESTART back (spec §4.A failure semantics).
    pub fn requires_restart(&self) -> bool {
        matches!(self, BusMessage::SlaveError { require_restart: true, .. })
    }
}

/// Envelope wrapping a BusMessage with its sender, used for ordering and
/// for routing replies (spec §4.A: "ordered per (sender, kind) pair").
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Envelope {
    pub sender: String,
    pub message: BusMessage,
}

impl Envelope {
    pub fn new(sender: impl Into<String>, message: BusMessage) -> Self {
        Self { sender: sender.into(), message }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slave_error_with_require_restart_is_flagged() {
        let msg = BusMessage::SlaveError {
            slave_name: "slave-1".into(),
            text: "sdk fault".into(),
            require_restart: true,
        };
        assert!(msg.requires_restart());
        assert_eq!(msg.kind(), MessageKind::SlaveError);
    }
}
