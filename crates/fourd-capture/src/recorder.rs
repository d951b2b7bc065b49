// crates/fourd-capture/src/recorder.rs
//
// Shot Recorder & Report Aggregator (spec §4.G): drives TOGGLE_RECORDING
// across every expected camera and folds their RECORD_REPORTs into one
// Shot — missing frames unioned (well, intersected into the confirmed
// range and unioned for misses), sizes summed, frame range taken as the
// intersection of what every camera actually captured. Also tracks
// SUBMIT_REPORT as it streams in so a caller can show overall submit
// progress instead of per-camera noise.

use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use tracing::warn;
use uuid::Uuid;

use fourd_core::{BusMessage, Shot, ShotState};

use crate::bus::MasterBus;
use crate::error::{CaptureError, Result};

pub struct ShotRecorder<'a> {
    bus: &'a MasterBus,
    expected_cameras: Vec<String>,
}

impl<'a> ShotRecorder<'a> {
    pub fn new(bus: &'a MasterBus, expected_cameras: Vec<String>) -> Self {
        Self { bus, expected_cameras }
    }

    pub fn start(&self, shot_id: Uuid) {
        self.bus.broadcast(BusMessage::ToggleRecording { is_start: true, shot_id });
    }

    /// Broadcasts the stop directive, then blocks collecting one
    /// RECORD_REPORT per expected camera, folding each into `shot`. Returns
    /// an error if not every camera reports within `timeout` — the caller
    /// decides whether a partial Shot is still usable.
    pub fn stop_and_aggregate(&self, shot: &mut Shot, timeout: Duration) -> Result<()> {
        self.bus.broadcast(BusMessage::ToggleRecording { is_start: false, shot_id: shot.id });

        let mut pending: BTreeSet<String> = self.expected_cameras.iter().cloned().collect();
        let mut range_lo: Option<i64> = None;
        let mut range_hi: Option<i64> = None;
        let deadline = Instant::now() + timeout;

        while !pending.is_empty() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            let Some(envelope) = self.bus.recv_timeout(remaining) else {
                break;
            };
            let BusMessage::RecordReport { camera_id, shot_id, missing, range, size } = envelope.message else {
                continue;
            };
            if shot_id != shot.id || !pending.remove(&camera_id) {
                continue;
            }

            shot.missing_frames.insert(camera_id, missing.into_iter().collect());
            shot.total_size += size;
            range_lo = Some(range_lo.map_or(range.0, |lo: i64| lo.max(range.0)));
            range_hi = Some(range_hi.map_or(range.1, |hi: i64| hi.min(range.1)));
        }

        if !pending.is_empty() {
            warn!(shot = %shot.id, missing_cameras = ?pending, "not every camera reported before the deadline");
        }

        if let (Some(lo), Some(hi)) = (range_lo, range_hi) {
            shot.frame_range = Some((lo, hi));
        }
        shot.advance_state(ShotState::Recorded);

        if pending.is_empty() {
            Ok(())
        } else {
            Err(CaptureError::ProtocolViolation(format!("{} camera(s) never reported", pending.len())))
        }
    }
}

/// Folds a stream of SUBMIT_REPORT messages for one shot into an overall
/// done/total count across every reporting camera.
#[derive(Default)]
pub struct SubmitProgress {
    per_camera: std::collections::HashMap<String, (u64, u64)>,
}

impl SubmitProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, camera_id: &str, done: u64, total: u64) {
        self.per_camera.insert(camera_id.to_string(), (done, total));
    }

    pub fn done(&self) -> u64 {
        self.per_camera.values().map(|(done, _)| done).sum()
    }

    pub fn total(&self) -> u64 {
        self.per_camera.values().map(|(_, total)| total).sum()
    }

    pub fn fraction(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            0.0
        } else {
            self.done() as f64 / total as f64
        }
    }

    pub fn is_complete(&self) -> bool {
        let total = self.total();
        total > 0 && self.done() >= total
    }
}
