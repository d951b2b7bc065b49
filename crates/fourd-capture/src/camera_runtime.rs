// crates/fourd-capture/src/camera_runtime.rs
//
// Slave Camera Runtime (spec §4.D): owns one physical camera's state
// machine, its live-view path, its shot writer, and the shot-reading /
// shot-submitting services answered on the bus. Modelled after
// `velocut-media::worker::MediaWorker`, which similarly owns a mailbox, a
// worker pool, and the on-disk artifact for one unit of work — here that
// unit is a camera instead of a media clip.

use std::io::Cursor;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use image::codecs::jpeg::JpegEncoder;
use image::{ImageBuffer, ImageEncoder, Rgb};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use fourd_core::BusMessage;

use crate::bus::SlaveReportHandle;
use crate::error::{CaptureError, Result};
use crate::mailbox::Mailbox;
use crate::shot_file::{RawShotFrame, ShotFileReader, ShotFileWriter};

/// Per-camera lifecycle (spec §3): CLOSE -> STANDBY on either a live-view or
/// a recording request; STANDBY -> CAPTURING on the hardware trigger edge;
/// CAPTURING -> STANDBY at end of shot; any state -> OFFLINE on an SDK fault.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RuntimeState {
    Close,
    Standby,
    Capturing,
    Offline,
}

/// What the opaque camera SDK driver hands up per frame. The SDK itself is
/// out of scope (spec §1); this is the shape its callback would populate.
#[derive(Clone)]
pub struct RawFrame {
    pub frame_number: i64,
    pub width: u32,
    pub height: u32,
    pub rgb: Vec<u8>,
}

#[derive(Clone, Copy)]
struct LiveViewParams {
    quality: u8,
    scale_length: u32,
}

struct RecordingSlot {
    shot_id: Uuid,
    writer: ShotFileWriter,
    missing: Vec<i64>,
    first_frame: Option<i64>,
    last_frame: Option<i64>,
    size: u64,
}

/// Reference size (bytes) an existing on-disk frame is compared against
/// when deciding whether a submit can skip re-encoding it (spec §4.D,
/// `bypass_exist_size` in `encoder.py`). No default ships in the original;
/// this is a reasonable stand-in for a single JPEG frame at typical export
/// quality.
pub const DEFAULT_BYPASS_EXIST_SIZE_BYTES: u64 = 400_000;

/// Owns one camera end-to-end on the Slave side.
pub struct CameraRuntime {
    serial: String,
    shot_dir: PathBuf,
    bypass_exist_size: u64,
    state: Mutex<RuntimeState>,
    live_view: Mutex<Option<LiveViewParams>>,
    live_view_mailbox: Mailbox<RawFrame>,
    recording: Mutex<Option<RecordingSlot>>,
    reader_cache: Mutex<Option<(Uuid, Arc<ShotFileReader>)>>,
    bus: SlaveReportHandle,
    live_view_stop: Arc<AtomicBool>,
    live_view_thread: Mutex<Option<JoinHandle<()>>>,
}

impl CameraRuntime {
    pub fn new(serial: impl Into<String>, shot_dir: PathBuf, bus: SlaveReportHandle) -> Arc<Self> {
        Self::with_bypass_exist_size(serial, shot_dir, bus, DEFAULT_BYPASS_EXIST_SIZE_BYTES)
    }

    pub fn with_bypass_exist_size(serial: impl Into<String>, shot_dir: PathBuf, bus: SlaveReportHandle, bypass_exist_size: u64) -> Arc<Self> {
        let runtime = Arc::new(Self {
            serial: serial.into(),
            shot_dir,
            bypass_exist_size,
            state: Mutex::new(RuntimeState::Close),
            live_view: Mutex::new(None),
            live_view_mailbox: Mailbox::new(),
            recording: Mutex::new(None),
            reader_cache: Mutex::new(None),
            bus,
            live_view_stop: Arc::new(AtomicBool::new(false)),
            live_view_thread: Mutex::new(None),
        });
        runtime.clone().spawn_live_view_encoder();
        runtime
    }

    pub fn serial(&self) -> &str {
        &self.serial
    }

    pub fn state(&self) -> RuntimeState {
        *self.state.lock().unwrap()
    }

    fn shot_path(&self, shot_id: Uuid) -> PathBuf {
        self.shot_dir.join(format!("{}-{}.shot", self.serial, shot_id))
    }

    // --- state transitions ------------------------------------------------

    pub fn toggle_live_view(&self, on: bool, quality: u8, scale_length: u32) {
        let mut live_view = self.live_view.lock().unwrap();
        let mut state = self.state.lock().unwrap();
        if on {
            *live_view = Some(LiveViewParams { quality, scale_length });
            if *state == RuntimeState::Close {
                *state = RuntimeState::Standby;
            }
        } else {
            *live_view = None;
            if *state == RuntimeState::Standby && self.recording.lock().unwrap().is_none() {
                *state = RuntimeState::Close;
            }
        }
    }

    pub fn toggle_recording(&self, is_start: bool, shot_id: Uuid) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if is_start {
            let writer = ShotFileWriter::create(&self.shot_path(shot_id))?;
            *self.recording.lock().unwrap() = Some(RecordingSlot {
                shot_id,
                writer,
                missing: Vec::new(),
                first_frame: None,
                last_frame: None,
                size: 0,
            });
            if *state == RuntimeState::Close {
                *state = RuntimeState::Standby;
            }
            Ok(())
        } else {
            let slot = self.recording.lock().unwrap().take();
            if *state == RuntimeState::Capturing {
                *state = RuntimeState::Standby;
            }
            if self.live_view.lock().unwrap().is_none() && *state == RuntimeState::Standby {
                *state = RuntimeState::Close;
            }
            drop(state);
            if let Some(mut slot) = slot {
                slot.writer.flush()?;
                let range = (
                    slot.first_frame.unwrap_or(0),
                    slot.last_frame.unwrap_or(-1),
                );
                self.bus.send(BusMessage::RecordReport {
                    camera_id: self.serial.clone(),
                    shot_id: slot.shot_id,
                    missing: slot.missing,
                    range,
                    size: slot.size,
                });
            }
            Ok(())
        }
    }

    pub fn on_trigger_edge(&self) {
        let mut state = self.state.lock().unwrap();
        if *state == RuntimeState::Standby {
            *state = RuntimeState::Capturing;
        }
    }

    pub fn end_of_shot(&self) {
        let mut state = self.state.lock().unwrap();
        if *state == RuntimeState::Capturing {
            *state = RuntimeState::Standby;
        }
    }

    pub fn mark_offline(&self, text: impl Into<String>, require_restart: bool) {
        *self.state.lock().unwrap() = RuntimeState::Offline;
        self.bus.send(BusMessage::SlaveError {
            slave_name: self.bus.name().to_string(),
            text: text.into(),
            require_restart,
        });
    }

    // --- data path ----------------------------------------------------

    /// Called from the camera SDK's frame callback. Always refreshes the
    /// live-view slot (newest-wins, regardless of recording state); appends
    /// to the shot file only while CAPTURING.
    pub fn on_raw_frame(&self, frame: RawFrame) -> Result<()> {
        self.live_view_mailbox.publish(frame.clone());

        if self.state() != RuntimeState::Capturing {
            return Ok(());
        }

        let mut recording = self.recording.lock().unwrap();
        let Some(slot) = recording.as_mut() else {
            return Ok(());
        };

        let payload = RawShotFrame { width: frame.width, height: frame.height, rgb: frame.rgb };
        let payload_len = payload.rgb.len() as u64;
        if let Err(err) = slot.writer.append_frame(frame.frame_number, &payload) {
            warn!(camera = %self.serial, frame = frame.frame_number, %err, "dropping frame, shot write failed");
            slot.missing.push(frame.frame_number);
            return Ok(());
        }
        slot.size += payload_len;
        slot.first_frame = Some(slot.first_frame.map_or(frame.frame_number, |f| f.min(frame.frame_number)));
        slot.last_frame = Some(slot.last_frame.map_or(frame.frame_number, |f| f.max(frame.frame_number)));
        Ok(())
    }

    fn spawn_live_view_encoder(self: Arc<Self>) {
        let stop = Arc::clone(&self.live_view_stop);
        let mailbox = self.live_view_mailbox.clone();
        let runtime = Arc::clone(&self);
        let handle = thread::spawn(move || {
            while !stop.load(Ordering::Relaxed) {
                let frame = mailbox.take_blocking();
                let Some(params) = *runtime.live_view.lock().unwrap() else {
                    continue;
                };
                match encode_jpeg(&frame, params.quality, params.scale_length) {
                    Ok(jpeg) => {
                        runtime.bus.send(BusMessage::LiveViewImage {
                            camera_id: runtime.serial.clone(),
                            jpeg,
                        });
                    }
                    Err(err) => {
                        error!(camera = %runtime.serial, %err, "live-view encode failed");
                    }
                }
            }
        });
        *self.live_view_thread.lock().unwrap() = Some(handle);
    }

    pub fn shutdown(&self) {
        self.live_view_stop.store(true, Ordering::Relaxed);
        // Wake the encoder thread up so it observes the stop flag instead
        // of blocking on take_blocking() forever.
        self.live_view_mailbox.publish(RawFrame { frame_number: -1, width: 1, height: 1, rgb: vec![0] });
        if let Some(handle) = self.live_view_thread.lock().unwrap().take() {
            let _ = handle.join();
        }
    }

    // --- shot loader (GET_SHOT_IMAGE) ----------------------------------

    fn reader_for(&self, shot_id: Uuid) -> Result<Arc<ShotFileReader>> {
        let mut cache = self.reader_cache.lock().unwrap();
        if let Some((cached_id, reader)) = cache.as_ref() {
            if *cached_id == shot_id {
                return Ok(Arc::clone(reader));
            }
        }
        let reader = Arc::new(ShotFileReader::open(&self.shot_path(shot_id))?);
        *cache = Some((shot_id, Arc::clone(&reader)));
        Ok(reader)
    }

    pub fn get_shot_image(&self, shot_id: Uuid, frame: i64, quality: u8, scale_length: u32) -> Result<Vec<u8>> {
        let reader = self.reader_for(shot_id)?;
        let raw = reader
            .read_frame(frame)?
            .ok_or_else(|| CaptureError::ResourceMissing(format!("frame {} absent from shot {}", frame, shot_id)))?;
        let raw_frame = RawFrame { frame_number: frame, width: raw.width, height: raw.height, rgb: raw.rgb };
        encode_jpeg(&raw_frame, quality, scale_length)
    }

    // --- submitter (SUBMIT_SHOT) ----------------------------------------

    /// Iterates the requested frame range, skipping frames whose
    /// destination already exists within ±40% of `bypass_exist_size`
    /// (spec §4.D), and emits one SUBMIT_REPORT after every frame attempted.
    pub fn submit_shot(&self, shot_id: Uuid, job_name: &str, frame_range: (i64, i64), dest_dir: &std::path::Path, quality: u8) -> Result<()> {
        let reader = self.reader_for(shot_id)?;
        std::fs::create_dir_all(dest_dir)?;

        let (start, end) = frame_range;
        let total = (end - start + 1).max(0) as u64;
        let mut done = 0u64;

        for frame in start..=end {
            let dest = dest_dir.join(format!("{}_{:06}.jpg", self.serial, frame));

            if let Ok(meta) = std::fs::metadata(&dest) {
                if within_bypass_band(meta.len(), self.bypass_exist_size) {
                    done += 1;
                    self.report_submit_progress(shot_id, job_name, done, total);
                    continue;
                }
            }

            match reader.read_frame(frame)? {
                Some(raw) => {
                    let raw_frame = RawFrame { frame_number: frame, width: raw.width, height: raw.height, rgb: raw.rgb };
                    let jpeg = encode_jpeg(&raw_frame, quality, 0)?;
                    std::fs::write(&dest, &jpeg)?;
                }
                None => {
                    debug!(camera = %self.serial, frame, "frame missing, skipping during submit");
                }
            }
            done += 1;
            self.report_submit_progress(shot_id, job_name, done, total);
        }
        Ok(())
    }

    fn report_submit_progress(&self, shot_id: Uuid, job_name: &str, done: u64, total: u64) {
        self.bus.send(BusMessage::SubmitReport {
            camera_id: self.serial.clone(),
            shot_id,
            job_name: job_name.to_string(),
            done,
            total,
        });
    }
}

/// A destination file is skipped if `bypass_exist_size / existing_size`
/// falls strictly between 0.6 and 1.4, mirroring `encoder.py`'s
/// `size_ratio = setting.bypass_exist_size / exist_size`.
fn within_bypass_band(existing_size: u64, bypass_exist_size: u64) -> bool {
    if existing_size == 0 {
        return false;
    }
    let size_ratio = bypass_exist_size as f64 / existing_size as f64;
    size_ratio > 0.6 && size_ratio < 1.4
}

fn encode_jpeg(frame: &RawFrame, quality: u8, scale_length: u32) -> Result<Vec<u8>> {
    let buffer: ImageBuffer<Rgb<u8>, _> = ImageBuffer::from_raw(frame.width, frame.height, frame.rgb.clone())
        .ok_or_else(|| CaptureError::ProtocolViolation("raw frame buffer size does not match its dimensions".into()))?;

    let scaled = if scale_length > 0 {
        let longest = frame.width.max(frame.height);
        if longest > scale_length {
            let ratio = scale_length as f32 / longest as f32;
            let new_w = ((frame.width as f32) * ratio).round().max(1.0) as u32;
            let new_h = ((frame.height as f32) * ratio).round().max(1.0) as u32;
            image::imageops::resize(&buffer, new_w, new_h, image::imageops::FilterType::Triangle)
        } else {
            buffer
        }
    } else {
        buffer
    };

    let mut out = Vec::new();
    let encoder = JpegEncoder::new_with_quality(Cursor::new(&mut out), quality.clamp(1, 100));
    encoder
        .write_image(scaled.as_raw(), scaled.width(), scaled.height(), image::ExtendedColorType::Rgb8)
        .map_err(|err| CaptureError::ProtocolViolation(format!("jpeg encode failed: {err}")))?;
    Ok(out)
}
