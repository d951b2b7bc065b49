// crates/fourd-capture/src/shot_file.rs
//
// The per-camera, per-shot on-disk container (spec §4.D: "opaque per-camera
// container, one file per shot, indexed by frame number"). Format is our own
// choice since the spec only constrains the behaviour around it: a sequence
// of `[frame_number: i64][len: u32][raw RGB bytes]` records, written
// append-only by the one owning writer (spec §5 shared-resource policy).
//
// Readers build an index once on open and cache it; concurrent readers of
// the same file share one handle behind a mutex — the DESIGN NOTES §9 open
// question about cached-vs-fresh handles is resolved here in favour of the
// shared cached handle, the cheaper option for a ring of rapidly repeated
// `GET_SHOT_IMAGE` requests while scrubbing (see DESIGN.md).

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::{CaptureError, Result};

const RECORD_HEADER_LEN: u64 = 12; // i64 frame_number + u32 len

pub struct RawShotFrame {
    pub width: u32,
    pub height: u32,
    pub rgb: Vec<u8>,
}

impl RawShotFrame {
    fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(8 + self.rgb.len());
        out.extend_from_slice(&self.width.to_le_bytes());
        out.extend_from_slice(&self.height.to_le_bytes());
        out.extend_from_slice(&self.rgb);
        out
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < 8 {
            return Err(CaptureError::ProtocolViolation("shot frame record shorter than its dimension prefix".into()));
        }
        let width = u32::from_le_bytes(bytes[0..4].try_into().unwrap());
        let height = u32::from_le_bytes(bytes[4..8].try_into().unwrap());
        Ok(Self { width, height, rgb: bytes[8..].to_vec() })
    }
}

pub struct ShotFileWriter {
    file: File,
    offset: u64,
}

impl ShotFileWriter {
    pub fn create(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).write(true).truncate(true).open(path)?;
        Ok(Self { file, offset: 0 })
    }

    /// Append one frame. The caller is the single writer for this file
    /// (the owning camera's runtime) so no locking is needed here.
    pub fn append_frame(&mut self, frame_number: i64, frame: &RawShotFrame) -> Result<()> {
        let payload = frame.encode();
        self.file.write_all(&frame_number.to_le_bytes())?;
        self.file.write_all(&(payload.len() as u32).to_le_bytes())?;
        self.file.write_all(&payload)?;
        self.offset += RECORD_HEADER_LEN + payload.len() as u64;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        Ok(self.file.flush()?)
    }
}

pub struct ShotFileReader {
    path: PathBuf,
    handle: Mutex<File>,
    index: BTreeMap<i64, (u64, u32)>,
}

impl ShotFileReader {
    pub fn open(path: &Path) -> Result<Self> {
        let mut file = OpenOptions::new().read(true).open(path)?;
        let mut index = BTreeMap::new();
        let mut cursor = 0u64;
        let len = file.metadata()?.len();

        while cursor + RECORD_HEADER_LEN <= len {
            file.seek(SeekFrom::Start(cursor))?;
            let mut header = [0u8; RECORD_HEADER_LEN as usize];
            file.read_exact(&mut header)?;
            let frame_number = i64::from_le_bytes(header[0..8].try_into().unwrap());
            let record_len = u32::from_le_bytes(header[8..12].try_into().unwrap());
            let data_offset = cursor + RECORD_HEADER_LEN;
            index.insert(frame_number, (data_offset, record_len));
            cursor = data_offset + record_len as u64;
        }

        Ok(Self { path: path.to_path_buf(), handle: Mutex::new(file), index })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn has_frame(&self, frame_number: i64) -> bool {
        self.index.contains_key(&frame_number)
    }

    pub fn frame_numbers(&self) -> impl Iterator<Item = i64> + '_ {
        self.index.keys().copied()
    }

    /// Returns `None` if the frame is absent — callers (the submitter, the
    /// shot loader) treat that as "missing frame", never as an error that
    /// aborts a batch (spec §4.D missing-frame policy, §7 ResourceMissing).
    pub fn read_frame(&self, frame_number: i64) -> Result<Option<RawShotFrame>> {
        let Some(&(offset, len)) = self.index.get(&frame_number) else {
            return Ok(None);
        };
        let mut guard = self.handle.lock().unwrap();
        guard.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; len as usize];
        guard.read_exact(&mut buf)?;
        Ok(Some(RawShotFrame::decode(&buf)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn writes_and_reads_frames_in_order() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("shot.bin");

        let mut writer = ShotFileWriter::create(&path).unwrap();
        for i in 0..5i64 {
            let frame = RawShotFrame { width: 4, height: 2, rgb: vec![i as u8; 8] };
            writer.append_frame(100 + i, &frame).unwrap();
        }
        writer.flush().unwrap();

        let reader = ShotFileReader::open(&path).unwrap();
        for i in 0..5i64 {
            let frame = reader.read_frame(100 + i).unwrap().unwrap();
            assert_eq!(frame.rgb, vec![i as u8; 8]);
        }
    }

    #[test]
    fn missing_frame_returns_none_not_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("shot.bin");
        let mut writer = ShotFileWriter::create(&path).unwrap();
        writer.append_frame(0, &RawShotFrame { width: 1, height: 1, rgb: vec![9] }).unwrap();
        writer.flush().unwrap();

        let reader = ShotFileReader::open(&path).unwrap();
        assert!(reader.read_frame(999).unwrap().is_none());
    }
}
