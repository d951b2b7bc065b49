// crates/fourd-core/src/roll.rs
//
// Packed multi-frame archive (spec §4.C, wire shape in §6). We implement the
// header-at-head layout (DESIGN NOTES §9's resolved open question — see
// DESIGN.md): magic, header_size, header JSON, then payload.
//
//   0   4   magic = "4DR1"
//   4   4   header_size (u32 LE)
//   8   N   header_json (UTF-8 JSON, exactly header_size bytes)
//   ...     concatenated frame blobs + optional audio blob
//
// Each frame blob is `u32 geo_size || geo_size bytes of geometry || JPEG`.
// Position values in the header are byte offsets into the payload region,
// i.e. relative to file offset `8 + header_size`.

use std::io::{Read, Write};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub const MAGIC: &[u8; 4] = b"4DR1";
pub const VERSION: &str = "1";

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RollPositions {
    /// Length = frame_count + 1.
    pub frame_buffer_positions: Vec<u64>,
    /// 0 or frame_count + 1.
    #[serde(default)]
    pub hd_frame_buffer_positions: Vec<u64>,
    /// 0 or 2.
    #[serde(default)]
    pub audio_buffer_positions: Vec<u64>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RollHeader {
    pub name: String,
    pub id: String,
    pub frame_count: u32,
    #[serde(default = "default_fps")]
    pub fps: u32,
    #[serde(default = "default_geometry_format")]
    pub geometry_format: String,
    #[serde(default = "default_texture_format")]
    pub texture_format: String,
    #[serde(default = "default_audio_format")]
    pub audio_format: String,
    #[serde(default = "default_texture_resolutions")]
    pub texture_resolutions: Vec<u32>,
    pub positions: RollPositions,
    #[serde(default = "default_version")]
    pub version: String,
}

fn default_fps() -> u32 { 30 }
fn default_geometry_format() -> String { "OPAQUE".into() }
fn default_texture_format() -> String { "JPEG".into() }
fn default_audio_format() -> String { "NULL".into() }
fn default_texture_resolutions() -> Vec<u32> { vec![2048, 4096] }
fn default_version() -> String { VERSION.into() }

impl RollHeader {
    fn validate(&self) -> Result<()> {
        if self.version != VERSION {
            return Err(Error::MalformedRoll(format!(
                "unsupported roll version {:?}, expected {:?} (old header-at-tail rolls are rejected)",
                self.version, VERSION
            )));
        }
        let expected = self.frame_count as usize + 1;
        if self.positions.frame_buffer_positions.len() != expected {
            return Err(Error::MalformedRoll(format!(
                "frame_count {} implies {} positions, found {}",
                self.frame_count,
                expected,
                self.positions.frame_buffer_positions.len()
            )));
        }
        if !self.positions.hd_frame_buffer_positions.is_empty()
            && self.positions.hd_frame_buffer_positions.len() != expected
        {
            return Err(Error::MalformedRoll("hd_frame_buffer_positions length mismatch".into()));
        }
        if !self.positions.audio_buffer_positions.is_empty()
            && self.positions.audio_buffer_positions.len() != 2
        {
            return Err(Error::MalformedRoll("audio_buffer_positions must have length 2".into()));
        }
        if !is_strictly_increasing(&self.positions.frame_buffer_positions) {
            return Err(Error::MalformedRoll("frame_buffer_positions not strictly increasing".into()));
        }
        Ok(())
    }
}

fn is_strictly_increasing(values: &[u64]) -> bool {
    values.windows(2).all(|w| w[0] < w[1])
}

/// One frame's raw contribution before packing: opaque geometry bytes (e.g.
/// a compressed mesh produced upstream) plus a JPEG texture.
pub struct RollFrameInput {
    pub geometry: Vec<u8>,
    pub jpeg: Vec<u8>,
}

pub struct Roll {
    pub header: RollHeader,
    /// Absolute byte offset of the start of the payload region.
    payload_start: u64,
    bytes: Vec<u8>,
}

impl Roll {
    /// Pack `frames` (in frame order) and an optional audio blob into a
    /// roll container. Mirrors `fourdrec_roll.roll.FourdrecRoll.pack` from
    /// the original implementation, adapted to the header-at-head layout.
    pub fn pack(name: &str, id: &str, fps: u32, frames: &[RollFrameInput], audio: Option<&[u8]>) -> Result<Vec<u8>> {
        if frames.is_empty() {
            return Err(Error::MalformedRoll("cannot pack a roll with zero frames".into()));
        }

        let mut payload = Vec::new();
        let mut frame_positions = Vec::with_capacity(frames.len() + 1);
        frame_positions.push(0u64);
        for frame in frames {
            payload.extend_from_slice(&(frame.geometry.len() as u32).to_le_bytes());
            payload.extend_from_slice(&frame.geometry);
            payload.extend_from_slice(&frame.jpeg);
            frame_positions.push(payload.len() as u64);
        }

        let mut audio_positions = Vec::new();
        if let Some(audio_bytes) = audio {
            audio_positions.push(payload.len() as u64);
            payload.extend_from_slice(audio_bytes);
            audio_positions.push(payload.len() as u64);
        }

        let header = RollHeader {
            name: name.to_string(),
            id: id.to_string(),
            frame_count: frames.len() as u32,
            fps,
            geometry_format: default_geometry_format(),
            texture_format: default_texture_format(),
            audio_format: if audio.is_some() { "WAV".into() } else { "NULL".into() },
            texture_resolutions: default_texture_resolutions(),
            positions: RollPositions {
                frame_buffer_positions: frame_positions,
                hd_frame_buffer_positions: Vec::new(),
                audio_buffer_positions: audio_positions,
            },
            version: VERSION.into(),
        };
        header.validate()?;

        let header_json = serde_json::to_vec(&header)?;
        let mut out = Vec::with_capacity(8 + header_json.len() + payload.len());
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&(header_json.len() as u32).to_le_bytes());
        out.extend_from_slice(&header_json);
        out.extend_from_slice(&payload);
        Ok(out)
    }

    /// Parse a roll container already read fully into memory.
    pub fn read(bytes: Vec<u8>) -> Result<Self> {
        if bytes.len() < 8 || &bytes[0..4] != MAGIC {
            return Err(Error::MalformedRoll("bad magic (not a 4DR1 roll)".into()));
        }
        let header_size = u32::from_le_bytes(bytes[4..8].try_into().unwrap()) as usize;
        let json_start = 8;
        let json_end = json_start + header_size;
        if bytes.len() < json_end {
            return Err(Error::MalformedRoll("header_size exceeds file length".into()));
        }
        let header: RollHeader = serde_json::from_slice(&bytes[json_start..json_end])?;
        header.validate()?;

        let payload_start = json_end as u64;
        let payload_len = bytes.len() as u64 - payload_start;
        if let Some(&last) = header.positions.frame_buffer_positions.last() {
            if header.positions.audio_buffer_positions.is_empty() && last != payload_len {
                return Err(Error::MalformedRoll(format!(
                    "last frame position {} != payload length {}",
                    last, payload_len
                )));
            }
        }
        if let [_, end] = header.positions.audio_buffer_positions[..] {
            if end != payload_len {
                return Err(Error::MalformedRoll("audio end position != payload length".into()));
            }
        }

        Ok(Self { header, payload_start, bytes })
    }

    pub fn from_reader(mut reader: impl Read) -> Result<Self> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        Self::read(bytes)
    }

    pub fn write_to(&self, mut writer: impl Write) -> Result<()> {
        writer.write_all(&self.bytes)?;
        Ok(())
    }

    /// Recover the (geometry, jpeg) pair for `frame_number`, exactly as packed.
    pub fn get_frame(&self, frame_number: usize) -> Result<(Vec<u8>, Vec<u8>)> {
        let positions = &self.header.positions.frame_buffer_positions;
        if frame_number + 1 >= positions.len() {
            return Err(Error::ResourceMissing(format!("frame {frame_number} not found in roll")));
        }
        let start = self.payload_start + positions[frame_number];
        let end = self.payload_start + positions[frame_number + 1];
        let blob = &self.bytes[start as usize..end as usize];

        if blob.len() < 4 {
            return Err(Error::MalformedRoll("frame blob shorter than its geo_size prefix".into()));
        }
        let geo_size = u32::from_le_bytes(blob[0..4].try_into().unwrap()) as usize;
        if blob.len() < 4 + geo_size {
            return Err(Error::MalformedRoll("frame blob geo_size exceeds blob length".into()));
        }
        let geometry = blob[4..4 + geo_size].to_vec();
        let jpeg = blob[4 + geo_size..].to_vec();
        Ok((geometry, jpeg))
    }

    pub fn frame_count(&self) -> u32 {
        self.header.frame_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(geo: &[u8], jpg: &[u8]) -> RollFrameInput {
        RollFrameInput { geometry: geo.to_vec(), jpeg: jpg.to_vec() }
    }

    #[test]
    fn round_trips_three_frames_no_audio() {
        let frames = vec![
            frame(&vec![0u8; 100], &vec![1u8; 200]),
            frame(&vec![2u8; 120], &vec![3u8; 180]),
            frame(&vec![4u8; 90], &vec![5u8; 220]),
        ];
        let packed = Roll::pack("take1", "id-1", 30, &frames, None).unwrap();
        let roll = Roll::read(packed).unwrap();

        assert_eq!(roll.frame_count(), 3);
        assert_eq!(roll.header.positions.frame_buffer_positions.len(), 4);

        let (geo, jpg) = roll.get_frame(1).unwrap();
        assert_eq!(geo.len(), 120);
        assert_eq!(jpg.len(), 180);
        assert_eq!(geo, vec![2u8; 120]);
        assert_eq!(jpg, vec![3u8; 180]);
    }

    #[test]
    fn positions_strictly_increasing_and_last_equals_payload_len() {
        let frames = vec![frame(&[1, 2, 3], &[4, 5]), frame(&[6], &[7, 8, 9])];
        let packed = Roll::pack("t", "id", 24, &frames, None).unwrap();
        let roll = Roll::read(packed).unwrap();
        let positions = &roll.header.positions.frame_buffer_positions;
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn round_trip_with_audio() {
        let frames = vec![frame(&[1, 2], &[3, 4])];
        let audio = vec![9u8; 64];
        let packed = Roll::pack("t", "id", 30, &frames, Some(&audio)).unwrap();
        let roll = Roll::read(packed).unwrap();
        assert_eq!(roll.header.positions.audio_buffer_positions.len(), 2);
        assert_eq!(roll.header.audio_format, "WAV");
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = vec![b'X', b'X', b'X', b'X'];
        bytes.extend_from_slice(&0u32.to_le_bytes());
        assert!(Roll::read(bytes).is_err());
    }

    #[test]
    fn rejects_non_current_version() {
        let frames = vec![frame(&[1], &[2])];
        let packed = Roll::pack("t", "id", 30, &frames, None).unwrap();
        let mut roll = Roll::read(packed.clone()).unwrap();
        roll.header.version = "0".into();
        assert!(roll.header.validate().is_err());
    }

    #[test]
    fn get_frame_out_of_range_is_resource_missing() {
        let frames = vec![frame(&[1], &[2])];
        let packed = Roll::pack("t", "id", 30, &frames, None).unwrap();
        let roll = Roll::read(packed).unwrap();
        assert!(matches!(roll.get_frame(5), Err(Error::ResourceMissing(_))));
    }
}
