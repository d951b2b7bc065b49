// crates/fourd-core/src/frame_record.rs
//
// Per-frame geometry+texture container (spec §4.B, wire shape in §6):
//
//   offset  size   field
//     0      4   point_count        (u32 LE)
//     4      4   pos_size           (u32 LE)  — deflate-compressed length
//     8      4   uv_size            (u32 LE)  — deflate-compressed length
//    12   pos_size  positions       (deflate of point_count * 3 f32)
//    12+P uv_size   uvs             (deflate of point_count * 2 f32)
//    ...    rest     texture        (JPEG, remainder of file — opaque bytes)
//
// Positions/UVs are raw little-endian f32 triplets/pairs before compression;
// the texture is treated as an opaque byte blob (JPEG encode/decode is the
// external collaborator's job per spec.md Non-goals — we never decode it).

use std::io::{Read, Write};

use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;

use crate::error::{Error, Result};

const HEADER_LEN: usize = 12;

#[derive(Clone, Debug, PartialEq)]
pub struct FrameRecord {
    pub positions: Vec<[f32; 3]>,
    pub uvs: Vec<[f32; 2]>,
    pub texture: Vec<u8>,
}

impl FrameRecord {
    pub fn new(positions: Vec<[f32; 3]>, uvs: Vec<[f32; 2]>, texture: Vec<u8>) -> Result<Self> {
        if positions.len() != uvs.len() {
            return Err(Error::MalformedFrameRecord(format!(
                "position count {} != uv count {}",
                positions.len(),
                uvs.len()
            )));
        }
        Ok(Self { positions, uvs, texture })
    }

    pub fn point_count(&self) -> u32 {
        self.positions.len() as u32
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        let pos_raw = flatten_f32(self.positions.iter().flat_map(|p| p.iter().copied()));
        let uv_raw = flatten_f32(self.uvs.iter().flat_map(|p| p.iter().copied()));

        let pos_compressed = deflate(&pos_raw)?;
        let uv_compressed = deflate(&uv_raw)?;

        let mut out = Vec::with_capacity(HEADER_LEN + pos_compressed.len() + uv_compressed.len() + self.texture.len());
        out.extend_from_slice(&self.point_count().to_le_bytes());
        out.extend_from_slice(&(pos_compressed.len() as u32).to_le_bytes());
        out.extend_from_slice(&(uv_compressed.len() as u32).to_le_bytes());
        out.extend_from_slice(&pos_compressed);
        out.extend_from_slice(&uv_compressed);
        out.extend_from_slice(&self.texture);
        Ok(out)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(Error::MalformedFrameRecord("file shorter than header".into()));
        }
        let point_count = u32::from_le_bytes(bytes[0..4].try_into().unwrap()) as usize;
        let pos_size = u32::from_le_bytes(bytes[4..8].try_into().unwrap()) as usize;
        let uv_size = u32::from_le_bytes(bytes[8..12].try_into().unwrap()) as usize;

        let pos_start = HEADER_LEN;
        let uv_start = pos_start + pos_size;
        let tex_start = uv_start + uv_size;
        if bytes.len() < tex_start {
            return Err(Error::MalformedFrameRecord(
                "declared pos/uv sizes exceed file length".into(),
            ));
        }

        let positions_raw = inflate(&bytes[pos_start..uv_start])?;
        let uvs_raw = inflate(&bytes[uv_start..tex_start])?;

        if positions_raw.len() != point_count * 3 * 4 {
            return Err(Error::MalformedFrameRecord(format!(
                "decompressed position bytes {} != expected {}",
                positions_raw.len(),
                point_count * 3 * 4
            )));
        }
        if uvs_raw.len() != point_count * 2 * 4 {
            return Err(Error::MalformedFrameRecord(format!(
                "decompressed uv bytes {} != expected {}",
                uvs_raw.len(),
                point_count * 2 * 4
            )));
        }

        let positions = unflatten_f32(&positions_raw)
            .chunks_exact(3)
            .map(|c| [c[0], c[1], c[2]])
            .collect();
        let uvs = unflatten_f32(&uvs_raw)
            .chunks_exact(2)
            .map(|c| [c[0], c[1]])
            .collect();

        Ok(Self {
            positions,
            uvs,
            texture: bytes[tex_start..].to_vec(),
        })
    }
}

fn flatten_f32(values: impl Iterator<Item = f32>) -> Vec<u8> {
    let mut out = Vec::new();
    for v in values {
        out.extend_from_slice(&v.to_le_bytes());
    }
    out
}

fn unflatten_f32(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes(c.try_into().unwrap()))
        .collect()
}

fn deflate(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

fn inflate(data: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = DeflateDecoder::new(data);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    Ok(out)
}
