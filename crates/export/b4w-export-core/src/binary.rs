//! Typed little-endian binary sections of the `.bin` side-car file.
//!
//! Layout: `"B4WB"`, `i32` major, `i32` minor, then the int, float, short,
//! ushort and uchar sections back to back. Manifest entries address data by
//! `[offset, length]` counted in elements of their section.

use serde::{Deserialize, Serialize};

pub const MAGIC: &[u8; 4] = b"B4WB";
pub const HEADER_LEN: usize = 12;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BinaryBuffers {
    int: Vec<u8>,
    float: Vec<u8>,
    short: Vec<u8>,
    ushort: Vec<u8>,
    uchar: Vec<u8>,
}

/// Byte offsets of each section inside the data that follows the header.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinaryInfo {
    pub binfile: Option<String>,
    pub int: usize,
    pub float: usize,
    pub short: usize,
    pub ushort: usize,
    pub uchar: usize,
}

impl BinaryBuffers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append floats; returns `[offset, length]` in floats.
    pub fn push_f32(&mut self, values: &[f32]) -> [usize; 2] {
        let offset = self.float.len() / 4;
        for v in values {
            self.float.extend_from_slice(&v.to_le_bytes());
        }
        [offset, values.len()]
    }

    pub fn push_i32(&mut self, values: &[i32]) -> [usize; 2] {
        let offset = self.int.len() / 4;
        for v in values {
            self.int.extend_from_slice(&v.to_le_bytes());
        }
        [offset, values.len()]
    }

    pub fn push_i16(&mut self, values: &[i16]) -> [usize; 2] {
        let offset = self.short.len() / 2;
        for v in values {
            self.short.extend_from_slice(&v.to_le_bytes());
        }
        [offset, values.len()]
    }

    pub fn push_u16(&mut self, values: &[u16]) -> [usize; 2] {
        let offset = self.ushort.len() / 2;
        for v in values {
            self.ushort.extend_from_slice(&v.to_le_bytes());
        }
        [offset, values.len()]
    }

    pub fn push_u8(&mut self, values: &[u8]) -> [usize; 2] {
        let offset = self.uchar.len();
        self.uchar.extend_from_slice(values);
        [offset, values.len()]
    }

    pub fn data_len(&self) -> usize {
        self.int.len() + self.float.len() + self.short.len() + self.ushort.len() + self.uchar.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data_len() == 0
    }

    /// Section offsets; `binfile` names the side-car file when there is data.
    pub fn info(&self, binfile: Option<String>) -> BinaryInfo {
        let float = self.int.len();
        let short = float + self.float.len();
        let ushort = short + self.short.len();
        let uchar = ushort + self.ushort.len();
        BinaryInfo {
            binfile: if self.is_empty() { None } else { binfile },
            int: 0,
            float,
            short,
            ushort,
            uchar,
        }
    }

    /// Header plus all sections.
    pub fn to_blob(&self, version: (i32, i32)) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN + self.data_len());
        out.extend_from_slice(&header(version));
        for section in [&self.int, &self.float, &self.short, &self.ushort, &self.uchar] {
            out.extend_from_slice(section);
        }
        out
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

pub fn header((major, minor): (i32, i32)) -> [u8; HEADER_LEN] {
    let mut h = [0u8; HEADER_LEN];
    h[..4].copy_from_slice(MAGIC);
    h[4..8].copy_from_slice(&major.to_le_bytes());
    h[8..].copy_from_slice(&minor.to_le_bytes());
    h
}

/// Read back `len` floats at float offset `offset` of the float section.
pub fn read_f32(blob: &[u8], info: &BinaryInfo, offset: usize, len: usize) -> Option<Vec<f32>> {
    let start = HEADER_LEN + info.float + offset * 4;
    let end = start + len * 4;
    if end > HEADER_LEN + info.short {
        return None;
    }
    let bytes = blob.get(start..end)?;
    Some(
        bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect(),
    )
}
