// Raw sample streams
// Interleaved multi-dimensional sample buffers as delivered by sensors and file readers

use serde::{Deserialize, Serialize};

/// Primitive type of one stream value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleType {
    U8,
    I16,
    I32,
    F32,
    F64,
}

impl SampleType {
    /// Size of one value in bytes
    pub fn byte_width(&self) -> usize {
        match self {
            SampleType::U8 => 1,
            SampleType::I16 => 2,
            SampleType::I32 | SampleType::F32 => 4,
            SampleType::F64 => 8,
        }
    }
}

/// A block of `num` frames with `dim` values each, stored frame by frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stream {
    /// Number of frames
    pub num: usize,

    /// Values per frame
    pub dim: usize,

    /// Value type, determines the byte width
    pub sample_type: SampleType,

    /// Frames per second
    pub sample_rate: f64,

    /// Raw little-endian values, `num * dim * byte_width` bytes
    pub data: Vec<u8>,
}

impl Stream {
    /// Create a zero-filled stream
    pub fn new(num: usize, dim: usize, sample_type: SampleType, sample_rate: f64) -> Self {
        Stream {
            num,
            dim,
            sample_type,
            sample_rate,
            data: vec![0; num * dim * sample_type.byte_width()],
        }
    }

    /// Create a float stream from interleaved values
    pub fn from_f32(values: &[f32], dim: usize, sample_rate: f64) -> Self {
        let dim = dim.max(1);
        let num = values.len() / dim;
        let data = values[..num * dim]
            .iter()
            .flat_map(|v| v.to_le_bytes())
            .collect();

        Stream {
            num,
            dim,
            sample_type: SampleType::F32,
            sample_rate,
            data,
        }
    }

    /// Size of one value in bytes
    pub fn byte_width(&self) -> usize {
        self.sample_type.byte_width()
    }

    /// Size of one frame in bytes
    pub fn frame_bytes(&self) -> usize {
        self.dim * self.byte_width()
    }

    /// Duration in seconds
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate > 0.0 {
            self.num as f64 / self.sample_rate
        } else {
            0.0
        }
    }

    /// Raw bytes of the frames `from..=to`
    pub fn frames(&self, from: usize, to: usize) -> Option<&[u8]> {
        if from > to || to >= self.num {
            return None;
        }
        let n = self.frame_bytes();
        self.data.get(from * n..(to + 1) * n)
    }

    /// Copy of the frames `from..=to` as a new stream
    pub fn copy_range(&self, from: usize, to: usize) -> Option<Stream> {
        let data = self.frames(from, to)?.to_vec();
        Some(Stream {
            num: to - from + 1,
            dim: self.dim,
            sample_type: self.sample_type,
            sample_rate: self.sample_rate,
            data,
        })
    }

    /// Decode all values of a float stream, interleaved
    pub fn to_f32(&self) -> Option<Vec<f32>> {
        if self.sample_type != SampleType::F32 {
            return None;
        }
        Some(
            self.data
                .chunks_exact(4)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                .collect(),
        )
    }

    /// Value `d` of frame `i` of a float stream
    pub fn value_f32(&self, i: usize, d: usize) -> Option<f32> {
        if self.sample_type != SampleType::F32 || i >= self.num || d >= self.dim {
            return None;
        }
        let offset = (i * self.dim + d) * 4;
        let b = self.data.get(offset..offset + 4)?;
        Some(f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }
}
