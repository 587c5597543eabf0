use std::fmt;

use bytes::Bytes;
use smallvec::SmallVec;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DType {
    F32,
    F16,
    I64,
    I32,
    U8,
}

impl DType {
    /// Parses both the IR v10+ spelling (`f32`) and the legacy precision
    /// spelling used on ports (`FP32`).
    pub fn from_ir(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "f32" | "fp32" => Some(DType::F32),
            "f16" | "fp16" => Some(DType::F16),
            "i64" => Some(DType::I64),
            "i32" => Some(DType::I32),
            "u8" => Some(DType::U8),
            _ => None,
        }
    }

    pub fn byte_size(self) -> usize {
        match self {
            DType::F32 => 4,
            DType::F16 => 2,
            DType::I64 => 8,
            DType::I32 => 4,
            DType::U8 => 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DType::F32 => "f32",
            DType::F16 => "f16",
            DType::I64 => "i64",
            DType::I32 => "i32",
            DType::U8 => "u8",
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Shape(pub SmallVec<[usize; 6]>);

impl Shape {
    pub fn from_slice(d: &[usize]) -> Self {
        Self(d.iter().copied().collect())
    }
    pub fn dims(&self) -> &[usize] {
        &self.0
    }
    pub fn rank(&self) -> usize {
        self.0.len()
    }
    /// Element count; a rank-0 shape holds one element, any zero
    /// dimension makes the tensor empty.
    pub fn numel(&self) -> usize {
        self.0.iter().product()
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, d) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{d}")?;
        }
        f.write_str("]")
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TensorDesc {
    pub dtype: DType,
    pub shape: Shape,
}

/// Dense, host-resident tensor. Element bytes are little-endian.
#[derive(Clone, Debug)]
pub struct Tensor {
    pub desc: TensorDesc,
    pub data: Bytes,
}

impl Tensor {
    pub fn from_cpu_bytes(dtype: DType, shape: Shape, bytes: Bytes) -> Self {
        Self {
            desc: TensorDesc { dtype, shape },
            data: bytes,
        }
    }

    pub fn zeros(dtype: DType, shape: Shape) -> Self {
        let len = shape.numel() * dtype.byte_size();
        Self::from_cpu_bytes(dtype, shape, Bytes::from(vec![0u8; len]))
    }

    pub fn from_f32(shape: Shape, values: &[f32]) -> Self {
        let mut buf = Vec::with_capacity(values.len() * 4);
        for v in values {
            buf.extend_from_slice(&v.to_le_bytes());
        }
        Self::from_cpu_bytes(DType::F32, shape, Bytes::from(buf))
    }

    pub fn byte_len(&self) -> usize {
        self.data.len()
    }

    /// Byte length implied by dtype and shape.
    pub fn expected_byte_len(&self) -> usize {
        self.desc.shape.numel() * self.desc.dtype.byte_size()
    }

    pub fn to_f32_vec(&self) -> Option<Vec<f32>> {
        if self.desc.dtype != DType::F32 || self.data.len() % 4 != 0 {
            return None;
        }
        Some(
            self.data
                .chunks_exact(4)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                .collect(),
        )
    }
}
