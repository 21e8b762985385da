//! Scalar access into raw little-endian storage.
//!
//! Reference kernels compute in f32 regardless of the storage precision, so
//! every element goes through [`Precision::load`] and [`Precision::store`].

use super::*;

impl Precision {
    /// Read element `index` of `bytes` as f32.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds for the storage.
    pub fn load(self, bytes: &[u8], index: usize) -> f32 {
        let at = index * self.bytes();
        match self {
            Self::Bool | Self::U8 => bytes[at] as f32,
            Self::I8 => bytes[at] as i8 as f32,
            Self::U16 => u16::from_le_bytes([bytes[at], bytes[at + 1]]) as f32,
            Self::I16 => i16::from_le_bytes([bytes[at], bytes[at + 1]]) as f32,
            Self::I32 => i32::from_le_bytes(word(bytes, at)) as f32,
            Self::BF16 => half::bf16::from_le_bytes([bytes[at], bytes[at + 1]]).to_f32(),
            Self::F16 => half::f16::from_le_bytes([bytes[at], bytes[at + 1]]).to_f32(),
            Self::F32 => f32::from_le_bytes(word(bytes, at)),
        }
    }

    /// Write `value` into element `index` of `bytes`, saturating integers.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds for the storage.
    pub fn store(self, bytes: &mut [u8], index: usize, value: f32) {
        let at = index * self.bytes();
        let value = self.saturate(value);
        match self {
            Self::Bool | Self::U8 => bytes[at] = value as u8,
            Self::I8 => bytes[at] = (value as i8) as u8,
            Self::U16 => bytes[at..at + 2].copy_from_slice(&(value as u16).to_le_bytes()),
            Self::I16 => bytes[at..at + 2].copy_from_slice(&(value as i16).to_le_bytes()),
            Self::I32 => bytes[at..at + 4].copy_from_slice(&(value as i32).to_le_bytes()),
            Self::BF16 => bytes[at..at + 2].copy_from_slice(&half::bf16::from_f32(value).to_le_bytes()),
            Self::F16 => bytes[at..at + 2].copy_from_slice(&half::f16::from_f32(value).to_le_bytes()),
            Self::F32 => bytes[at..at + 4].copy_from_slice(&value.to_le_bytes()),
        }
    }
}

fn word(bytes: &[u8], at: usize) -> [u8; 4] {
    [bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]]
}
