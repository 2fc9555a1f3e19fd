//! Scalar element types and their little-endian byte encoding.

use crate::types::DataType;

/// A Rust scalar that can live inside a [`Tensor`](super::Tensor).
pub trait Element: Copy + Send + Sync + 'static {
    const DTYPE: DataType;

    /// Decode one element from exactly `DTYPE.size_in_bytes()` bytes.
    fn read_le(bytes: &[u8]) -> Self;

    /// Encode into exactly `DTYPE.size_in_bytes()` bytes.
    fn write_le(self, out: &mut [u8]);
}

macro_rules! impl_element {
    ($($ty:ty => $dtype:ident),* $(,)?) => {
        $(
            impl Element for $ty {
                const DTYPE: DataType = DataType::$dtype;

                #[inline]
                fn read_le(bytes: &[u8]) -> Self {
                    let mut raw = [0u8; std::mem::size_of::<$ty>()];
                    raw.copy_from_slice(&bytes[..std::mem::size_of::<$ty>()]);
                    <$ty>::from_le_bytes(raw)
                }

                #[inline]
                fn write_le(self, out: &mut [u8]) {
                    out[..std::mem::size_of::<$ty>()].copy_from_slice(&self.to_le_bytes());
                }
            }
        )*
    };
}

impl_element!(
    f32 => F32,
    f64 => F64,
    i8 => I8,
    i32 => I32,
    i64 => I64,
    u8 => U8,
    u32 => U32,
    u64 => U64,
);

impl Element for bool {
    const DTYPE: DataType = DataType::Bool;

    fn read_le(bytes: &[u8]) -> Self {
        bytes[0] != 0
    }

    fn write_le(self, out: &mut [u8]) {
        out[0] = u8::from(self);
    }
}

/// Brain floating point: the upper 16 bits of an IEEE-754 `f32`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(transparent)]
pub struct Bf16(pub u16);

impl Bf16 {
    /// Convert from `f32`, rounding to nearest even.
    pub fn from_f32(v: f32) -> Self {
        let bits = v.to_bits();
        if v.is_nan() {
            // Keep it a NaN after truncation.
            return Bf16(((bits >> 16) as u16) | 0x0040);
        }
        let round = 0x7fff + ((bits >> 16) & 1);
        Bf16((bits.wrapping_add(round) >> 16) as u16)
    }

    pub fn to_f32(self) -> f32 {
        f32::from_bits((self.0 as u32) << 16)
    }
}

impl Element for Bf16 {
    const DTYPE: DataType = DataType::BF16;

    fn read_le(bytes: &[u8]) -> Self {
        Bf16(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    fn write_le(self, out: &mut [u8]) {
        out[..2].copy_from_slice(&self.0.to_le_bytes());
    }
}
