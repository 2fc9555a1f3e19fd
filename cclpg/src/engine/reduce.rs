//! Element-wise reduction over little-endian byte buffers, used by the
//! in-process engine.

use super::{EngineDatatype, EngineError, EngineReduction, EngineResult};
use crate::tensor::{Bf16, Element};

/// Types that support the four engine reductions.
trait Reducible: Element {
    fn reduce(a: Self, b: Self, op: EngineReduction) -> Self;
}

macro_rules! impl_reducible {
    (int: $($ty:ty),*) => {
        $(
            impl Reducible for $ty {
                #[inline]
                fn reduce(a: Self, b: Self, op: EngineReduction) -> Self {
                    match op {
                        EngineReduction::Sum => a.wrapping_add(b),
                        EngineReduction::Prod => a.wrapping_mul(b),
                        EngineReduction::Min => a.min(b),
                        EngineReduction::Max => a.max(b),
                    }
                }
            }
        )*
    };
    (float: $($ty:ty),*) => {
        $(
            impl Reducible for $ty {
                #[inline]
                fn reduce(a: Self, b: Self, op: EngineReduction) -> Self {
                    match op {
                        EngineReduction::Sum => a + b,
                        EngineReduction::Prod => a * b,
                        EngineReduction::Min => a.min(b),
                        EngineReduction::Max => a.max(b),
                    }
                }
            }
        )*
    };
}

impl_reducible!(int: i8, u8, i32, i64);
impl_reducible!(float: f32, f64);

impl Reducible for Bf16 {
    fn reduce(a: Self, b: Self, op: EngineReduction) -> Self {
        Bf16::from_f32(f32::reduce(a.to_f32(), b.to_f32(), op))
    }
}

/// `dst[i] = op(dst[i], src[i])` for every element.
pub(crate) fn reduce_bytes(
    dst: &mut [u8],
    src: &[u8],
    dtype: EngineDatatype,
    op: EngineReduction,
) -> EngineResult<()> {
    if dst.len() != src.len() {
        return Err(EngineError::new(format!(
            "reduce: buffer length mismatch ({} vs {} bytes)",
            dst.len(),
            src.len()
        )));
    }
    match dtype {
        EngineDatatype::Int8 => reduce_typed::<i8>(dst, src, op),
        EngineDatatype::Uint8 => reduce_typed::<u8>(dst, src, op),
        EngineDatatype::Int => reduce_typed::<i32>(dst, src, op),
        EngineDatatype::Int64 => reduce_typed::<i64>(dst, src, op),
        EngineDatatype::Float => reduce_typed::<f32>(dst, src, op),
        EngineDatatype::Double => reduce_typed::<f64>(dst, src, op),
        EngineDatatype::Bfp16 => reduce_typed::<Bf16>(dst, src, op),
    }
    Ok(())
}

fn reduce_typed<T: Reducible>(dst: &mut [u8], src: &[u8], op: EngineReduction) {
    let esz = std::mem::size_of::<T>();
    for (d, s) in dst.chunks_exact_mut(esz).zip(src.chunks_exact(esz)) {
        let r = T::reduce(T::read_le(d), T::read_le(s), op);
        r.write_le(d);
    }
}
