//! Flatness analysis over per-rank buffer lists.
//!
//! A list is flat when every non-empty buffer is a contiguous view into one
//! shared allocation, laid out back to back in list order. A flat list can be
//! handed to the engine as a single buffer starting at its representative;
//! anything else goes through a freshly allocated staging buffer.

use crate::error::{CclError, Result};
use crate::tensor::Tensor;

/// Outcome of [`analyze`]. Never mutated after construction.
#[derive(Debug, Clone)]
pub struct LayoutResult {
    pub is_flat: bool,
    /// Sum of every buffer's element count.
    pub total_len: usize,
    /// First non-empty buffer, or the first buffer if all are empty. When the
    /// list is flat this is the zero-copy view the engine uses.
    pub representative: Tensor,
}

/// Record each buffer's element count and decide whether the list is flat.
///
/// Lengths are recorded for every buffer even after flatness is ruled out.
pub fn analyze(buffers: &[Tensor]) -> Result<(LayoutResult, Vec<usize>)> {
    let first = buffers
        .first()
        .ok_or_else(|| CclError::invalid("layout", "empty buffer list"))?;

    let mut representative = first;
    let mut running = 0usize;
    let mut is_flat = true;
    let mut lengths = Vec::with_capacity(buffers.len());

    for buf in buffers {
        let len = buf.numel();
        if representative.numel() == 0 && len != 0 {
            representative = buf;
        }
        lengths.push(len);

        if is_flat
            && len != 0
            && (!buf.is_alias_of(representative)
                || !buf.is_contiguous()
                || buf.storage_offset() != representative.storage_offset() + running)
        {
            is_flat = false;
        }
        running += len;
    }

    Ok((
        LayoutResult {
            is_flat,
            total_len: running,
            representative: representative.clone(),
        },
        lengths,
    ))
}

/// A list reduced to one contiguous buffer.
#[derive(Debug, Clone)]
pub struct Flattened {
    /// The caller's own memory when `is_flat`, otherwise a fresh 1-D staging
    /// buffer of `total_len` elements.
    pub buffer: Tensor,
    pub is_flat: bool,
    pub total_len: usize,
    pub lengths: Vec<usize>,
}

/// Analyze `buffers` and allocate a staging buffer if they are not flat.
/// The staging buffer is not filled.
pub fn flatten_or_stage(buffers: &[Tensor]) -> Result<Flattened> {
    let (res, lengths) = analyze(buffers)?;
    let buffer = if res.is_flat {
        res.representative
    } else {
        res.representative.new_empty(&[res.total_len])
    };
    Ok(Flattened {
        buffer,
        is_flat: res.is_flat,
        total_len: res.total_len,
        lengths,
    })
}
