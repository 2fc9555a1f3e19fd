//! Moving data between a contiguous staging buffer and per-rank buffers.

use crate::error::{CclError, Result};
use crate::tensor::Tensor;

/// Split `dest` along dimension 0 into per-rank segments of `split_sizes` rows.
pub fn stage(dest: &Tensor, split_sizes: &[usize]) -> Result<Vec<Tensor>> {
    dest.split_with_sizes(split_sizes)
}

fn check_pairs(operation: &'static str, segments: &[Tensor], per_rank: &[Tensor]) -> Result<()> {
    if segments.len() != per_rank.len() {
        return Err(CclError::invalid(
            operation,
            format!(
                "{} segments for {} per-rank buffers",
                segments.len(),
                per_rank.len()
            ),
        ));
    }
    Ok(())
}

/// Copy each per-rank buffer's contents into its staging segment.
pub fn scatter_into(segments: &[Tensor], per_rank: &[Tensor]) -> Result<()> {
    check_pairs("scatter_into", segments, per_rank)?;
    for (seg, src) in segments.iter().zip(per_rank) {
        seg.copy_from(src)?;
    }
    Ok(())
}

/// Copy each staging segment back into its per-rank buffer.
pub fn gather_from(segments: &[Tensor], per_rank: &[Tensor]) -> Result<()> {
    check_pairs("gather_from", segments, per_rank)?;
    for (seg, dst) in segments.iter().zip(per_rank) {
        dst.copy_from(seg)?;
    }
    Ok(())
}

/// Validate a split-size table against `tensor`'s leading dimension.
///
/// An empty table means equal division and requires dim 0 to divide evenly by
/// the group size; otherwise it needs one entry per rank summing to dim 0.
pub fn check_split_sizes(
    operation: &'static str,
    split_sizes: &[usize],
    tensor: &Tensor,
    group_size: usize,
) -> Result<()> {
    let rows = tensor.size(0)?;
    if split_sizes.is_empty() {
        if group_size == 0 || rows % group_size != 0 {
            return Err(CclError::invalid(
                operation,
                "tensor's dim 0 does not divide equally across group size",
            ));
        }
        return Ok(());
    }
    if split_sizes.len() != group_size {
        return Err(CclError::invalid(
            operation,
            "number of tensor splits not equal to group size",
        ));
    }
    let sum: usize = split_sizes.iter().sum();
    if sum != rows {
        return Err(CclError::invalid(
            operation,
            "split sizes doesn't match total dim 0 size",
        ));
    }
    Ok(())
}
