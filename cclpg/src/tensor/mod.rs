//! Host tensor: a typed, strided view onto shared byte storage.
//!
//! Collectives only need a handful of properties from a tensor: element
//! count, element type, contiguity, device, storage identity and offset, plus
//! dim-0 slicing and element copies. Cloning a `Tensor` clones the view, not
//! the data; clones share ownership of the storage.

mod element;
mod storage;

use std::sync::Arc;

pub use element::{Bf16, Element};
pub use storage::Storage;

use crate::error::{CclError, Result};
use crate::types::{DataType, Device};

/// Memory layout of a tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Layout {
    #[default]
    Strided,
    /// Sparse tensors carry no dense storage and are always rejected.
    Sparse,
}

#[derive(Clone)]
pub struct Tensor {
    storage: Arc<Storage>,
    dtype: DataType,
    shape: Vec<usize>,
    /// Strides in elements.
    strides: Vec<usize>,
    /// Offset into `storage` in elements.
    offset: usize,
    device: Device,
    layout: Layout,
}

fn contiguous_strides(shape: &[usize]) -> Vec<usize> {
    let mut strides = vec![1usize; shape.len()];
    for d in (0..shape.len().saturating_sub(1)).rev() {
        strides[d] = strides[d + 1] * shape[d + 1].max(1);
    }
    strides
}

impl Tensor {
    /// Allocate a zero-filled contiguous tensor.
    pub fn zeros(shape: &[usize], dtype: DataType) -> Self {
        let numel: usize = shape.iter().product();
        Self {
            storage: Arc::new(Storage::zeroed(numel * dtype.size_in_bytes())),
            dtype,
            shape: shape.to_vec(),
            strides: contiguous_strides(shape),
            offset: 0,
            device: Device::Cpu,
            layout: Layout::Strided,
        }
    }

    /// Allocate a fresh contiguous tensor. Contents are zeroed.
    pub fn empty(shape: &[usize], dtype: DataType) -> Self {
        Self::zeros(shape, dtype)
    }

    /// Allocate a fresh contiguous tensor with this tensor's dtype and device.
    pub fn new_empty(&self, shape: &[usize]) -> Self {
        let mut t = Self::empty(shape, self.dtype);
        t.device = self.device;
        t
    }

    /// Build a contiguous tensor from typed data.
    pub fn from_slice<T: Element>(data: &[T], shape: &[usize]) -> Result<Self> {
        let numel: usize = shape.iter().product();
        if numel != data.len() {
            return Err(CclError::invalid(
                "from_slice",
                format!("shape {shape:?} needs {numel} elements, got {}", data.len()),
            ));
        }
        let esz = T::DTYPE.size_in_bytes();
        let mut bytes = vec![0u8; numel * esz];
        for (v, chunk) in data.iter().zip(bytes.chunks_exact_mut(esz)) {
            v.write_le(chunk);
        }
        Ok(Self {
            storage: Arc::new(Storage::from_bytes(bytes)),
            dtype: T::DTYPE,
            shape: shape.to_vec(),
            strides: contiguous_strides(shape),
            offset: 0,
            device: Device::Cpu,
            layout: Layout::Strided,
        })
    }

    /// Build a 1-D tensor from typed data.
    pub fn from_vec<T: Element>(data: Vec<T>) -> Self {
        let esz = T::DTYPE.size_in_bytes();
        let mut bytes = vec![0u8; data.len() * esz];
        for (v, chunk) in data.iter().zip(bytes.chunks_exact_mut(esz)) {
            v.write_le(chunk);
        }
        Self {
            storage: Arc::new(Storage::from_bytes(bytes)),
            dtype: T::DTYPE,
            shape: vec![data.len()],
            strides: vec![1],
            offset: 0,
            device: Device::Cpu,
            layout: Layout::Strided,
        }
    }

    /// A sparse tensor descriptor with no dense storage.
    pub fn sparse(shape: &[usize], dtype: DataType) -> Self {
        Self {
            storage: Arc::new(Storage::zeroed(0)),
            dtype,
            shape: shape.to_vec(),
            strides: contiguous_strides(shape),
            offset: 0,
            device: Device::Cpu,
            layout: Layout::Sparse,
        }
    }

    /// Re-tag the tensor as living on `device`.
    pub fn on_device(mut self, device: Device) -> Self {
        self.device = device;
        self
    }

    pub fn dtype(&self) -> DataType {
        self.dtype
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn strides(&self) -> &[usize] {
        &self.strides
    }

    pub fn dim(&self) -> usize {
        self.shape.len()
    }

    /// Size along dimension `d`.
    pub fn size(&self, d: usize) -> Result<usize> {
        self.shape.get(d).copied().ok_or_else(|| {
            CclError::invalid(
                "size",
                format!("dimension {d} out of range for {}-d tensor", self.dim()),
            )
        })
    }

    pub fn numel(&self) -> usize {
        self.shape.iter().product()
    }

    pub fn storage_offset(&self) -> usize {
        self.offset
    }

    pub fn storage(&self) -> &Arc<Storage> {
        &self.storage
    }

    pub fn device(&self) -> Device {
        self.device
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    pub fn is_sparse(&self) -> bool {
        self.layout == Layout::Sparse
    }

    /// Row-major contiguity; size-1 dimensions do not constrain their stride.
    pub fn is_contiguous(&self) -> bool {
        let mut expected = 1usize;
        for (&size, &stride) in self.shape.iter().zip(&self.strides).rev() {
            if size == 0 {
                return true;
            }
            if size != 1 && stride != expected {
                return false;
            }
            expected *= size;
        }
        true
    }

    /// True if both tensors view the same allocation.
    pub fn is_alias_of(&self, other: &Tensor) -> bool {
        Arc::ptr_eq(&self.storage, &other.storage)
    }

    /// View `len` rows starting at row `start` along dimension 0.
    pub fn narrow(&self, start: usize, len: usize) -> Result<Tensor> {
        let rows = self.size(0)?;
        if start + len > rows {
            return Err(CclError::invalid(
                "narrow",
                format!("rows {start}..{} exceed dimension 0 of size {rows}", start + len),
            ));
        }
        let mut view = self.clone();
        view.offset = self.offset + start * self.strides[0];
        view.shape[0] = len;
        Ok(view)
    }

    /// Split along dimension 0 into consecutive views of the given row counts.
    pub fn split_with_sizes(&self, sizes: &[usize]) -> Result<Vec<Tensor>> {
        let rows = self.size(0)?;
        let total: usize = sizes.iter().sum();
        if total != rows {
            return Err(CclError::invalid(
                "split_with_sizes",
                format!("split sizes sum to {total}, dimension 0 is {rows}"),
            ));
        }
        let mut start = 0;
        let mut parts = Vec::with_capacity(sizes.len());
        for &len in sizes {
            parts.push(self.narrow(start, len)?);
            start += len;
        }
        Ok(parts)
    }

    /// Swap two dimensions without moving data.
    pub fn transpose(&self, d0: usize, d1: usize) -> Result<Tensor> {
        if d0 >= self.dim() || d1 >= self.dim() {
            return Err(CclError::invalid(
                "transpose",
                format!("dimensions ({d0}, {d1}) out of range for {}-d tensor", self.dim()),
            ));
        }
        let mut view = self.clone();
        view.shape.swap(d0, d1);
        view.strides.swap(d0, d1);
        Ok(view)
    }

    /// Storage element indices of every logical element, in row-major order.
    fn element_indices(&self) -> Vec<usize> {
        let n = self.numel();
        if n == 0 {
            return Vec::new();
        }
        if self.is_contiguous() {
            return (self.offset..self.offset + n).collect();
        }
        let mut out = Vec::with_capacity(n);
        let mut idx = vec![0usize; self.shape.len()];
        for _ in 0..n {
            let off: usize = idx.iter().zip(&self.strides).map(|(i, s)| i * s).sum();
            out.push(self.offset + off);
            for d in (0..idx.len()).rev() {
                idx[d] += 1;
                if idx[d] < self.shape[d] {
                    break;
                }
                idx[d] = 0;
            }
        }
        out
    }

    fn check_dense(&self, operation: &'static str) -> Result<()> {
        if self.is_sparse() {
            return Err(CclError::invalid(operation, "tensor has no dense storage"));
        }
        Ok(())
    }

    /// Logical contents as bytes, honoring strides.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        self.check_dense("to_bytes")?;
        let esz = self.dtype.size_in_bytes();
        let indices = self.element_indices();
        let src = self.storage.read()?;
        let mut out = Vec::with_capacity(indices.len() * esz);
        for i in indices {
            out.extend_from_slice(&src[i * esz..(i + 1) * esz]);
        }
        Ok(out)
    }

    /// Overwrite logical contents from bytes, honoring strides.
    pub fn write_bytes(&self, data: &[u8]) -> Result<()> {
        self.check_dense("write_bytes")?;
        let esz = self.dtype.size_in_bytes();
        let indices = self.element_indices();
        if data.len() != indices.len() * esz {
            return Err(CclError::invalid(
                "write_bytes",
                format!("expected {} bytes, got {}", indices.len() * esz, data.len()),
            ));
        }
        let mut dst = self.storage.write()?;
        for (i, chunk) in indices.into_iter().zip(data.chunks_exact(esz)) {
            dst[i * esz..(i + 1) * esz].copy_from_slice(chunk);
        }
        Ok(())
    }

    /// Copy every element of `src` into this view in row-major order.
    ///
    /// Shapes may differ; element counts and dtypes must match.
    pub fn copy_from(&self, src: &Tensor) -> Result<()> {
        if src.dtype != self.dtype {
            return Err(CclError::invalid(
                "copy",
                format!("dtype mismatch: {} into {}", src.dtype, self.dtype),
            ));
        }
        if src.numel() != self.numel() {
            return Err(CclError::invalid(
                "copy",
                format!("size mismatch: {} elements into {}", src.numel(), self.numel()),
            ));
        }
        // Read fully before writing so overlapping views of one storage work.
        let data = src.to_bytes()?;
        self.write_bytes(&data)
    }

    /// Typed logical contents.
    pub fn to_vec<T: Element>(&self) -> Result<Vec<T>> {
        if T::DTYPE != self.dtype {
            return Err(CclError::invalid(
                "to_vec",
                format!("requested {} from a {} tensor", T::DTYPE, self.dtype),
            ));
        }
        let esz = self.dtype.size_in_bytes();
        Ok(self
            .to_bytes()?
            .chunks_exact(esz)
            .map(T::read_le)
            .collect())
    }

    fn raw_range(&self, elem_offset: usize, count: usize) -> Result<std::ops::Range<usize>> {
        self.check_dense("raw access")?;
        let esz = self.dtype.size_in_bytes();
        let start = (self.offset + elem_offset) * esz;
        let end = start + count * esz;
        let len = self.storage.len_bytes()?;
        if end > len {
            return Err(CclError::invalid(
                "raw access",
                format!("bytes {start}..{end} exceed storage of {len} bytes"),
            ));
        }
        Ok(start..end)
    }

    /// Read `count` consecutive elements starting at this view's first element,
    /// ignoring strides. This is how an engine sees a data pointer.
    pub fn read_raw(&self, count: usize) -> Result<Vec<u8>> {
        let range = self.raw_range(0, count)?;
        Ok(self.storage.read()?[range].to_vec())
    }

    /// Write consecutive elements starting `elem_offset` elements past this
    /// view's first element, ignoring strides.
    pub fn write_raw(&self, elem_offset: usize, bytes: &[u8]) -> Result<()> {
        let esz = self.dtype.size_in_bytes();
        if bytes.len() % esz != 0 {
            return Err(CclError::invalid(
                "raw access",
                format!("{} bytes is not a whole number of {} elements", bytes.len(), self.dtype),
            ));
        }
        let range = self.raw_range(elem_offset, bytes.len() / esz)?;
        self.storage.write()?[range].copy_from_slice(bytes);
        Ok(())
    }
}

impl std::fmt::Debug for Tensor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tensor")
            .field("dtype", &self.dtype)
            .field("shape", &self.shape)
            .field("strides", &self.strides)
            .field("offset", &self.offset)
            .field("device", &self.device)
            .field("layout", &self.layout)
            .finish()
    }
}
