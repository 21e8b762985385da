use std::sync::Arc;

use once_cell::sync::OnceCell;
use snafu::ensure;
use tessel_dtype::ext::HasPrecision;

use crate::allocator::{Allocator, RawBuffer};
use crate::desc::{MemoryDesc, MemoryDescPtr};
use crate::error::{InvalidViewSnafu, Result, SizeMismatchSnafu};

/// Allocation shared by every [`Memory`] handle placed on it.
#[derive(Debug)]
struct MemoryData {
    /// Lazily-initialized raw buffer (lock-free after first allocation).
    raw: OnceCell<RawBuffer>,
    allocator: Arc<dyn Allocator>,
    /// Total size of the underlying allocation in bytes.
    size: usize,
}

impl MemoryData {
    fn new(allocator: Arc<dyn Allocator>, size: usize) -> Self {
        Self { raw: OnceCell::new(), allocator, size }
    }

    fn ensure_allocated(&self) -> Result<&RawBuffer> {
        self.raw.get_or_try_init(|| self.allocator.alloc(self.size))
    }
}

impl Drop for MemoryData {
    fn drop(&mut self) {
        if let Some(raw) = self.raw.take() {
            self.allocator.free(raw);
        }
    }
}

/// A host buffer together with the descriptor it is read through.
///
/// Cloning is cheap and yields a handle to the same allocation.
#[derive(Debug, Clone)]
pub struct Memory {
    data: Arc<MemoryData>,
    desc: MemoryDescPtr,
}

impl Memory {
    /// Create memory with lazy allocation. The descriptor must be defined.
    pub fn new(allocator: Arc<dyn Allocator>, desc: MemoryDescPtr) -> Result<Self> {
        let size = desc.size_bytes()?;
        Ok(Self { data: Arc::new(MemoryData::new(allocator, size)), desc })
    }

    /// Create memory with immediate allocation.
    pub fn allocate(allocator: Arc<dyn Allocator>, desc: MemoryDescPtr) -> Result<Self> {
        let memory = Self::new(allocator, desc)?;
        memory.data.ensure_allocated()?;
        Ok(memory)
    }

    /// Allocate memory described by `desc` and fill it from logical row-major `values`.
    pub fn from_values(allocator: Arc<dyn Allocator>, desc: MemoryDescPtr, values: &[f32]) -> Result<Self> {
        let memory = Self::allocate(allocator, desc)?;
        memory.write_values(values)?;
        Ok(memory)
    }

    /// Planar memory holding `data` as-is.
    pub fn from_slice<T: HasPrecision>(allocator: Arc<dyn Allocator>, dims: &[usize], data: &[T]) -> Result<Self> {
        let desc = Arc::new(MemoryDesc::planar(T::PRECISION, dims));
        let values: Vec<f32> = data.iter().map(|v| v.to_f32()).collect();
        Self::from_values(allocator, desc, &values)
    }

    pub fn desc(&self) -> &MemoryDescPtr {
        &self.desc
    }

    /// Size of the underlying allocation in bytes.
    pub fn capacity(&self) -> usize {
        self.data.size
    }

    pub fn is_allocated(&self) -> bool {
        self.data.raw.get().is_some()
    }

    /// Check if both handles point at the same allocation.
    pub fn same_buffer(&self, other: &Memory) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }

    /// Reinterpret the same allocation through another descriptor.
    pub fn with_desc(&self, desc: MemoryDescPtr) -> Result<Self> {
        let size = desc.size_bytes()?;
        ensure!(size <= self.data.size, InvalidViewSnafu { size, buffer_size: self.data.size });
        Ok(Self { data: Arc::clone(&self.data), desc })
    }

    pub fn read<R>(&self, f: impl FnOnce(&[u8]) -> R) -> Result<R> {
        match self.data.ensure_allocated()? {
            RawBuffer::Cpu { data } => Ok(f(&data.read())),
        }
    }

    pub fn write<R>(&self, f: impl FnOnce(&mut [u8]) -> R) -> Result<R> {
        match self.data.ensure_allocated()? {
            RawBuffer::Cpu { data } => Ok(f(&mut data.write())),
        }
    }

    /// Logical row-major contents converted to f32.
    pub fn to_values(&self) -> Result<Vec<f32>> {
        let offsets = self.desc.logical_offsets()?;
        let precision = self.desc.precision();
        self.read(|bytes| offsets.iter().map(|&at| precision.load(bytes, at)).collect())
    }

    /// Overwrite the logical contents from row-major f32 `values`.
    pub fn write_values(&self, values: &[f32]) -> Result<()> {
        let offsets = self.desc.logical_offsets()?;
        ensure!(offsets.len() == values.len(), SizeMismatchSnafu { expected: offsets.len(), actual: values.len() });
        let precision = self.desc.precision();
        self.write(|bytes| {
            for (&at, &value) in offsets.iter().zip(values) {
                precision.store(bytes, at, value);
            }
        })
    }
}
