use parking_lot::RwLock;

use crate::error::{AllocationFailedSnafu, Result};

/// Opaque handle to host memory.
///
/// Kernels take the read or write lock for the duration of one gather or
/// scatter, never both at once on the same buffer.
#[derive(Debug)]
pub enum RawBuffer {
    Cpu { data: RwLock<Box<[u8]>> },
}

impl RawBuffer {
    /// Get the size of the buffer in bytes.
    pub fn size(&self) -> usize {
        match self {
            RawBuffer::Cpu { data } => data.read().len(),
        }
    }
}

pub trait Allocator: Send + Sync + std::fmt::Debug {
    fn alloc(&self, size: usize) -> Result<RawBuffer>;
    fn free(&self, _buffer: RawBuffer) {}
    fn name(&self) -> &str;
}

/// CPU allocator using system memory. Buffers are zero-initialized.
#[derive(Debug, Clone, Default)]
pub struct CpuAllocator;

impl Allocator for CpuAllocator {
    fn alloc(&self, size: usize) -> Result<RawBuffer> {
        let mut data = Vec::new();
        data.try_reserve_exact(size).map_err(|_| AllocationFailedSnafu { size }.build())?;
        data.resize(size, 0u8);
        Ok(RawBuffer::Cpu { data: RwLock::new(data.into_boxed_slice()) })
    }

    fn name(&self) -> &str {
        "CPU"
    }
}
