use std::sync::Arc;

use parking_lot::Mutex;

use crate::allocator::Allocator;
use crate::desc::{MemoryDesc, MemoryDescPtr};
use crate::error::Result;
use crate::memory::Memory;

/// Growing scratch area shared by the nodes of one execution context.
///
/// Every request is served from the same allocation as long as it fits; a
/// larger request replaces it. Memory handed out earlier keeps its own
/// allocation alive, so growing never invalidates a bound executor.
#[derive(Debug)]
pub struct Scratchpad {
    allocator: Arc<dyn Allocator>,
    current: Mutex<Option<Memory>>,
}

impl Scratchpad {
    pub fn new(allocator: Arc<dyn Allocator>) -> Self {
        Self { allocator, current: Mutex::new(None) }
    }

    /// Memory of at least `desc.size_bytes()` viewed through `desc`.
    pub fn memory(&self, desc: MemoryDescPtr) -> Result<Memory> {
        let size = desc.size_bytes()?;
        let mut current = self.current.lock();

        if let Some(memory) = current.as_ref()
            && memory.capacity() >= size
        {
            return memory.with_desc(desc);
        }

        let backing = Arc::new(MemoryDesc::planar(tessel_dtype::Precision::U8, &[size]));
        let memory = Memory::allocate(Arc::clone(&self.allocator), backing)?;
        let view = memory.with_desc(desc)?;
        *current = Some(memory);
        Ok(view)
    }

    /// Size of the current allocation in bytes.
    pub fn size(&self) -> usize {
        self.current.lock().as_ref().map_or(0, Memory::capacity)
    }
}
