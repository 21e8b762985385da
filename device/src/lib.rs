//! Memory descriptors and host memory for tessel kernels.
//!
//! - [`MemoryDesc`]: precision, logical shape and physical [`Layout`] of a buffer
//! - [`Memory`]: an allocation viewed through a descriptor
//! - [`Scratchpad`]: per-context scratch space handed to kernels

pub mod allocator;
pub mod desc;
pub mod error;
pub mod layout;
pub mod memory;
pub mod scratchpad;
pub mod shape;


pub use allocator::{Allocator, CpuAllocator};
pub use desc::{MemoryDesc, MemoryDescPtr, same_desc};
pub use error::{Error, Result};
pub use layout::Layout;
pub use memory::Memory;
pub use scratchpad::Scratchpad;
pub use shape::{Dim, Shape, VectorDims};
