//! Built executors for backend primitives.

use std::fmt;
use std::sync::Arc;

use tessel_device::MemoryDescPtr;

use crate::error::Result;
use crate::impl_type::ImplType;
use crate::primitive::{Candidate, ExecArgs, Primitive};

/// A materialized backend kernel bound to one primitive descriptor.
///
/// Immutable after construction; shared between the cache and every node
/// that hits the same key.
pub struct PrimitiveExecutor {
    primitive: Box<dyn Primitive>,
    scratchpad_desc: MemoryDescPtr,
    impl_type: ImplType,
    info: String,
}

pub type PrimitiveExecutorPtr = Arc<PrimitiveExecutor>;

impl PrimitiveExecutor {
    /// Materialize the selected candidate.
    pub fn new(candidate: Box<dyn Candidate>) -> Result<Self> {
        let impl_type = candidate.impl_type();
        let info = candidate.info().to_string();
        let scratchpad_desc = candidate.scratchpad_desc();
        let primitive = candidate.create()?;
        Ok(Self { primitive, scratchpad_desc, impl_type, info })
    }

    /// Run the kernel synchronously on the calling thread.
    pub fn exec(&self, args: &ExecArgs) -> Result<()> {
        self.primitive.execute(args)
    }

    pub fn scratchpad_desc(&self) -> &MemoryDescPtr {
        &self.scratchpad_desc
    }

    pub fn impl_type(&self) -> ImplType {
        self.impl_type
    }

    pub fn info(&self) -> &str {
        &self.info
    }
}

impl fmt::Debug for PrimitiveExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrimitiveExecutor")
            .field("info", &self.info)
            .field("impl_type", &self.impl_type)
            .field("scratchpad_desc", &self.scratchpad_desc)
            .finish()
    }
}
