//! Backend kernel-build service.
//!
//! A [`Backend`] turns a [`PrimitiveRequest`] into an ordered sequence of
//! [`Candidate`]s, most preferred first. A candidate is only materialized
//! into a runnable [`Primitive`] once the selector picked it.

use std::collections::HashMap;
use std::fmt;

use tessel_device::{Memory, MemoryDescPtr};

use crate::error::{MissingArgumentSnafu, Result};
use crate::impl_type::ImplType;
use crate::post_ops::PrimitiveAttr;

/// Role of a memory binding passed to a kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arg {
    Src(usize),
    Dst,
    Scratchpad,
    /// Operand of the fused post-op at the given position.
    PostOp(usize),
}

/// Memory bindings for one kernel invocation.
#[derive(Debug, Clone, Default)]
pub struct ExecArgs {
    bindings: HashMap<Arg, Memory>,
}

impl ExecArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&mut self, arg: Arg, memory: Memory) -> &mut Self {
        self.bindings.insert(arg, memory);
        self
    }

    pub fn with(mut self, arg: Arg, memory: Memory) -> Self {
        self.bindings.insert(arg, memory);
        self
    }

    pub fn get(&self, arg: Arg) -> Result<&Memory> {
        self.bindings.get(&arg).ok_or_else(|| MissingArgumentSnafu { arg }.build())
    }

    pub fn try_get(&self, arg: Arg) -> Option<&Memory> {
        self.bindings.get(&arg)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

/// Operation a backend is asked to implement.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OpDesc {
    Softmax { src: MemoryDescPtr, dst: MemoryDescPtr, axis: usize },
}

impl fmt::Display for OpDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Softmax { src, dst, axis } => write!(f, "softmax(axis={axis}, src={src}, dst={dst})"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PrimitiveRequest {
    pub op: OpDesc,
    pub attr: PrimitiveAttr,
}

impl PrimitiveRequest {
    pub fn new(op: OpDesc, attr: PrimitiveAttr) -> Self {
        Self { op, attr }
    }
}

impl fmt::Display for PrimitiveRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.op)?;
        if !self.attr.post_ops.is_empty() {
            write!(f, " with {} post-ops", self.attr.post_ops.len())?;
        }
        Ok(())
    }
}

/// Numeric backend producing kernel candidates.
pub trait Backend: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    /// Ordered candidates for `request`, most preferred first.
    ///
    /// An `Err` means the backend rejects the request outright. An empty
    /// sequence means it accepts the request but has nothing to offer.
    fn candidates(&self, request: &PrimitiveRequest) -> Result<Vec<Box<dyn Candidate>>>;
}

/// A concrete implementation a backend can build for a request.
pub trait Candidate: Send {
    /// Descriptive implementation name, e.g. `jit:avx2`.
    fn info(&self) -> &str;

    fn impl_type(&self) -> ImplType {
        ImplType::parse(self.info())
    }

    /// Scratch memory the built kernel expects under [`Arg::Scratchpad`].
    fn scratchpad_desc(&self) -> MemoryDescPtr;

    fn create(self: Box<Self>) -> Result<Box<dyn Primitive>>;
}

/// A materialized kernel.
pub trait Primitive: Send + Sync {
    fn execute(&self, args: &ExecArgs) -> Result<()>;
}
