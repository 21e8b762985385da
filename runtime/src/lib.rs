//! Kernel selection and executor caching for tessel nodes.
//!
//! A node turns its configuration into a descriptor key, asks the
//! [`MultiCache`] of its execution context for an executor and, on a miss,
//! enumerates candidates on a [`Backend`] and lets the
//! [`selector`] pick one.
//!
//! # Backends
//!
//! The `devices` module provides the CPU backend with `jit:<isa>` tiers and a
//! `ref:any` fallback.

pub mod cache;
pub mod devices;
pub mod error;
pub mod executor;
pub mod impl_type;
pub mod key;
pub mod post_ops;
pub mod primitive;
pub mod selector;


pub use cache::{ExecutorCache, LookUpStatus, MultiCache};
pub use devices::{CpuBackend, Isa};
pub use error::*;
pub use executor::{PrimitiveExecutor, PrimitiveExecutorPtr};
pub use impl_type::{ImplFlag, ImplType};
pub use key::{CacheKey, hash_combine, hash_key};
pub use post_ops::{Algorithm, PostOp, PostOps, PostOpsBuilder, PrimitiveAttr, ResolvedPostOps, ScratchpadMode};
pub use primitive::{Arg, Backend, Candidate, ExecArgs, OpDesc, Primitive, PrimitiveRequest};
pub use selector::{select, select_candidate};
