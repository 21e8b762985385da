//! Softmax and eltwise nodes with cached kernel dispatch.
//!
//! Every node walks the lifecycle in [`node`]: it enumerates descriptors,
//! picks one by implementation priority and then builds or fetches its
//! executor from the [`GraphContext`] cache. An eltwise node downstream of
//! another node can be folded into it as post-ops, see [`fusion`].
//!
//! # Example
//!
//! ```ignore
//! let ctx = GraphContext::default();
//! let mut node = create_node(&op)?;
//! node.base_mut().bind_input(0, src);
//! node.base_mut().bind_output(0, dst);
//! compile(node.as_mut(), &ctx)?;
//! run(node.as_mut(), &ctx)?;
//! ```

pub mod config;
pub mod context;
pub mod eltwise;
pub mod fusion;
pub mod node;
pub mod op;
pub mod softmax;


pub use config::{Config, IsaCap};
pub use context::GraphContext;
pub use eltwise::{BroadcastingPolicy, Eltwise, EltwiseImplType, EltwiseKey, EltwiseOp};
pub use node::{MAX_FUSED_INPUTS, Node, NodeBase, NodeDesc, PostOpSource, compile, create_node, run};
pub use op::{OpKind, Operation, Port};
pub use softmax::{Softmax, SoftmaxKey};
