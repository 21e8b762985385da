//! Rules for folding an eltwise node into its upstream kernel.

use tracing::trace;

use crate::eltwise::BroadcastingPolicy;
use crate::node::{MAX_FUSED_INPUTS, Node, NodeBase, PostOpSource};

/// Check if `child` can run as post-ops of the node owning `parent`.
///
/// `parent_optimized` is whether the parent runs an optimized kernel; only
/// those can store through a fused conversion.
pub fn can_fuse_into(parent: &NodeBase, parent_optimized: bool, child: &dyn Node) -> bool {
    let Some(eltwise) = child.as_eltwise() else {
        return false;
    };

    let verdict = (|| {
        if parent.output_shape(0) != eltwise.base().output_shape(0) {
            return Err("output shapes differ");
        }
        if eltwise.non_constant_inputs() != 1 {
            return Err("more than one data input");
        }
        if !eltwise.expressible_as_post_ops() {
            return Err("parameters have no post-op form");
        }
        if let Some(to) = eltwise.convert_target()
            && !(parent_optimized && parent.output_precision(0).can_fuse_convert(to))
        {
            return Err("conversion must stay standalone");
        }
        if eltwise.has_constant_inputs() && eltwise.broadcasting_policy() == BroadcastingPolicy::Undefined {
            return Err("parameters broadcast neither per tensor nor per channel");
        }
        if parent.total_fused_inputs() + eltwise.fused_inputs() > MAX_FUSED_INPUTS {
            return Err("too many fused inputs");
        }
        Ok(())
    })();

    match verdict {
        Ok(()) => true,
        Err(reason) => {
            trace!(parent = parent.name(), child = child.name(), reason, "fusion rejected");
            false
        }
    }
}
