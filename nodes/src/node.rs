//! Node lifecycle.
//!
//! A node goes through these steps, in order:
//!
//! 1. [`Node::supported_descriptors`]: candidate input descriptors
//! 2. [`Node::init_supported_primitive_descriptors`]: one [`NodeDesc`] per usable implementation
//! 3. [`Node::select_optimal_primitive_descriptor`]: pick by implementation priority
//! 4. [`Node::init_optimal_primitive_descriptor`]: validate and finalize the selected config
//! 5. [`Node::create_primitive`]: [`Node::prepare_params`] right away for static shapes
//! 6. [`Node::execute`] / [`Node::execute_dynamic`]
//!
//! [`compile`] and [`run`] drive a node through these steps.

use std::sync::Arc;

use snafu::{OptionExt, ensure};
use tessel_device::{Allocator, Memory, MemoryDescPtr, Shape, VectorDims};
use tessel_dtype::Precision;
use tessel_runtime::error::{InvalidConfigurationSnafu, Result};
use tessel_runtime::post_ops::PostOpOperands;
use tessel_runtime::{Arg, ExecArgs, ImplType, PostOps, PostOpsBuilder};
use tracing::debug;

use crate::context::GraphContext;
use crate::eltwise::Eltwise;
use crate::op::{OpKind, Operation, Port};
use crate::softmax::Softmax;

/// Upper bound on the inputs of a node including every fused operand.
pub const MAX_FUSED_INPUTS: usize = 7;

#[derive(Debug, Clone, PartialEq)]
pub struct PortConfig {
    pub desc: MemoryDescPtr,
    /// Output port this input may share memory with.
    pub in_place: Option<usize>,
}

impl PortConfig {
    pub fn new(desc: MemoryDescPtr) -> Self {
        Self { desc, in_place: None }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct NodeConfig {
    pub inputs: Vec<PortConfig>,
    pub outputs: Vec<PortConfig>,
}

/// A supported primitive descriptor: port configuration plus implementation type.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeDesc {
    pub config: NodeConfig,
    pub impl_type: ImplType,
}

/// Something that can be folded into an upstream kernel as post-ops.
pub trait PostOpSource: Send + Sync {
    fn name(&self) -> &str;

    /// Append this operation to `ops` in evaluation order.
    ///
    /// `channels` is the upstream output extent along `channel_axis`, when known.
    fn append_post_ops(
        &self,
        ops: &mut PostOpsBuilder,
        channel_axis: usize,
        channels: Option<usize>,
        allocator: &Arc<dyn Allocator>,
    ) -> Result<()>;

    /// Number of operand inputs this operation adds to the upstream kernel.
    fn fused_inputs(&self) -> usize;

    /// Precision the upstream kernel stores through, if this operation converts.
    fn convert_target(&self) -> Option<Precision> {
        None
    }
}

/// State every node carries.
pub struct NodeBase {
    name: String,
    input_ports: Vec<Port>,
    output_ports: Vec<Port>,
    inputs: Vec<Option<Memory>>,
    outputs: Vec<Option<Memory>>,
    supported: Vec<NodeDesc>,
    selected: Option<usize>,
    fused: Vec<Arc<dyn PostOpSource>>,
    post_ops: Option<(PostOps, PostOpOperands)>,
    prepared_dims: Option<Vec<VectorDims>>,
}

impl NodeBase {
    pub fn new(name: impl Into<String>, input_ports: Vec<Port>, output_ports: Vec<Port>) -> Self {
        Self {
            name: name.into(),
            inputs: vec![None; input_ports.len()],
            outputs: vec![None; output_ports.len()],
            input_ports,
            output_ports,
            supported: Vec::new(),
            selected: None,
            fused: Vec::new(),
            post_ops: None,
            prepared_dims: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn input_ports(&self) -> &[Port] {
        &self.input_ports
    }

    pub fn output_ports(&self) -> &[Port] {
        &self.output_ports
    }

    pub fn input_shape(&self, port: usize) -> Option<&Shape> {
        self.input_ports.get(port).map(|p| &p.shape)
    }

    pub fn output_shape(&self, port: usize) -> Option<&Shape> {
        self.output_ports.get(port).map(|p| &p.shape)
    }

    /// Check if any port has unresolved dimensions.
    pub fn is_dynamic(&self) -> bool {
        self.input_ports.iter().chain(&self.output_ports).any(|p| !p.shape.is_static())
    }

    pub fn bind_input(&mut self, port: usize, memory: Memory) {
        if let Some(slot) = self.inputs.get_mut(port) {
            *slot = Some(memory);
        }
    }

    pub fn bind_output(&mut self, port: usize, memory: Memory) {
        if let Some(slot) = self.outputs.get_mut(port) {
            *slot = Some(memory);
        }
    }

    pub fn input_memory(&self, port: usize) -> Result<&Memory> {
        self.inputs.get(port).and_then(Option::as_ref).context(InvalidConfigurationSnafu {
            reason: format!("node '{}' has no memory bound to input {port}", self.name),
        })
    }

    pub fn output_memory(&self, port: usize) -> Result<&Memory> {
        self.outputs.get(port).and_then(Option::as_ref).context(InvalidConfigurationSnafu {
            reason: format!("node '{}' has no memory bound to output {port}", self.name),
        })
    }

    /// Check if every non-constant input has memory bound.
    pub fn inputs_bound(&self) -> bool {
        self.input_ports.iter().zip(&self.inputs).all(|(port, memory)| port.is_constant() || memory.is_some())
    }

    pub fn outputs_bound(&self) -> bool {
        self.outputs.iter().all(Option::is_some)
    }

    /// Current dims of every bound non-constant input.
    pub fn live_input_dims(&self) -> Result<Vec<VectorDims>> {
        let mut dims = Vec::new();
        for (port, memory) in self.input_ports.iter().zip(&self.inputs) {
            if port.is_constant() {
                continue;
            }
            if let Some(memory) = memory {
                dims.push(memory.desc().dims()?);
            }
        }
        Ok(dims)
    }

    pub fn supported(&self) -> &[NodeDesc] {
        &self.supported
    }

    pub fn add_supported(&mut self, desc: NodeDesc) {
        self.supported.push(desc);
    }

    pub fn selected(&self) -> Option<&NodeDesc> {
        self.selected.and_then(|i| self.supported.get(i))
    }

    pub fn selected_mut(&mut self) -> Option<&mut NodeDesc> {
        self.selected.and_then(|i| self.supported.get_mut(i))
    }

    pub fn select(&mut self, index: usize) -> Result<()> {
        ensure!(
            index < self.supported.len(),
            InvalidConfigurationSnafu { reason: format!("node '{}' has no descriptor {index}", self.name) }
        );
        self.selected = Some(index);
        Ok(())
    }

    /// Selected descriptor or an error naming the node.
    pub fn require_selected(&self) -> Result<&NodeDesc> {
        self.selected().context(InvalidConfigurationSnafu {
            reason: format!("node '{}': preferable primitive descriptor is not set", self.name),
        })
    }

    pub fn fused(&self) -> &[Arc<dyn PostOpSource>] {
        &self.fused
    }

    /// Append a fused operation. Evaluation order is append order.
    pub fn add_fused(&mut self, source: Arc<dyn PostOpSource>) {
        debug!(node = %self.name, fused = source.name(), "fused into node");
        self.fused.push(source);
        self.post_ops = None;
    }

    /// Inputs of this node plus every operand its fused operations add.
    pub fn total_fused_inputs(&self) -> usize {
        self.input_ports.len() + self.fused.iter().map(|f| f.fused_inputs()).sum::<usize>()
    }

    /// Post-op chain of the fused operations, built on first use.
    pub fn post_ops(&mut self, allocator: &Arc<dyn Allocator>) -> Result<&(PostOps, PostOpOperands)> {
        if self.post_ops.is_none() {
            let channel_axis = tessel_device::Layout::CHANNEL_AXIS;
            let channels = self.output_ports.first().and_then(|p| p.shape.dims().get(channel_axis)?.as_static());

            let mut builder = PostOps::builder();
            for source in &self.fused {
                source.append_post_ops(&mut builder, channel_axis, channels, allocator)?;
            }
            self.post_ops = Some(builder.build());
        }
        self.post_ops.as_ref().context(InvalidConfigurationSnafu { reason: "post-ops were not built".to_string() })
    }

    /// Output precision once fused conversions are applied.
    pub fn output_precision(&self, port: usize) -> Precision {
        let precision = self.output_ports.get(port).map_or(Precision::F32, |p| p.precision);
        self.fused.iter().rev().find_map(|source| source.convert_target()).unwrap_or(precision)
    }

    /// Bind the operand memories of the fused chain.
    pub fn bind_post_op_operands(&self, args: &mut ExecArgs) {
        if let Some((_, operands)) = &self.post_ops {
            for (index, memory) in operands {
                args.bind(Arg::PostOp(*index), memory.clone());
            }
        }
    }

    pub fn prepared_dims(&self) -> Option<&[VectorDims]> {
        self.prepared_dims.as_deref()
    }

    pub fn set_prepared_dims(&mut self, dims: Vec<VectorDims>) {
        self.prepared_dims = Some(dims);
    }
}

impl std::fmt::Debug for NodeBase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeBase")
            .field("name", &self.name)
            .field("supported", &self.supported.len())
            .field("selected", &self.selected)
            .field("fused", &self.fused.len())
            .finish()
    }
}

pub trait Node: Send {
    fn base(&self) -> &NodeBase;
    fn base_mut(&mut self) -> &mut NodeBase;

    fn name(&self) -> &str {
        self.base().name()
    }

    /// Enumerate candidate descriptors for the input ports.
    fn supported_descriptors(&mut self) -> Result<()>;

    /// Turn candidate descriptors into supported primitive descriptors.
    fn init_supported_primitive_descriptors(&mut self, ctx: &GraphContext) -> Result<()>;

    /// Pick the first supported descriptor whose implementation type comes
    /// first in the context's priority list, or the first one at all.
    fn select_optimal_primitive_descriptor(&mut self, ctx: &GraphContext) -> Result<()> {
        let base = self.base_mut();
        ensure!(
            !base.supported().is_empty(),
            InvalidConfigurationSnafu { reason: format!("node '{}' has no supported primitive descriptors", base.name()) }
        );

        let priority = ctx.config().priority();
        let index = priority
            .iter()
            .find_map(|wanted| base.supported().iter().position(|d| d.impl_type == *wanted))
            .unwrap_or(0);

        debug!(node = %base.name(), impl_type = %base.supported()[index].impl_type, "selected descriptor");
        base.select(index)
    }

    /// Validate and finalize the selected descriptor.
    fn init_optimal_primitive_descriptor(&mut self) -> Result<()> {
        self.base().require_selected().map(|_| ())
    }

    /// Check if the executor has to be rebuilt for the current input dims.
    fn need_prepare_params(&self) -> bool {
        let base = self.base();
        match (base.prepared_dims(), base.live_input_dims()) {
            (Some(prepared), Ok(live)) => prepared != live.as_slice(),
            _ => true,
        }
    }

    /// Build or fetch the executor for the current input descriptors.
    fn prepare_params(&mut self, ctx: &GraphContext) -> Result<()>;

    /// Prepare right away when shapes are static and memory is bound.
    fn create_primitive(&mut self, ctx: &GraphContext) -> Result<()> {
        let base = self.base();
        if !base.is_dynamic() && base.inputs_bound() && base.outputs_bound() {
            self.prepare_params(ctx)?;
        }
        Ok(())
    }

    fn execute(&self, ctx: &GraphContext) -> Result<()>;

    fn execute_dynamic(&self, ctx: &GraphContext) -> Result<()> {
        self.execute(ctx)
    }

    /// Check if `child` can be folded into this node as post-ops.
    fn can_fuse(&self, _child: &dyn Node) -> bool {
        false
    }

    fn as_eltwise(&self) -> Option<&Eltwise> {
        None
    }
}

/// Create the node that handles `op`.
pub fn create_node(op: &Operation) -> Result<Box<dyn Node>> {
    Ok(match op.kind {
        OpKind::Softmax { .. } | OpKind::SoftmaxV8 { .. } => Box::new(Softmax::new(op)?),
        _ => Box::new(Eltwise::new(op)?),
    })
}

/// Run the compile-time lifecycle of `node`.
pub fn compile(node: &mut dyn Node, ctx: &GraphContext) -> Result<()> {
    node.supported_descriptors()?;
    node.init_supported_primitive_descriptors(ctx)?;
    node.select_optimal_primitive_descriptor(ctx)?;
    node.init_optimal_primitive_descriptor()?;
    node.create_primitive(ctx)
}

/// Execute `node`, preparing it again first when its input dims changed.
pub fn run(node: &mut dyn Node, ctx: &GraphContext) -> Result<()> {
    if !node.base().is_dynamic() {
        return node.execute(ctx);
    }
    if node.need_prepare_params() {
        node.prepare_params(ctx)?;
    }
    node.execute_dynamic(ctx)
}
