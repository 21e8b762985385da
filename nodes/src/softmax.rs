//! Softmax node.

use std::hash::{Hash, Hasher};
use std::sync::Arc;

use snafu::ensure;
use tessel_device::{Layout, Memory, MemoryDesc, MemoryDescPtr, same_desc};
use tessel_dtype::Precision;
use tessel_runtime::error::{
    ExecutorNotInitializedSnafu, InvalidConfigurationSnafu, Result, UnsupportedOperationSnafu,
};
use tessel_runtime::{
    Arg, CacheKey, ExecArgs, ImplType, OpDesc, PrimitiveAttr, PrimitiveExecutor, PrimitiveExecutorPtr,
    PrimitiveRequest, hash_combine, hash_key, select_candidate,
};
use tracing::{debug, instrument};

use crate::context::GraphContext;
use crate::fusion;
use crate::node::{Node, NodeBase, NodeConfig, NodeDesc, PortConfig};
use crate::op::{OpKind, Operation};

/// Identity of a cached softmax executor.
#[derive(Debug, Clone)]
pub struct SoftmaxKey {
    pub src: MemoryDescPtr,
    pub impl_type: ImplType,
    pub axis: usize,
    pub attr: PrimitiveAttr,
}

impl CacheKey for SoftmaxKey {
    fn hash_value(&self) -> u64 {
        let mut seed = 0;
        seed = hash_combine(seed, &self.src.content_hash());
        seed = hash_combine(seed, &self.impl_type);
        seed = hash_combine(seed, &self.axis);
        hash_combine(seed, &self.attr)
    }
}

impl PartialEq for SoftmaxKey {
    fn eq(&self, other: &Self) -> bool {
        same_desc(&self.src, &other.src)
            && self.impl_type == other.impl_type
            && self.axis == other.axis
            && self.attr == other.attr
    }
}

impl Eq for SoftmaxKey {}

impl Hash for SoftmaxKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        hash_key(self, state)
    }
}

impl SoftmaxKey {
    /// Request the key describes. The destination mirrors the source with the
    /// precision the fused chain ends in.
    pub fn request(&self) -> Result<PrimitiveRequest> {
        let dst_precision = self.attr.post_ops.output_precision(self.src.precision());
        let dst = if dst_precision == self.src.precision() {
            Arc::clone(&self.src)
        } else {
            Arc::new(MemoryDesc::new(dst_precision, self.src.shape().clone(), self.src.layout())?)
        };
        Ok(PrimitiveRequest::new(
            OpDesc::Softmax { src: Arc::clone(&self.src), dst, axis: self.axis },
            self.attr.clone(),
        ))
    }
}

#[derive(Debug)]
pub struct Softmax {
    base: NodeBase,
    axis: usize,
    descs: Vec<MemoryDescPtr>,
    executor: Option<PrimitiveExecutorPtr>,
    scratchpad: Option<Memory>,
}

impl Softmax {
    /// Check if `op` can be handled by this node.
    pub fn is_supported_operation(op: &Operation) -> Result<()> {
        match op.kind {
            OpKind::Softmax { axis } => {
                let rank = op.inputs.first().map_or(0, |p| p.shape.rank());
                ensure!(
                    axis < rank,
                    UnsupportedOperationSnafu { reason: format!("softmax axis {axis} is out of range for rank {rank}") }
                );
                Ok(())
            }
            _ => UnsupportedOperationSnafu { reason: "Only v1 Softmax operation is supported".to_string() }.fail(),
        }
    }

    pub fn new(op: &Operation) -> Result<Self> {
        Self::is_supported_operation(op)?;
        let OpKind::Softmax { axis } = op.kind else {
            return UnsupportedOperationSnafu { reason: format!("{} is not a softmax", op.kind) }.fail();
        };
        Ok(Self {
            base: NodeBase::new(op.name.clone(), op.inputs.clone(), op.outputs.clone()),
            axis,
            descs: Vec::new(),
            executor: None,
            scratchpad: None,
        })
    }

    pub fn axis(&self) -> usize {
        self.axis
    }

    /// Candidate input descriptors from [`Node::supported_descriptors`].
    pub fn descriptors(&self) -> &[MemoryDescPtr] {
        &self.descs
    }

    pub fn executor(&self) -> Option<&PrimitiveExecutorPtr> {
        self.executor.as_ref()
    }

    fn attr(&mut self, ctx: &GraphContext) -> Result<PrimitiveAttr> {
        let (post_ops, _) = self.base.post_ops(ctx.allocator())?;
        Ok(PrimitiveAttr::with_post_ops(post_ops.clone()))
    }
}

impl Node for Softmax {
    fn base(&self) -> &NodeBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut NodeBase {
        &mut self.base
    }

    fn supported_descriptors(&mut self) -> Result<()> {
        if !self.descs.is_empty() {
            return Ok(());
        }

        let name = self.base.name().to_string();
        ensure!(
            self.base.input_ports().len() == 1,
            InvalidConfigurationSnafu { reason: format!("node '{name}': incorrect number of input edges") }
        );
        ensure!(
            !self.base.output_ports().is_empty(),
            InvalidConfigurationSnafu { reason: format!("node '{name}': incorrect number of output edges") }
        );

        let input = &self.base.input_ports()[0];
        let precision = match input.precision {
            p @ (Precision::F32 | Precision::BF16 | Precision::F16) => p,
            _ => Precision::F32,
        };
        let shape = input.shape.clone();

        if shape.rank() == 3 {
            self.descs.push(Arc::new(MemoryDesc::new(precision, shape.clone(), Layout::Planar)?));
        }

        for layout in Layout::available_for_rank(shape.rank()) {
            let desc = MemoryDesc::new(precision, shape.clone(), layout)?;
            if desc.blocks_extended() {
                continue;
            }
            self.descs.push(Arc::new(desc));
        }
        Ok(())
    }

    fn init_supported_primitive_descriptors(&mut self, ctx: &GraphContext) -> Result<()> {
        if !self.base.supported().is_empty() {
            return Ok(());
        }

        let attr = self.attr(ctx)?;
        for desc in self.descs.clone() {
            let defined = if desc.is_defined() { Arc::clone(&desc) } else { Arc::new(desc.make_dummy()?) };
            let request = PrimitiveRequest::new(
                OpDesc::Softmax { src: Arc::clone(&defined), dst: defined, axis: self.axis },
                attr.clone(),
            );

            // Requests the backend rejects are skipped
            let candidates = match ctx.backend().candidates(&request) {
                Ok(candidates) => candidates,
                Err(error) => {
                    debug!(node = %self.base.name(), %desc, %error, "descriptor rejected by backend");
                    continue;
                }
            };

            for candidate in candidates {
                self.base.add_supported(NodeDesc {
                    config: NodeConfig {
                        inputs: vec![PortConfig::new(Arc::clone(&desc))],
                        outputs: vec![PortConfig::new(Arc::clone(&desc))],
                    },
                    impl_type: candidate.impl_type(),
                });
            }
        }
        Ok(())
    }

    fn init_optimal_primitive_descriptor(&mut self) -> Result<()> {
        let dynamic = self.base.is_dynamic();
        let name = self.base.name().to_string();
        let selected = self.base.require_selected()?;
        if dynamic {
            return Ok(());
        }

        let config = &selected.config;
        let consistent = config.inputs.len() == 1
            && config.outputs.len() == 1
            && !(config.inputs[0].desc.is_defined()
                && config.outputs[0].desc.is_defined()
                && !config.outputs[0].desc.is_compatible(&config.inputs[0].desc));
        ensure!(consistent, InvalidConfigurationSnafu { reason: format!("node '{name}' has incorrect selected config") });

        let input = Arc::clone(&config.inputs[0].desc);
        if let Some(selected) = self.base.selected_mut() {
            selected.config.outputs[0].desc = input;
        }
        Ok(())
    }

    #[instrument(skip_all, fields(node = %self.base.name()))]
    fn prepare_params(&mut self, ctx: &GraphContext) -> Result<()> {
        let src = Arc::clone(self.base.input_memory(0)?.desc());
        let impl_type = self.base.require_selected()?.impl_type;
        let key = SoftmaxKey { src, impl_type, axis: self.axis, attr: self.attr(ctx)? };

        let (executor, status) = ctx.cache().get_or_create(&key, |key| {
            let request = key.request()?;
            let candidate = select_candidate(ctx.backend(), &request, key.impl_type)?;
            PrimitiveExecutor::new(candidate).map(Arc::new)
        })?;
        debug!(?status, info = executor.info(), "softmax executor ready");

        self.scratchpad = Some(ctx.scratchpad().memory(Arc::clone(executor.scratchpad_desc()))?);
        self.executor = Some(executor);
        let dims = self.base.live_input_dims()?;
        self.base.set_prepared_dims(dims);
        Ok(())
    }

    fn execute(&self, _ctx: &GraphContext) -> Result<()> {
        let (Some(executor), Some(scratchpad)) = (&self.executor, &self.scratchpad) else {
            return ExecutorNotInitializedSnafu { node: self.base.name().to_string() }.fail();
        };

        let mut args = ExecArgs::new();
        args.bind(Arg::Scratchpad, scratchpad.clone())
            .bind(Arg::Src(0), self.base.input_memory(0)?.clone())
            .bind(Arg::Dst, self.base.output_memory(0)?.clone());
        self.base.bind_post_op_operands(&mut args);
        executor.exec(&args)
    }

    fn can_fuse(&self, child: &dyn Node) -> bool {
        fusion::can_fuse_into(&self.base, true, child)
    }
}
