//! Execution context shared by the nodes of one compiled graph.

use std::sync::Arc;

use tessel_device::{Allocator, CpuAllocator, Scratchpad};
use tessel_runtime::{Backend, CpuBackend, MultiCache};

use crate::config::Config;

/// Owns the executor cache, the backend and the scratchpad of one graph.
///
/// Nothing here is global: two contexts never share cached executors.
#[derive(Debug)]
pub struct GraphContext {
    config: Config,
    isa: Option<tessel_runtime::Isa>,
    cache: MultiCache,
    backend: Arc<dyn Backend>,
    allocator: Arc<dyn Allocator>,
    scratchpad: Scratchpad,
}

impl GraphContext {
    /// Context with the CPU backend for `config.isa`.
    pub fn new(config: Config) -> Self {
        let backend = Arc::new(CpuBackend::with_isa(config.isa.resolve()));
        Self::with_backend(config, backend)
    }

    pub fn with_backend(config: Config, backend: Arc<dyn Backend>) -> Self {
        let allocator: Arc<dyn Allocator> = Arc::new(CpuAllocator);
        Self {
            isa: config.isa.resolve(),
            config,
            cache: MultiCache::new(),
            backend,
            scratchpad: Scratchpad::new(Arc::clone(&allocator)),
            allocator,
        }
    }

    pub fn from_env() -> Self {
        Self::new(Config::from_env())
    }

    /// ISA tier the optimized kernels of this context run at.
    pub fn isa(&self) -> Option<tessel_runtime::Isa> {
        self.isa
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn cache(&self) -> &MultiCache {
        &self.cache
    }

    pub fn backend(&self) -> &dyn Backend {
        self.backend.as_ref()
    }

    pub fn allocator(&self) -> &Arc<dyn Allocator> {
        &self.allocator
    }

    pub fn scratchpad(&self) -> &Scratchpad {
        &self.scratchpad
    }
}

impl Default for GraphContext {
    fn default() -> Self {
        Self::new(Config::default())
    }
}
