//! Node configuration.
//!
//! Provides typed configuration with a bon builder and environment variable
//! fallbacks.

use bon::bon;
use tessel_runtime::devices::cpu::parse_isa_cap;
use tessel_runtime::{ImplType, Isa};
use tracing::warn;

/// ISA tier selection for the CPU backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum IsaCap {
    /// Widest tier the host supports (default).
    #[default]
    Host,
    /// Host tier, but no wider than the given one.
    Cap(Isa),
    /// Exactly the given tier regardless of the host.
    Force(Isa),
    /// Reference kernels only.
    Disabled,
}

impl IsaCap {
    pub fn resolve(self) -> Option<Isa> {
        match self {
            Self::Host => Isa::detect(),
            Self::Cap(isa) => Isa::detect().min(Some(isa)),
            Self::Force(isa) => Some(isa),
            Self::Disabled => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Request reference implementations for every node.
    pub force_ref: bool,
    /// Allow the shape-agnostic eltwise executor for dynamic nodes.
    pub shape_agnostic: bool,
    /// ISA tiers the CPU backend may offer.
    pub isa: IsaCap,
    /// Implementation types in order of preference.
    pub impl_priority: Vec<ImplType>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            force_ref: false,
            shape_agnostic: true,
            isa: IsaCap::Host,
            impl_priority: ImplType::DEFAULT_PRIORITY.to_vec(),
        }
    }
}

#[bon]
impl Config {
    /// Create a configuration with builder pattern.
    #[builder]
    pub fn builder(
        #[builder(default = false)] force_ref: bool,
        #[builder(default = true)] shape_agnostic: bool,
        #[builder(default)] isa: IsaCap,
        #[builder(default = ImplType::DEFAULT_PRIORITY.to_vec())] impl_priority: Vec<ImplType>,
    ) -> Self {
        Self { force_ref, shape_agnostic, isa, impl_priority }
    }

    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// * `TESSEL_FORCE_REF=1` - Request `ref_any` for every node
    /// * `TESSEL_DISABLE_SHAPE_AGNOSTIC=1` - Never pick the shape-agnostic eltwise executor
    /// * `TESSEL_ISA` - Cap the ISA tier (`sse42`, `avx2`, `avx512`, `none`)
    /// * `TESSEL_IMPL_PRIORITY` - Comma separated implementation types, e.g. `jit_avx2,ref_any`
    pub fn from_env() -> Self {
        let force_ref = env_flag("TESSEL_FORCE_REF");
        let shape_agnostic = !env_flag("TESSEL_DISABLE_SHAPE_AGNOSTIC");

        let isa = match std::env::var("TESSEL_ISA").ok() {
            Some(value) => match parse_isa_cap(&value) {
                Some(Some(isa)) => IsaCap::Cap(isa),
                Some(None) => IsaCap::Disabled,
                None => {
                    warn!(value = %value, "unknown TESSEL_ISA, using host tier");
                    IsaCap::Host
                }
            },
            None => IsaCap::Host,
        };

        let impl_priority = std::env::var("TESSEL_IMPL_PRIORITY")
            .ok()
            .map(|value| parse_priority(&value))
            .filter(|priority| !priority.is_empty())
            .unwrap_or_else(|| ImplType::DEFAULT_PRIORITY.to_vec());

        Self { force_ref, shape_agnostic, isa, impl_priority }
    }

    /// Priority list effectively used for descriptor selection.
    pub fn priority(&self) -> Vec<ImplType> {
        if self.force_ref { vec![ImplType::REF_ANY, ImplType::REF] } else { self.impl_priority.clone() }
    }
}

fn env_flag(name: &str) -> bool {
    std::env::var(name).is_ok_and(|value| matches!(value.as_str(), "1" | "true" | "yes" | "on"))
}

/// Parse a comma separated list of implementation types, skipping unknown entries.
pub fn parse_priority(value: &str) -> Vec<ImplType> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(ImplType::parse)
        .filter(|impl_type| *impl_type != ImplType::UNKNOWN)
        .collect()
}
