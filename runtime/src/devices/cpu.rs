//! CPU backend with ISA-tiered kernel candidates.
//!
//! The ISA cap can be selected via:
//! - `TESSEL_ISA` environment variable (`sse42`, `avx2`, `avx512`, or `none`)
//! - Explicit [`CpuBackend::with_isa`] call
//!
//! Without either, the host ISA is detected at construction.

use std::str::FromStr;

use snafu::ensure;
use tessel_device::MemoryDesc;
use tessel_dtype::Precision;
use tracing::trace;

use super::softmax::{SoftmaxCandidate, SoftmaxKernel};
use crate::error::{Result, UnsupportedOperationSnafu};
use crate::impl_type::ImplType;
use crate::primitive::{Backend, Candidate, OpDesc, PrimitiveRequest};

/// Vector instruction set tier, ordered from narrowest to widest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[derive(strum::Display, strum::EnumString, strum::VariantArray)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Isa {
    Sse42,
    Avx2,
    Avx512,
}

impl Isa {
    /// Widest tier supported by the host.
    pub fn detect() -> Option<Self> {
        #[cfg(target_arch = "x86_64")]
        {
            if is_x86_feature_detected!("avx512f") {
                return Some(Self::Avx512);
            }
            if is_x86_feature_detected!("avx2") {
                return Some(Self::Avx2);
            }
            if is_x86_feature_detected!("sse4.2") {
                return Some(Self::Sse42);
            }
        }
        None
    }

    pub fn impl_type(self) -> ImplType {
        match self {
            Self::Sse42 => ImplType::JIT_SSE42,
            Self::Avx2 => ImplType::JIT_AVX2,
            Self::Avx512 => ImplType::JIT_AVX512,
        }
    }

    /// Check if the tier has kernels for `precision`.
    ///
    /// Narrow float formats are only converted in hardware from avx512 on.
    pub fn supports(self, precision: Precision) -> bool {
        match precision {
            Precision::F32 => true,
            Precision::BF16 | Precision::F16 => self == Self::Avx512,
            _ => false,
        }
    }
}

/// Parse an ISA cap, `none` disables the optimized tiers.
pub fn parse_isa_cap(value: &str) -> Option<Option<Isa>> {
    if value.eq_ignore_ascii_case("none") {
        return Some(None);
    }
    Isa::from_str(value).ok().map(Some)
}

#[derive(Debug, Clone)]
pub struct CpuBackend {
    isa: Option<Isa>,
}

impl CpuBackend {
    /// Backend for the detected host ISA.
    pub fn new() -> Self {
        Self { isa: Isa::detect() }
    }

    /// Backend for the detected host ISA, capped by `TESSEL_ISA` when set.
    pub fn from_env() -> Self {
        let detected = Isa::detect();
        let isa = match std::env::var("TESSEL_ISA").ok().as_deref().and_then(parse_isa_cap) {
            Some(cap) => detected.min(cap),
            None => detected,
        };
        Self { isa }
    }

    /// Backend offering optimized tiers up to `isa`, or none for `None`.
    pub fn with_isa(isa: Option<Isa>) -> Self {
        Self { isa }
    }

    pub fn isa(&self) -> Option<Isa> {
        self.isa
    }

    /// Optimized tiers usable for a softmax over `axis`, widest first.
    fn jit_tiers(&self, src: &MemoryDesc, dst: &MemoryDesc, axis: usize) -> Vec<Isa> {
        let Some(cap) = self.isa else { return Vec::new() };
        if !src.is_dense_axis(axis) || src.layout() != dst.layout() {
            return Vec::new();
        }

        <Isa as strum::VariantArray>::VARIANTS
            .iter()
            .rev()
            .copied()
            .filter(|isa| *isa <= cap && isa.supports(src.precision()))
            .collect()
    }
}

impl Default for CpuBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for CpuBackend {
    fn name(&self) -> &str {
        "cpu"
    }

    fn candidates(&self, request: &PrimitiveRequest) -> Result<Vec<Box<dyn Candidate>>> {
        match &request.op {
            OpDesc::Softmax { src, dst, axis } => {
                let axis = *axis;
                ensure!(
                    axis < src.rank(),
                    UnsupportedOperationSnafu { reason: format!("softmax axis {axis} out of range for {src}") }
                );
                ensure!(
                    src.is_defined() && dst.is_defined() && src.shape() == dst.shape(),
                    UnsupportedOperationSnafu { reason: format!("softmax expects equal defined shapes, got {src} -> {dst}") }
                );

                let mut candidates: Vec<Box<dyn Candidate>> = Vec::new();
                for isa in self.jit_tiers(src, dst, axis) {
                    candidates.push(Box::new(SoftmaxCandidate::new(
                        SoftmaxKernel::Jit(isa),
                        src.clone(),
                        dst.clone(),
                        axis,
                        request.attr.post_ops.clone(),
                    )?));
                }
                candidates.push(Box::new(SoftmaxCandidate::new(
                    SoftmaxKernel::Ref,
                    src.clone(),
                    dst.clone(),
                    axis,
                    request.attr.post_ops.clone(),
                )?));

                trace!(count = candidates.len(), request = %request, "enumerated candidates");
                Ok(candidates)
            }
        }
    }
}
