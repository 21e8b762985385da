use super::*;
use enumset::{EnumSet, enum_set};

/// Targets a downstream convert may be folded into an upstream kernel as.
const FUSABLE_CONVERT_TARGETS: EnumSet<Precision> =
    enum_set!(Precision::I8 | Precision::U8 | Precision::F16 | Precision::BF16 | Precision::F32);

impl Precision {
    /// Check if a conversion to `to` can run as a fused post-op.
    ///
    /// The optimized kernels only emit saturating stores for these targets,
    /// anything else has to stay a standalone node.
    pub fn can_fuse_convert(self, to: Self) -> bool {
        !self.is_bool() && FUSABLE_CONVERT_TARGETS.contains(to)
    }

    /// Round and clamp an f32 value to the representable range of `self`.
    ///
    /// Floating point targets pass through the narrowing conversion of the
    /// storage format, integers round half away from zero and saturate.
    pub fn saturate(self, value: f32) -> f32 {
        let clamp = |lo: f32, hi: f32| {
            if value.is_nan() {
                0.0
            } else {
                value.round().clamp(lo, hi)
            }
        };

        match self {
            Self::Bool => (value != 0.0) as u8 as f32,
            Self::U8 => clamp(u8::MIN as f32, u8::MAX as f32),
            Self::I8 => clamp(i8::MIN as f32, i8::MAX as f32),
            Self::U16 => clamp(u16::MIN as f32, u16::MAX as f32),
            Self::I16 => clamp(i16::MIN as f32, i16::MAX as f32),
            Self::I32 => clamp(i32::MIN as f32, i32::MAX as f32),
            Self::BF16 => half::bf16::from_f32(value).to_f32(),
            Self::F16 => half::f16::from_f32(value).to_f32(),
            Self::F32 => value,
        }
    }
}
