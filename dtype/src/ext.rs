use super::*;

/// Rust scalar types that map onto a storage precision.
pub trait HasPrecision: Copy {
    const PRECISION: Precision;

    fn to_f32(self) -> f32;
    fn from_f32(value: f32) -> Self;
}

macro_rules! impl_precision_ext {
    ($($ty:ty => $precision:expr),* $(,)?) => {
        $(impl HasPrecision for $ty {
            const PRECISION: Precision = $precision;

            fn to_f32(self) -> f32 {
                self as f32
            }

            fn from_f32(value: f32) -> Self {
                $precision.saturate(value) as $ty
            }
        })*
    };
}

impl_precision_ext! {
    u8 => Precision::U8, i8 => Precision::I8,
    u16 => Precision::U16, i16 => Precision::I16, i32 => Precision::I32,
    f32 => Precision::F32,
}

impl HasPrecision for half::f16 {
    const PRECISION: Precision = Precision::F16;

    fn to_f32(self) -> f32 {
        half::f16::to_f32(self)
    }

    fn from_f32(value: f32) -> Self {
        half::f16::from_f32(value)
    }
}

impl HasPrecision for half::bf16 {
    const PRECISION: Precision = Precision::BF16;

    fn to_f32(self) -> f32 {
        half::bf16::to_f32(self)
    }

    fn from_f32(value: f32) -> Self {
        half::bf16::from_f32(value)
    }
}
