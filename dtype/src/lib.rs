pub mod cast;
pub mod element;
pub mod ext;


/// Element precision of a tensor buffer.
///
/// Discriminant order is the storage order used by [`Precision::max_of`] to
/// break ties, so keep integer types ahead of floating point ones.
#[derive(Debug, Hash, PartialOrd, Ord)]
#[derive(strum::EnumCount, strum::EnumIter, strum::VariantArray, strum::Display, strum::EnumString)]
#[derive(enumset::EnumSetType)]
#[cfg_attr(any(test, feature = "proptest"), derive(proptest_derive::Arbitrary))]
#[strum(serialize_all = "lowercase")]
#[enumset(repr = "u32")]
pub enum Precision {
    Bool = 0,
    U8 = 1,
    I8 = 2,
    U16 = 3,
    I16 = 4,
    I32 = 5,
    BF16 = 6,
    F16 = 7,
    F32 = 8,
}

impl Precision {
    pub const fn bytes(&self) -> usize {
        match self {
            Self::Bool => 1,
            Self::U8 => 1,
            Self::I8 => 1,
            Self::U16 => 2,
            Self::I16 => 2,
            Self::I32 => 4,
            Self::BF16 => 2,
            Self::F16 => 2,
            Self::F32 => 4,
        }
    }

    pub const fn bits(&self) -> usize {
        self.bytes() * 8
    }

    pub const fn is_bool(&self) -> bool {
        matches!(self, Self::Bool)
    }

    pub const fn is_signed(&self) -> bool {
        matches!(self, Self::I8 | Self::I16 | Self::I32)
    }

    pub const fn is_unsigned(&self) -> bool {
        matches!(self, Self::U8 | Self::U16)
    }

    pub const fn is_int(&self) -> bool {
        self.is_signed() || self.is_unsigned()
    }

    pub const fn is_float(&self) -> bool {
        matches!(self, Self::BF16 | Self::F16 | Self::F32)
    }

    /// Widest precision of the given set.
    ///
    /// Width is compared in bytes only; on a tie the first one seen wins, so
    /// `[bf16, f16]` yields `bf16`.
    pub fn max_of(precisions: impl IntoIterator<Item = Self>) -> Option<Self> {
        precisions.into_iter().fold(None, |best, p| match best {
            Some(b) if b.bytes() >= p.bytes() => Some(b),
            _ => Some(p),
        })
    }
}
