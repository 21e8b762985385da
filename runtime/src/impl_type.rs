//! Implementation type classification of kernels.
//!
//! An [`ImplType`] is a set of [`ImplFlag`]s, e.g. `jit_avx512` or `ref_any`.
//! Backends that know what they built return it directly from
//! [`Candidate::impl_type`](crate::primitive::Candidate::impl_type); the
//! [`ImplType::parse`] adapter recovers it from a descriptive info string for
//! the ones that don't.

use std::fmt;
use std::str::FromStr;

use enumset::{EnumSet, EnumSetType, enum_set};

/// Single classification tag, in canonical display order.
#[derive(Debug, Hash, PartialOrd, Ord, EnumSetType)]
pub enum ImplFlag {
    Ref,
    Jit,
    Gemm,
    Brgemm,
    Sse42,
    Avx2,
    Avx512,
    Amx,
    Uni,
    Conv1x1,
    Dw,
    Blas,
    Acl,
    Any,
}

impl ImplFlag {
    const fn token(self) -> &'static str {
        match self {
            Self::Ref => "ref",
            Self::Jit => "jit",
            Self::Gemm => "gemm",
            Self::Brgemm => "brgemm",
            Self::Sse42 => "sse42",
            Self::Avx2 => "avx2",
            Self::Avx512 => "avx512",
            Self::Amx => "amx",
            Self::Uni => "uni",
            Self::Conv1x1 => "1x1",
            Self::Dw => "dw",
            Self::Blas => "blas",
            Self::Acl => "acl",
            Self::Any => "any",
        }
    }

    fn from_token(token: &str) -> Option<Self> {
        Some(match token {
            "ref" => Self::Ref,
            "jit" => Self::Jit,
            "gemm" => Self::Gemm,
            "brg" | "brgemm" | "brgconv" => Self::Brgemm,
            "sse41" | "sse42" => Self::Sse42,
            "avx2" => Self::Avx2,
            "avx512" => Self::Avx512,
            "amx" => Self::Amx,
            "uni" => Self::Uni,
            "1x1" => Self::Conv1x1,
            "dw" => Self::Dw,
            "blas" | "mlas" => Self::Blas,
            "acl" => Self::Acl,
            "any" => Self::Any,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ImplType(EnumSet<ImplFlag>);

impl ImplType {
    pub const UNKNOWN: Self = Self(EnumSet::empty());
    pub const REF: Self = Self(enum_set!(ImplFlag::Ref));
    pub const REF_ANY: Self = Self(enum_set!(ImplFlag::Ref | ImplFlag::Any));
    pub const JIT_SSE42: Self = Self(enum_set!(ImplFlag::Jit | ImplFlag::Sse42));
    pub const JIT_AVX2: Self = Self(enum_set!(ImplFlag::Jit | ImplFlag::Avx2));
    pub const JIT_AVX512: Self = Self(enum_set!(ImplFlag::Jit | ImplFlag::Avx512));
    pub const JIT_AVX512_AMX: Self = Self(enum_set!(ImplFlag::Jit | ImplFlag::Avx512 | ImplFlag::Amx));
    pub const BRGEMM_AVX512: Self = Self(enum_set!(ImplFlag::Brgemm | ImplFlag::Avx512));
    pub const GEMM_BLAS: Self = Self(enum_set!(ImplFlag::Gemm | ImplFlag::Blas));
    pub const ACL: Self = Self(enum_set!(ImplFlag::Acl));

    /// Order in which implementations are preferred when nothing else is configured.
    pub const DEFAULT_PRIORITY: &[Self] = &[
        Self::UNKNOWN,
        Self::BRGEMM_AVX512,
        Self::JIT_AVX512_AMX,
        Self::JIT_AVX512,
        Self::JIT_AVX2,
        Self::JIT_SSE42,
        Self::GEMM_BLAS,
        Self::ACL,
        Self::REF_ANY,
        Self::REF,
    ];

    pub fn new(flags: EnumSet<ImplFlag>) -> Self {
        Self(flags)
    }

    pub fn flags(&self) -> EnumSet<ImplFlag> {
        self.0
    }

    pub fn contains(&self, flag: ImplFlag) -> bool {
        self.0.contains(flag)
    }

    /// Check if this is a member of the optimized (`jit`) family.
    pub fn is_jit(&self) -> bool {
        self.contains(ImplFlag::Jit)
    }

    pub fn is_ref(&self) -> bool {
        self.contains(ImplFlag::Ref)
    }

    /// Classify a backend's descriptive implementation name.
    ///
    /// The name is split into alphanumeric tokens and every known token
    /// contributes its flag, so `"jit:avx512_core"` yields `jit_avx512` and
    /// `"brgemm:avx512_amx"` yields `brgemm_avx512_amx`. Unknown tokens are
    /// ignored; a name with no known token is [`ImplType::UNKNOWN`].
    pub fn parse(name: &str) -> Self {
        let lower = name.to_ascii_lowercase();
        Self(lower.split(|c: char| !c.is_ascii_alphanumeric()).filter_map(ImplFlag::from_token).collect())
    }
}

impl From<ImplFlag> for ImplType {
    fn from(flag: ImplFlag) -> Self {
        Self(EnumSet::only(flag))
    }
}

impl fmt::Display for ImplType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "unknown");
        }
        for (i, flag) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "_")?;
            }
            write!(f, "{}", flag.token())?;
        }
        Ok(())
    }
}

impl FromStr for ImplType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}
