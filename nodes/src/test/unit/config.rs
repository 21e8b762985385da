use tessel_runtime::{ImplType, Isa};
use test_case::test_case;

use crate::config::parse_priority;
use crate::{Config, IsaCap};

#[test]
fn test_builder_defaults() {
    let config = Config::builder().build();
    assert!(!config.force_ref);
    assert!(config.shape_agnostic);
    assert_eq!(config.isa, IsaCap::Host);
    assert_eq!(config.impl_priority, ImplType::DEFAULT_PRIORITY);
}

#[test]
fn test_force_ref_priority() {
    let config = Config::builder().force_ref(true).build();
    assert_eq!(config.priority(), vec![ImplType::REF_ANY, ImplType::REF]);

    let config = Config::builder().impl_priority(vec![ImplType::JIT_SSE42]).build();
    assert_eq!(config.priority(), vec![ImplType::JIT_SSE42]);
}

#[test_case("jit_avx2,ref_any", vec![ImplType::JIT_AVX2, ImplType::REF_ANY]; "plain list")]
#[test_case(" jit_avx512 , bogus ,ref", vec![ImplType::JIT_AVX512, ImplType::REF]; "unknown entries skipped")]
#[test_case(",,", vec![]; "empty entries")]
fn test_parse_priority(value: &str, expected: Vec<ImplType>) {
    assert_eq!(parse_priority(value), expected);
}

#[test_case(IsaCap::Force(Isa::Sse42), Some(Isa::Sse42); "forced")]
#[test_case(IsaCap::Disabled, None; "disabled")]
fn test_isa_cap_resolve(cap: IsaCap, expected: Option<Isa>) {
    assert_eq!(cap.resolve(), expected);
}

#[test]
fn test_isa_cap_never_exceeds_cap() {
    let resolved = IsaCap::Cap(Isa::Sse42).resolve();
    assert!(resolved.is_none_or(|isa| isa == Isa::Sse42));
}
