use std::sync::Arc;

use tessel_device::{MemoryDesc, MemoryDescPtr};
use tessel_dtype::Precision;
use test_case::test_case;

use crate::selector::accepts;
use crate::{
    Backend, Candidate, Error, ImplType, OpDesc, Primitive, PrimitiveAttr, PrimitiveRequest, Result, select,
    select_candidate,
};

#[test_case(&[ImplType::REF_ANY, ImplType::JIT_AVX2], ImplType::JIT_AVX2, ImplType::JIT_AVX2; "exact match later")]
#[test_case(&[ImplType::JIT_AVX512, ImplType::JIT_AVX2], ImplType::JIT_AVX2, ImplType::JIT_AVX2; "skips wider tier")]
#[test_case(&[ImplType::REF, ImplType::JIT_SSE42, ImplType::REF_ANY], ImplType::REF_ANY, ImplType::JIT_SSE42; "ref_any accepts jit")]
#[test_case(&[ImplType::GEMM_BLAS, ImplType::REF], ImplType::JIT_AVX512, ImplType::GEMM_BLAS; "falls back to first")]
#[test_case(&[ImplType::REF_ANY], ImplType::UNKNOWN, ImplType::REF_ANY; "single candidate")]
fn test_select(candidates: &[ImplType], requested: ImplType, expected: ImplType) {
    assert_eq!(select(candidates.iter().copied(), requested, |t| *t), Some(expected));
}

#[test]
fn test_select_empty() {
    assert_eq!(select(std::iter::empty::<ImplType>(), ImplType::REF_ANY, |t| *t), None);
}

#[test]
fn test_jit_request_does_not_accept_ref() {
    assert!(!accepts(ImplType::JIT_AVX2, ImplType::REF_ANY));
    assert!(!accepts(ImplType::REF, ImplType::JIT_AVX2));
    assert!(accepts(ImplType::REF_ANY, ImplType::JIT_AVX512));
}

#[test]
fn test_select_returns_first_accepted_position() {
    // Two candidates of the same type: the earlier one wins
    let candidates = [(0, ImplType::REF), (1, ImplType::JIT_AVX2), (2, ImplType::JIT_AVX2)];
    assert_eq!(select(candidates, ImplType::JIT_AVX2, |c| c.1).map(|c| c.0), Some(1));
}

#[derive(Debug)]
struct EmptyBackend;

impl Backend for EmptyBackend {
    fn name(&self) -> &str {
        "empty"
    }

    fn candidates(&self, _request: &PrimitiveRequest) -> Result<Vec<Box<dyn Candidate>>> {
        Ok(Vec::new())
    }
}

struct NamedCandidate(&'static str);

impl Candidate for NamedCandidate {
    fn info(&self) -> &str {
        self.0
    }

    fn scratchpad_desc(&self) -> MemoryDescPtr {
        Arc::new(MemoryDesc::planar(Precision::U8, &[0]))
    }

    fn create(self: Box<Self>) -> Result<Box<dyn Primitive>> {
        unimplemented!("never built in selection tests")
    }
}

#[derive(Debug)]
struct NamedBackend(&'static [&'static str]);

impl Backend for NamedBackend {
    fn name(&self) -> &str {
        "named"
    }

    fn candidates(&self, _request: &PrimitiveRequest) -> Result<Vec<Box<dyn Candidate>>> {
        Ok(self.0.iter().map(|name| Box::new(NamedCandidate(name)) as Box<dyn Candidate>).collect())
    }
}

fn request() -> PrimitiveRequest {
    let desc = Arc::new(MemoryDesc::planar(Precision::F32, &[2, 8]));
    PrimitiveRequest::new(OpDesc::Softmax { src: desc.clone(), dst: desc, axis: 1 }, PrimitiveAttr::default())
}

#[test]
fn test_select_candidate_empty_is_unavailable() {
    let result = select_candidate(&EmptyBackend, &request(), ImplType::REF_ANY);
    assert!(matches!(result, Err(Error::KernelUnavailable { .. })));
}

#[test]
fn test_select_candidate_classifies_by_info() {
    let backend = NamedBackend(&["gemm:blas", "jit:avx512_core", "jit:avx2", "ref:any"]);
    assert_eq!(select_candidate(&backend, &request(), ImplType::JIT_AVX2).unwrap().info(), "jit:avx2");
    assert_eq!(select_candidate(&backend, &request(), ImplType::REF_ANY).unwrap().info(), "jit:avx512_core");
    assert_eq!(select_candidate(&backend, &request(), ImplType::ACL).unwrap().info(), "gemm:blas");
}

#[test]
#[tracing_test::traced_test]
fn test_fallback_is_logged() {
    let backend = NamedBackend(&["gemm:blas", "ref:any"]);
    assert_eq!(select_candidate(&backend, &request(), ImplType::JIT_AVX512).unwrap().info(), "gemm:blas");
    assert!(logs_contain("no candidate matched, using the first one"));
}

#[test]
#[tracing_test::traced_test]
fn test_exact_match_is_not_a_fallback() {
    let backend = NamedBackend(&["gemm:blas", "jit:avx2"]);
    assert_eq!(select_candidate(&backend, &request(), ImplType::JIT_AVX2).unwrap().info(), "jit:avx2");
    assert!(logs_contain("selected kernel"));
    assert!(!logs_contain("no candidate matched"));
}
