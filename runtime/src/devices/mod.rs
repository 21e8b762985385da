//! Backend implementations.

pub mod cpu;
pub mod softmax;

pub use cpu::{CpuBackend, Isa};
