//! Error types for kernel selection and execution.

use snafu::Snafu;

use crate::primitive::Arg;

/// Result type for runtime operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// The operator variant or attribute combination is not implemented.
    #[snafu(display("unsupported operation: {reason}"))]
    UnsupportedOperation { reason: String },

    /// A selected descriptor or config failed an internal consistency check.
    #[snafu(display("invalid configuration: {reason}"))]
    InvalidConfiguration { reason: String },

    /// Candidate enumeration or kernel creation produced nothing usable.
    #[snafu(display("no kernel available for {request}"))]
    KernelUnavailable { request: String },

    /// `execute` was called before the executor was prepared.
    #[snafu(display("node '{node}' doesn't have an initialized executor"))]
    ExecutorNotInitialized { node: String },

    /// A memory argument required by the kernel was not bound.
    #[snafu(display("missing kernel argument {arg:?}"))]
    MissingArgument { arg: Arg },

    #[snafu(display("memory error: {source}"))]
    Device { source: tessel_device::Error },
}

impl From<tessel_device::Error> for Error {
    fn from(source: tessel_device::Error) -> Self {
        Self::Device { source }
    }
}
