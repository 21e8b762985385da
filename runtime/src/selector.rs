//! Implementation selection over an ordered candidate sequence.

use snafu::OptionExt;
use tracing::{debug, trace, warn};

use crate::error::{KernelUnavailableSnafu, Result};
use crate::impl_type::ImplType;
use crate::primitive::{Backend, Candidate, PrimitiveRequest};

/// Check if a candidate of type `actual` satisfies a request for `requested`.
///
/// Exact matches always do. A request for the generic reference type also
/// accepts any member of the optimized family.
pub fn accepts(requested: ImplType, actual: ImplType) -> bool {
    actual == requested || (requested == ImplType::REF_ANY && actual.is_jit())
}

/// Pick the first candidate accepted for `requested`, or the first candidate at all.
///
/// Returns `None` only for an empty sequence. Deterministic for a fixed
/// sequence and request.
pub fn select<C>(
    candidates: impl IntoIterator<Item = C>,
    requested: ImplType,
    classify: impl Fn(&C) -> ImplType,
) -> Option<C> {
    let mut candidates = candidates.into_iter();
    let first = candidates.next()?;

    let first_type = classify(&first);
    trace!(candidate = %first_type, %requested, "walking candidates");
    if accepts(requested, first_type) {
        return Some(first);
    }

    for candidate in candidates {
        let actual = classify(&candidate);
        trace!(candidate = %actual, %requested, "walking candidates");
        if accepts(requested, actual) {
            return Some(candidate);
        }
    }

    warn!(%requested, fallback = %first_type, "no candidate matched, using the first one");
    Some(first)
}

/// Enumerate `request` on `backend` and select a candidate for `requested`.
pub fn select_candidate(
    backend: &dyn Backend,
    request: &PrimitiveRequest,
    requested: ImplType,
) -> Result<Box<dyn Candidate>> {
    let candidates = backend.candidates(request)?;
    let selected = select(candidates, requested, |c| c.impl_type())
        .context(KernelUnavailableSnafu { request: request.to_string() })?;
    debug!(backend = backend.name(), info = selected.info(), %requested, "selected kernel");
    Ok(selected)
}
