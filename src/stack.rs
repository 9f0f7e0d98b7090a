//! Native stack headroom for the recursive passes.
//!
//! Parsing, resolving and evaluating all recurse once per nesting level of
//! the source, and evaluation additionally recurses once per Lox call. Deep
//! but valid programs must not abort the process, so each recursive entry
//! point runs through [`ensure_sufficient_stack`], which moves onto a freshly
//! allocated segment when the current one runs low.

/// Grow when less than this much stack remains (100KB).
const RED_ZONE: usize = 100 * 1024;

/// Size of each new stack segment (1MB).
const STACK_PER_RECURSION: usize = 1024 * 1024;

/// Run `f`, first switching to a new stack segment if the current one is
/// inside the red zone.
#[inline]
#[cfg(not(target_arch = "wasm32"))]
pub fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    stacker::maybe_grow(RED_ZONE, STACK_PER_RECURSION, f)
}

/// WASM manages its own stack.
#[inline]
#[cfg(target_arch = "wasm32")]
pub fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    f()
}
