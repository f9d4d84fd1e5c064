//! Stack safety for the recursive passes.
//!
//! Parser, resolver and interpreter all recurse once per syntactic nesting
//! level (and the interpreter once more per call).  Wrapping those recursion
//! points in [`ensure_sufficient_stack`] grows the native stack on demand, so
//! deep programs hit the interpreter's own call‑depth budget instead of
//! crashing the process.

/// If less than this remains, grow the stack.
const RED_ZONE: usize = 100 * 1024;

/// Size of each additional stack segment.
const STACK_PER_RECURSION: usize = 1024 * 1024;

#[inline]
pub fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    stacker::maybe_grow(RED_ZONE, STACK_PER_RECURSION, f)
}
