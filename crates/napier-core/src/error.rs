//! Engine error types.

use thiserror::Error;

/// Errors that can occur while allocating in the expression pool.
///
/// `OutOfSpace` is the only recoverable failure in the engine: every other
/// internal inconsistency (arity mismatch, stale handle, malformed layout)
/// means the tree is already corrupt and is treated as a programming-error
/// assertion instead.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum PoolError {
    /// The pool cannot fit the requested number of slots.
    #[error("expression pool exhausted: requested {requested} slots, {available} available")]
    OutOfSpace {
        /// Number of slots the failed operation needed.
        requested: usize,
        /// Number of free slots at the time of the failure.
        available: usize,
    },
}
