//! # napier-reduce
//!
//! The multi-pass rewriting pipeline of the Napier expression engine:
//!
//! - `reduce` — exact simplification to a canonical form (post-order)
//! - `beautify` — exact-preserving rewrite for human display
//! - `approximate` — numeric evaluation to a real or complex scalar
//! - `serialize` / `create_layout` — textual and 2-D visual projection
//!
//! The pipeline per expression is terminal-state oriented:
//! `Parsed → (reduce) → Reduced → (beautify) → Beautified`, with
//! approximation and serialization as read-only projections from any
//! state. Pool exhaustion mid-rewrite is recovered through checkpoints
//! ([`engine::reduce_with_fallback`]); the mathematically undefined value
//! flows through every stage as a node/evaluation, never as an error.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod approx;
pub mod beautify;
pub mod engine;
pub mod layout;
pub mod reduce;
pub mod serialize;

#[cfg(test)]
mod proptests;

pub use approx::{approximate, Evaluation};
pub use beautify::deep_beautify;
pub use engine::{beautify, reduce, reduce_with_fallback, ReductionConfig};
pub use layout::{create_layout, Layout};
pub use serialize::{serialize, serialize_to_string, FloatDisplayMode};
