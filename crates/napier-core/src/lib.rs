//! # napier-core
//!
//! Core expression engine for the Napier symbolic calculator.
//!
//! This crate provides:
//! - A fixed-capacity arena ("pool") storing every expression node in
//!   preorder-contiguous slots
//! - A closed set of node kinds with per-kind arity and properties
//! - Lightweight, copyable expression handles with value semantics
//! - Checkpoint/rollback recovery for pool exhaustion
//!
//! ## Design Principles
//!
//! - **Fixed memory**: the pool never grows past its construction-time
//!   capacity; exhaustion is a recoverable `Result`, not a panic
//! - **Preorder layout**: a node's children occupy slots immediately after
//!   its own, so subtree copy and discard are contiguous-range operations
//! - **Short-lived handles**: structural mutators return fresh handles and
//!   a pool generation counter catches stale ones in debug builds

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod context;
pub mod error;
pub mod expression;
pub mod node;
pub mod pool;
mod proptests;

pub use context::{AngleUnit, ComputeContext, EmptyContext, ReductionContext, ReductionTarget};
pub use error::PoolError;
pub use expression::Expression;
pub use node::{BuiltinFunction, NodeKind, Slot, SymbolId, Trinary};
pub use pool::{Checkpoint, NodeId, Pool};
