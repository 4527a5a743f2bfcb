//! # Napier
//!
//! A pool-allocated symbolic expression engine.
//!
//! Napier keeps every expression tree in one fixed-capacity pool of
//! preorder-contiguous nodes, built for environments where allocation
//! must be bounded up front. On top of the pool sits a rewriting
//! pipeline: exact reduction to a canonical form, beautification into
//! display shape, numeric approximation, and flat or two-dimensional
//! rendering.
//!
//! ## Quick Start
//!
//! ```rust
//! use napier::prelude::*;
//!
//! let mut pool = Pool::new(256);
//! let compute = EmptyContext;
//! let ctx = ReductionContext::user(&compute);
//!
//! let a = Expression::integer(&mut pool, 2).unwrap();
//! let b = Expression::integer(&mut pool, 3).unwrap();
//! let sum = Expression::addition(&mut pool, &[a, b]).unwrap();
//!
//! let r = reduce(&mut pool, sum, &ctx, &ReductionConfig::default()).unwrap();
//! assert_eq!(serialize_to_string(&pool, r, FloatDisplayMode::Decimal, 7), "5");
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub use napier_core as core;
pub use napier_reduce as reduce;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use napier_core::{
        AngleUnit, ComputeContext, EmptyContext, Expression, NodeKind, Pool, PoolError,
        ReductionContext, ReductionTarget,
    };
    pub use napier_reduce::{
        approximate, beautify, create_layout, reduce, reduce_with_fallback, serialize,
        serialize_to_string, Evaluation, FloatDisplayMode, Layout, ReductionConfig,
    };
}
