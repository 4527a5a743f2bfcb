//! Property-based tests for the pool and its structural mutators.
