//! Pipeline drivers: multi-pass reduction, beautification, and the
//! checkpointed degrade-to-numeric fallback for pool exhaustion.

use napier_core::node::NodeKind;
use napier_core::{Expression, Pool, PoolError, ReductionContext};

use crate::approx::{approximate, Evaluation};
use crate::reduce::deep_reduce_once;

/// Tuning knobs for the reduction driver.
#[derive(Clone, Copy, Debug)]
pub struct ReductionConfig {
    /// Subtrees deeper than this are left unreduced.
    pub max_depth: usize,
    /// Upper bound on full reduction passes before giving up on a
    /// fixpoint.
    pub max_passes: usize,
}

impl Default for ReductionConfig {
    fn default() -> Self {
        ReductionConfig {
            max_depth: 64,
            max_passes: 4,
        }
    }
}

/// Reduces `e` in place until a fixpoint (or the pass bound) is reached.
///
/// The returned handle addresses the reduced tree; `e` itself is stale
/// after this call.
pub fn reduce(
    pool: &mut Pool,
    e: Expression,
    ctx: &ReductionContext<'_>,
    config: &ReductionConfig,
) -> Result<Expression, PoolError> {
    let mut current = e;
    for pass in 0..config.max_passes {
        let (next, changed) = deep_reduce_once(pool, current, ctx, config.max_depth)?;
        current = next;
        if !changed {
            tracing::debug!(pass, "reduction reached a fixpoint");
            return Ok(current);
        }
    }
    tracing::debug!(
        max_passes = config.max_passes,
        "reduction stopped at the pass bound"
    );
    Ok(current)
}

/// Rewrites a reduced tree into its display form.
///
/// A thin wrapper over [`deep_beautify`](crate::beautify::deep_beautify)
/// so callers drive the whole pipeline from one module.
pub fn beautify(pool: &mut Pool, e: Expression) -> Result<Expression, PoolError> {
    crate::beautify::deep_beautify(pool, e)
}

/// Reduces `e`, falling back to a one-node numeric approximation if the
/// pool fills up mid-rewrite.
///
/// The attempt runs on a clone inside a checkpoint, so a failed rewrite
/// leaves the pool exactly as it was. Only when even the single
/// fallback node does not fit is the error escalated.
pub fn reduce_with_fallback(
    pool: &mut Pool,
    e: Expression,
    ctx: &ReductionContext<'_>,
    config: &ReductionConfig,
) -> Result<Expression, PoolError> {
    let attempt = pool.try_or_rollback(|pool| {
        let work = e.clone_in(pool)?;
        reduce(pool, work, ctx, config)
    });
    match attempt {
        Ok(reduced) => e.refreshed(pool).replace_with_in_place(pool, reduced),
        Err(err) => {
            tracing::warn!(%err, "reduction ran out of pool space, degrading to numeric");
            let e = e.refreshed(pool);
            let kind = match approximate::<f64>(pool, &e, ctx) {
                Evaluation::Real(v) if v.is_finite() => NodeKind::Float(v),
                _ => NodeKind::Undefined,
            };
            let leaf = Expression::from_id(pool.allocate(kind)?);
            e.replace_with_in_place(pool, leaf)
        }
    }
}

#[cfg(test)]
mod tests {
    use napier_core::EmptyContext;

    use super::*;

    #[test]
    fn fallback_degrades_to_a_single_float() {
        // Capacity 16: room for the source tree and the fallback leaf,
        // but not for a cloned working copy.
        let mut pool = Pool::new(16);
        let compute = EmptyContext;
        let ctx = ReductionContext::system(&compute);

        let mut terms = Vec::new();
        for v in 1..=10 {
            terms.push(Expression::integer(&mut pool, v).unwrap());
        }
        let sum = Expression::addition(&mut pool, &terms).unwrap();
        assert_eq!(pool.len(), 11);

        let r = reduce_with_fallback(&mut pool, sum, &ctx, &ReductionConfig::default()).unwrap();
        assert_eq!(r.kind(&pool), NodeKind::Float(55.0));
        assert_eq!(pool.len(), 1);
        pool.check_consistency();
    }

    #[test]
    fn fallback_is_invisible_when_space_suffices() {
        let mut pool = Pool::new(256);
        let compute = EmptyContext;
        let ctx = ReductionContext::system(&compute);

        let a = Expression::integer(&mut pool, 2).unwrap();
        let b = Expression::integer(&mut pool, 3).unwrap();
        let sum = Expression::addition(&mut pool, &[a, b]).unwrap();
        let r = reduce_with_fallback(&mut pool, sum, &ctx, &ReductionConfig::default()).unwrap();
        assert_eq!(r.kind(&pool), NodeKind::Integer(5));
        assert_eq!(pool.len(), 1);
        pool.check_consistency();
    }

    #[test]
    fn pass_bound_caps_the_work() {
        let mut pool = Pool::new(64);
        let compute = EmptyContext;
        let ctx = ReductionContext::system(&compute);
        let cfg = ReductionConfig {
            max_depth: 64,
            max_passes: 1,
        };

        let a = Expression::integer(&mut pool, 1).unwrap();
        let b = Expression::integer(&mut pool, 2).unwrap();
        let e = Expression::subtraction(&mut pool, a, b).unwrap();
        // One pass is enough here; the point is that the bound is honored.
        let r = reduce(&mut pool, e, &ctx, &cfg).unwrap();
        assert_eq!(r.kind(&pool), NodeKind::Integer(-1));
    }
}
