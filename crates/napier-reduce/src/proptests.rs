//! Property-based tests for the rewriting pipeline.

#[cfg(test)]
mod tests {
    use napier_core::node::NodeKind;
    use napier_core::{EmptyContext, Expression, Pool, PoolError, ReductionContext};
    use proptest::prelude::*;

    use crate::approx::approximate;
    use crate::beautify::deep_beautify;
    use crate::engine::{reduce, ReductionConfig};
    use crate::serialize::{serialize_to_string, FloatDisplayMode};

    /// A pool-free description of a tree, so strategies stay plain data.
    #[derive(Clone, Debug)]
    enum Recipe {
        Int(i64),
        Rat(i64, i64),
        Opp(Box<Recipe>),
        Sub(Box<Recipe>, Box<Recipe>),
        Div(Box<Recipe>, Box<Recipe>),
        Add(Vec<Recipe>),
        Mul(Vec<Recipe>),
        PercentSimple(Box<Recipe>),
        PercentAddition(Box<Recipe>, Box<Recipe>),
    }

    fn build(pool: &mut Pool, r: &Recipe) -> Result<Expression, PoolError> {
        match r {
            Recipe::Int(v) => Expression::integer(pool, *v),
            Recipe::Rat(n, d) => Expression::rational(pool, *n, *d),
            Recipe::Opp(a) => {
                let a = build(pool, a)?;
                Expression::opposite(pool, a)
            }
            Recipe::Sub(a, b) => {
                let a = build(pool, a)?;
                let b = build(pool, b)?;
                Expression::subtraction(pool, a, b)
            }
            Recipe::Div(a, b) => {
                let a = build(pool, a)?;
                let b = build(pool, b)?;
                Expression::division(pool, a, b)
            }
            Recipe::Add(parts) => {
                let mut children = Vec::with_capacity(parts.len());
                for p in parts {
                    children.push(build(pool, p)?);
                }
                Expression::addition(pool, &children)
            }
            Recipe::Mul(parts) => {
                let mut children = Vec::with_capacity(parts.len());
                for p in parts {
                    children.push(build(pool, p)?);
                }
                Expression::multiplication(pool, &children)
            }
            Recipe::PercentSimple(a) => {
                let a = build(pool, a)?;
                Expression::percent_simple(pool, a)
            }
            Recipe::PercentAddition(a, b) => {
                let a = build(pool, a)?;
                let b = build(pool, b)?;
                Expression::percent_addition(pool, a, b)
            }
        }
    }

    // Strategy for generating numeral leaves
    fn leaf() -> impl Strategy<Value = Recipe> {
        prop_oneof![
            (-50i64..50).prop_map(Recipe::Int),
            ((-50i64..50), (1i64..20)).prop_map(|(n, d)| Recipe::Rat(n, d)),
        ]
    }

    // Strategy for generating whole trees, a few levels deep
    fn tree() -> impl Strategy<Value = Recipe> {
        leaf().prop_recursive(4, 24, 3, |inner| {
            prop_oneof![
                inner.clone().prop_map(|a| Recipe::Opp(Box::new(a))),
                (inner.clone(), inner.clone())
                    .prop_map(|(a, b)| Recipe::Sub(Box::new(a), Box::new(b))),
                (inner.clone(), inner.clone())
                    .prop_map(|(a, b)| Recipe::Div(Box::new(a), Box::new(b))),
                prop::collection::vec(inner.clone(), 2..4).prop_map(Recipe::Add),
                prop::collection::vec(inner.clone(), 2..4).prop_map(Recipe::Mul),
                inner.clone().prop_map(|a| Recipe::PercentSimple(Box::new(a))),
                (inner.clone(), inner)
                    .prop_map(|(a, b)| Recipe::PercentAddition(Box::new(a), Box::new(b))),
            ]
        })
    }

    fn close_enough(a: Option<f64>, b: Option<f64>) -> bool {
        match (a, b) {
            (None, None) => true,
            (Some(a), Some(b)) => {
                let scale = a.abs().max(b.abs()).max(1.0);
                (a - b).abs() <= 1e-6 * scale
            }
            _ => false,
        }
    }

    proptest! {
        // Percent semantics

        #[test]
        fn percent_simple_is_division_by_hundred(a in -1000i64..1000) {
            let mut pool = Pool::new(64);
            let compute = EmptyContext;
            let ctx = ReductionContext::system(&compute);
            let v = Expression::integer(&mut pool, a).unwrap();
            let p = Expression::percent_simple(&mut pool, v).unwrap();
            let got = approximate::<f64>(&pool, &p, &ctx).to_scalar();
            prop_assert_eq!(got, Some(a as f64 / 100.0));
        }

        #[test]
        fn percent_addition_scales_the_base(a in -1000i64..1000, b in -200i64..200) {
            let mut pool = Pool::new(64);
            let compute = EmptyContext;
            let ctx = ReductionContext::system(&compute);
            let base = Expression::integer(&mut pool, a).unwrap();
            let delta = Expression::integer(&mut pool, b).unwrap();
            let p = Expression::percent_addition(&mut pool, base, delta).unwrap();
            let got = approximate::<f64>(&pool, &p, &ctx).to_scalar();
            let want = a as f64 * (1.0 + b as f64 / 100.0);
            prop_assert!(close_enough(got, Some(want)));
        }

        // Pipeline stages preserve the numeric value

        #[test]
        fn reduce_preserves_the_value(recipe in tree()) {
            let mut pool = Pool::new(4096);
            let compute = EmptyContext;
            let ctx = ReductionContext::system(&compute);
            let e = build(&mut pool, &recipe).unwrap();
            let before = approximate::<f64>(&pool, &e, &ctx).to_scalar();
            let r = reduce(&mut pool, e, &ctx, &ReductionConfig::default()).unwrap();
            let after = approximate::<f64>(&pool, &r, &ctx).to_scalar();
            prop_assert!(
                close_enough(before, after),
                "value drifted: {before:?} vs {after:?}"
            );
            pool.check_consistency();
        }

        #[test]
        fn beautify_preserves_the_value(recipe in tree()) {
            let mut pool = Pool::new(8192);
            let compute = EmptyContext;
            let ctx = ReductionContext::system(&compute);
            let e = build(&mut pool, &recipe).unwrap();
            let r = reduce(&mut pool, e, &ctx, &ReductionConfig::default()).unwrap();
            let before = approximate::<f64>(&pool, &r, &ctx).to_scalar();
            let b = deep_beautify(&mut pool, r).unwrap();
            let after = approximate::<f64>(&pool, &b, &ctx).to_scalar();
            prop_assert!(
                close_enough(before, after),
                "beautify drifted: {before:?} vs {after:?}"
            );
            pool.check_consistency();
        }

        #[test]
        fn reduce_is_idempotent(recipe in tree()) {
            let mut pool = Pool::new(8192);
            let compute = EmptyContext;
            let ctx = ReductionContext::system(&compute);
            let cfg = ReductionConfig::default();
            let e = build(&mut pool, &recipe).unwrap();
            let once = reduce(&mut pool, e, &ctx, &cfg).unwrap();
            let snapshot = once.clone_in(&mut pool).unwrap();
            let once = once.refreshed(&pool);
            let twice = reduce(&mut pool, once, &ctx, &cfg).unwrap();
            prop_assert!(twice.is_identical_to(&pool, snapshot.refreshed(&pool)));
        }

        #[test]
        fn serialization_is_total(recipe in tree()) {
            let mut pool = Pool::new(4096);
            let e = build(&mut pool, &recipe).unwrap();
            let s = serialize_to_string(&pool, e, FloatDisplayMode::Decimal, 7);
            prop_assert!(!s.is_empty());
        }

        // Exhaustion and rollback

        #[test]
        fn rollback_restores_the_high_water_mark(capacity in 8usize..64) {
            let mut pool = Pool::new(capacity);
            let kept = Expression::integer(&mut pool, 7).unwrap();
            let mark = pool.len();

            let cp = pool.begin();
            loop {
                match pool.allocate(NodeKind::Integer(1)) {
                    Ok(_) => {}
                    Err(PoolError::OutOfSpace { .. }) => break,
                }
            }
            prop_assert_eq!(pool.available(), 0);
            pool.abort(cp);

            prop_assert_eq!(pool.len(), mark);
            prop_assert_eq!(kept.refreshed(&pool).kind(&pool), NodeKind::Integer(7));
            pool.check_consistency();
        }
    }
}
