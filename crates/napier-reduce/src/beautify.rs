//! Display-form rewriting.
//!
//! Beautification runs top-down after reduction: each node is rewritten
//! into the shape a reader expects (percent marks become ratios, sums
//! absorb negative terms as subtractions, a leading negative factor
//! floats out as a minus sign), then explicit parenthesis nodes are
//! inserted wherever the serialized text would otherwise regroup. The
//! rewrite is value-preserving; approximation before and after agrees.

use napier_core::node::{self, NodeKind};
use napier_core::{Expression, Pool, PoolError};

/// Rewrites the whole tree rooted at `e` into display form and returns
/// the new handle.
pub fn deep_beautify(pool: &mut Pool, e: Expression) -> Result<Expression, PoolError> {
    if e.kind(pool) == NodeKind::PercentAddition {
        return beautify_percent_addition(pool, e);
    }
    let e = shallow_beautify(pool, e)?;
    deep_beautify_children(pool, e)
}

/// Beautifies and parenthesizes children without touching the node's own
/// shape.
fn deep_beautify_children(pool: &mut Pool, e: Expression) -> Result<Expression, PoolError> {
    let mut node = e;
    for i in 0..node.number_of_children(pool) {
        let child = node.child_at_index(pool, i);
        deep_beautify(pool, child)?;
        node = node.refreshed(pool);
        if child_needs_parentheses(pool, node, i) {
            wrap_child_in_parentheses(pool, node, i)?;
            node = node.refreshed(pool);
        }
    }
    Ok(node)
}

/// `a ± b%` becomes `a × (1 ± b/100)`.
///
/// The ratio child keeps the exact `1 ± b/100` shape: its own shallow
/// rewrite is skipped so the sum is not reordered or re-absorbed, only
/// the grandchildren are beautified.
fn beautify_percent_addition(pool: &mut Pool, e: Expression) -> Result<Expression, PoolError> {
    let m = shallow_beautify(pool, e)?;

    let base = m.child_at_index(pool, 0);
    deep_beautify(pool, base)?;
    let mut m = m.refreshed(pool);
    if child_needs_parentheses(pool, m, 0) {
        wrap_child_in_parentheses(pool, m, 0)?;
        m = m.refreshed(pool);
    }

    let ratio = m.child_at_index(pool, 1);
    deep_beautify_children(pool, ratio)?;
    let m = m.refreshed(pool);
    wrap_child_in_parentheses(pool, m, 1)?;
    Ok(m.refreshed(pool))
}

/// Rewrites one node into display form, leaving children untouched.
fn shallow_beautify(pool: &mut Pool, e: Expression) -> Result<Expression, PoolError> {
    match e.kind(pool) {
        NodeKind::PercentSimple => {
            // a% reads as a/100.
            let num = e.child_at_index(pool, 0).clone_in(pool)?;
            let hundred = Expression::integer(pool, 100)?;
            let div = Expression::division(pool, num, hundred)?;
            e.replace_with_in_place(pool, div)
        }
        NodeKind::PercentAddition => {
            let base = e.child_at_index(pool, 0).clone_in(pool)?;
            let one = Expression::integer(pool, 1)?;
            let delta = e.child_at_index(pool, 1).clone_in(pool)?;
            let positive = delta.make_positive_any_negative_numeral_factor(pool)?;
            let one = one.refreshed(pool);
            let base = base.refreshed(pool);
            let (delta, subtract) = if positive.is_uninitialized() {
                (delta.refreshed(pool), false)
            } else {
                (positive, true)
            };
            let hundred = Expression::integer(pool, 100)?;
            let ratio_term = Expression::division(pool, delta, hundred)?;
            let ratio = if subtract {
                Expression::subtraction(pool, one, ratio_term)?
            } else {
                Expression::addition(pool, &[one, ratio_term])?
            };
            let product = Expression::multiplication(pool, &[base, ratio])?;
            e.refreshed(pool).replace_with_in_place(pool, product)
        }
        NodeKind::Addition { .. } => beautify_addition(pool, e),
        NodeKind::Multiplication { .. } => beautify_multiplication(pool, e),
        _ => Ok(e),
    }
}

/// Turns `x + (-y) + (-3)` into the chain `x - y - 3`.
fn beautify_addition(pool: &mut Pool, e: Expression) -> Result<Expression, PoolError> {
    let n = e.number_of_children(pool);
    let any_negative = (1..n).any(|i| {
        let c = e.child_at_index(pool, i);
        let kind = c.kind(pool);
        kind == NodeKind::Opposite
            || kind.is_negative_numeral()
            || (matches!(kind, NodeKind::Multiplication { .. })
                && c.child_at_index(pool, 0).kind(pool).is_negative_numeral())
    });
    if !any_negative {
        return Ok(e);
    }

    let mut acc = e.child_at_index(pool, 0).clone_in(pool)?;
    for i in 1..n {
        let term = e.refreshed(pool).child_at_index(pool, i).clone_in(pool)?;
        let positive = term.make_positive_any_negative_numeral_factor(pool)?;
        let acc_now = acc.refreshed(pool);
        acc = if positive.is_uninitialized() {
            let kinds = [acc_now, term.refreshed(pool)];
            Expression::addition(pool, &kinds)?
        } else {
            Expression::subtraction(pool, acc_now, positive)?
        };
    }
    e.refreshed(pool).replace_with_in_place(pool, acc)
}

/// Floats a leading negative factor out as an opposite: `(-2)·x` reads
/// `-(2·x)` and `(-x)·y` reads `-(x·y)`.
fn beautify_multiplication(pool: &mut Pool, e: Expression) -> Result<Expression, PoolError> {
    let first = e.child_at_index(pool, 0).kind(pool);
    // |i64::MIN| does not fit, so that factor stays put.
    let flips = first.is_negative_numeral() && node::numeral_neg(first).is_some();
    if !flips && first != NodeKind::Opposite {
        return Ok(e);
    }
    let work = e.clone_in(pool)?;
    let positive = if first == NodeKind::Opposite {
        work.child_at_index(pool, 0)
            .make_positive_any_negative_numeral_factor(pool)?;
        work.refreshed(pool)
    } else {
        work.make_positive_any_negative_numeral_factor(pool)?
    };
    let wrapped = Expression::opposite(pool, positive)?;
    e.refreshed(pool).replace_with_in_place(pool, wrapped)
}

/// Whether the serialized text of child `i` would regroup without an
/// explicit parenthesis node.
fn child_needs_parentheses(pool: &Pool, parent: Expression, i: usize) -> bool {
    let child_kind = parent.child_at_index(pool, i).kind(pool);
    match parent.kind(pool) {
        NodeKind::Multiplication { .. } => {
            matches!(
                child_kind,
                NodeKind::Addition { .. } | NodeKind::Subtraction
            ) || (child_kind == NodeKind::Opposite && i > 0)
        }
        NodeKind::Opposite => {
            matches!(
                child_kind,
                NodeKind::Addition { .. } | NodeKind::Subtraction
            )
        }
        NodeKind::Subtraction if i == 1 => {
            matches!(
                child_kind,
                NodeKind::Addition { .. } | NodeKind::Subtraction | NodeKind::Opposite
            )
        }
        _ => false,
    }
}

fn wrap_child_in_parentheses(
    pool: &mut Pool,
    parent: Expression,
    i: usize,
) -> Result<Expression, PoolError> {
    let child = parent.child_at_index(pool, i);
    let inner = child.clone_in(pool)?;
    let wrapped = Expression::parenthesis(pool, inner)?;
    child.refreshed(pool).replace_with_in_place(pool, wrapped)
}

#[cfg(test)]
mod tests {
    use napier_core::node::BuiltinFunction;
    use napier_core::{EmptyContext, ReductionContext};

    use super::*;
    use crate::approx::approximate;
    use crate::serialize::{serialize_to_string, FloatDisplayMode};

    fn text(pool: &Pool, e: Expression) -> String {
        serialize_to_string(pool, e, FloatDisplayMode::Decimal, 7)
    }

    #[test]
    fn percent_simple_becomes_a_ratio() {
        let mut pool = Pool::new(128);
        let v = Expression::integer(&mut pool, 20).unwrap();
        let p = Expression::percent_simple(&mut pool, v).unwrap();
        let b = deep_beautify(&mut pool, p).unwrap();
        assert_eq!(text(&pool, b), "20/100");
        pool.check_consistency();
    }

    #[test]
    fn percent_addition_with_negative_delta() {
        let mut pool = Pool::new(128);
        let a = Expression::integer(&mut pool, 5).unwrap();
        let three = Expression::integer(&mut pool, 3).unwrap();
        let b = Expression::opposite(&mut pool, three).unwrap();
        let p = Expression::percent_addition(&mut pool, a, b).unwrap();
        let b = deep_beautify(&mut pool, p).unwrap();
        assert_eq!(text(&pool, b), "5×(1-3/100)");
        pool.check_consistency();
    }

    #[test]
    fn percent_addition_with_positive_delta() {
        let mut pool = Pool::new(128);
        let a = Expression::integer(&mut pool, 5).unwrap();
        let b = Expression::integer(&mut pool, 3).unwrap();
        let p = Expression::percent_addition(&mut pool, a, b).unwrap();
        let b = deep_beautify(&mut pool, p).unwrap();
        assert_eq!(text(&pool, b), "5×(1+3/100)");
    }

    #[test]
    fn sums_absorb_negative_terms() {
        let mut pool = Pool::new(128);
        let x = Expression::symbol(&mut pool, "x").unwrap();
        let y = Expression::symbol(&mut pool, "y").unwrap();
        let neg_y = Expression::opposite(&mut pool, y).unwrap();
        let sum = Expression::addition(&mut pool, &[x, neg_y]).unwrap();
        let b = deep_beautify(&mut pool, sum).unwrap();
        assert_eq!(text(&pool, b), "x-y");
        pool.check_consistency();
    }

    #[test]
    fn leading_negative_factor_floats_out() {
        let mut pool = Pool::new(128);
        let k = Expression::integer(&mut pool, -2).unwrap();
        let x = Expression::symbol(&mut pool, "x").unwrap();
        let m = Expression::multiplication(&mut pool, &[k, x]).unwrap();
        let b = deep_beautify(&mut pool, m).unwrap();
        assert_eq!(text(&pool, b), "-2×x");
    }

    #[test]
    fn leading_opposite_factor_floats_out() {
        let mut pool = Pool::new(128);
        let x = Expression::symbol(&mut pool, "x").unwrap();
        let neg_x = Expression::opposite(&mut pool, x).unwrap();
        let y = Expression::symbol(&mut pool, "y").unwrap();
        let m = Expression::multiplication(&mut pool, &[neg_x, y]).unwrap();
        let b = deep_beautify(&mut pool, m).unwrap();
        assert_eq!(b.kind(&pool), NodeKind::Opposite);
        assert_eq!(text(&pool, b), "-x×y");
        pool.check_consistency();
    }

    #[test]
    fn unflippable_leading_factor_stays_put() {
        let mut pool = Pool::new(128);
        let k = Expression::integer(&mut pool, i64::MIN).unwrap();
        let x = Expression::symbol(&mut pool, "x").unwrap();
        let m = Expression::multiplication(&mut pool, &[k, x]).unwrap();
        let before = pool.len();
        let b = deep_beautify(&mut pool, m).unwrap();
        assert!(matches!(b.kind(&pool), NodeKind::Multiplication { .. }));
        // Declining must not leave a working copy behind.
        assert_eq!(pool.len(), before);
        pool.check_consistency();
    }

    #[test]
    fn beautify_preserves_the_value() {
        let mut pool = Pool::new(256);
        let compute = EmptyContext;
        let ctx = ReductionContext::system(&compute);

        let a = Expression::integer(&mut pool, 200).unwrap();
        let ten = Expression::integer(&mut pool, 10).unwrap();
        let delta = Expression::opposite(&mut pool, ten).unwrap();
        let p = Expression::percent_addition(&mut pool, a, delta).unwrap();
        let before = approximate::<f64>(&pool, &p, &ctx).to_scalar();

        let b = deep_beautify(&mut pool, p).unwrap();
        let after = approximate::<f64>(&pool, &b, &ctx).to_scalar();
        assert_eq!(before, after);
        assert_eq!(before, Some(180.0));
    }

    #[test]
    fn untouched_kinds_pass_through() {
        let mut pool = Pool::new(128);
        let v = Expression::integer(&mut pool, 2).unwrap();
        let s = Expression::builtin(&mut pool, BuiltinFunction::Sqrt, v).unwrap();
        let before = s.clone_in(&mut pool).unwrap();
        let s = s.refreshed(&pool);
        let b = deep_beautify(&mut pool, s).unwrap();
        assert!(b.is_identical_to(&pool, before.refreshed(&pool)));
    }
}
