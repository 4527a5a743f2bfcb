//! Exact simplification: shallow (one node) and deep (post-order) reduce.
//!
//! Deep reduce is strictly post-order: every rule in `shallow_reduce` may
//! assume its children are already canonical (numerals folded, nested sums
//! and products flattened, children ordered). A rule that cannot fire —
//! overflow, symbolic operands — leaves the subtree unchanged rather than
//! erroring.

use std::cmp::Ordering;

use napier_core::node::{
    self, BuiltinFunction, NodeKind,
};
use napier_core::pool::NodeId;
use napier_core::{Expression, Pool, PoolError, ReductionContext};
use smallvec::SmallVec;

/// One full post-order pass. Returns the (possibly replaced) handle and
/// whether anything changed.
pub(crate) fn deep_reduce_once(
    pool: &mut Pool,
    e: Expression,
    ctx: &ReductionContext<'_>,
    max_depth: usize,
) -> Result<(Expression, bool), PoolError> {
    let mut changed = false;
    let e = reduce_rec(pool, e, ctx, 0, max_depth, &mut changed)?;
    Ok((e, changed))
}

fn reduce_rec(
    pool: &mut Pool,
    e: Expression,
    ctx: &ReductionContext<'_>,
    depth: usize,
    max_depth: usize,
    changed: &mut bool,
) -> Result<Expression, PoolError> {
    if depth > max_depth {
        // Work bound exceeded: leave the subtree as-is.
        return Ok(e);
    }
    let mut node = e;
    let n = node.number_of_children(pool);
    for i in 0..n {
        let child = node.child_at_index(pool, i);
        reduce_rec(pool, child, ctx, depth + 1, max_depth, changed)?;
        node = node.refreshed(pool);
    }
    shallow_reduce(pool, node, ctx, changed)
}

/// Reduces one node, assuming already-canonical children.
pub(crate) fn shallow_reduce(
    pool: &mut Pool,
    e: Expression,
    ctx: &ReductionContext<'_>,
    changed: &mut bool,
) -> Result<Expression, PoolError> {
    // An undefined child makes every kind undefined.
    let n = e.number_of_children(pool);
    for i in 0..n {
        if e.child_at_index(pool, i).kind(pool) == NodeKind::Undefined {
            return replace_with_kind(pool, e, NodeKind::Undefined, changed);
        }
    }

    match e.kind(pool) {
        NodeKind::Integer(_) | NodeKind::Rational { .. } | NodeKind::Undefined => Ok(e),
        NodeKind::Float(f) => {
            if f.is_nan() {
                replace_with_kind(pool, e, NodeKind::Undefined, changed)
            } else {
                Ok(e)
            }
        }
        NodeKind::Symbol(id) => {
            let bound = ctx.compute.expression_for_symbol(pool, id)?;
            if bound.is_uninitialized() {
                return Ok(e);
            }
            *changed = true;
            e.replace_with_in_place(pool, bound)
        }
        NodeKind::Parenthesis => {
            let inner = e.child_at_index(pool, 0).clone_in(pool)?;
            *changed = true;
            e.replace_with_in_place(pool, inner)
        }
        NodeKind::Opposite => reduce_opposite(pool, e, changed),
        NodeKind::Subtraction => reduce_subtraction(pool, e, ctx, changed),
        NodeKind::Addition { .. } => reduce_addition(pool, e, changed),
        NodeKind::Multiplication { .. } => reduce_multiplication(pool, e, changed),
        NodeKind::Division => reduce_division(pool, e, changed),
        NodeKind::Power => reduce_power(pool, e, changed),
        NodeKind::Builtin(f) => reduce_builtin(pool, e, f, ctx, changed),
        // Percent kinds are deliberately preserved through exact
        // reduction so later stages can still recognize them; they are
        // rewritten at the display boundary only.
        NodeKind::PercentSimple | NodeKind::PercentAddition => Ok(e),
        NodeKind::Call { .. } => Ok(e),
    }
}

fn replace_with_kind(
    pool: &mut Pool,
    e: Expression,
    kind: NodeKind,
    changed: &mut bool,
) -> Result<Expression, PoolError> {
    let leaf = Expression::from_id(pool.allocate(kind)?);
    *changed = true;
    e.replace_with_in_place(pool, leaf)
}

fn reduce_opposite(
    pool: &mut Pool,
    e: Expression,
    changed: &mut bool,
) -> Result<Expression, PoolError> {
    let child = e.child_at_index(pool, 0);
    let child_kind = child.kind(pool);
    if child_kind.is_numeral() {
        if let Some(neg) = node::numeral_neg(child_kind) {
            return replace_with_kind(pool, e, neg, changed);
        }
        return Ok(e);
    }
    if child_kind == NodeKind::Opposite {
        let inner = child.child_at_index(pool, 0).clone_in(pool)?;
        *changed = true;
        return e.replace_with_in_place(pool, inner);
    }
    Ok(e)
}

fn reduce_subtraction(
    pool: &mut Pool,
    e: Expression,
    ctx: &ReductionContext<'_>,
    changed: &mut bool,
) -> Result<Expression, PoolError> {
    // a - b becomes a + (-b); the addition rules then take over.
    let b = e.child_at_index(pool, 1);
    let b_kind = b.kind(pool);
    let a = e.child_at_index(pool, 0).clone_in(pool)?;
    let neg_b = if let Some(neg) = node::numeral_neg(b_kind) {
        Expression::from_id(pool.allocate(neg)?)
    } else if b_kind == NodeKind::Opposite {
        let b = e.child_at_index(pool, 1);
        b.child_at_index(pool, 0).clone_in(pool)?
    } else {
        let b = e.child_at_index(pool, 1).clone_in(pool)?;
        Expression::opposite(pool, b)?
    };
    let sum = Expression::addition(pool, &[a, neg_b])?;
    let e = e.replace_with_in_place(pool, sum)?;
    *changed = true;
    shallow_reduce(pool, e, ctx, changed)
}

/// Canonical ordering of reduced operands: symbols, then applications,
/// then compound shapes; within a class, children decide recursively.
/// Numerals sort through their value and are placed by the caller
/// (last in sums, first in products) after folding.
pub(crate) fn compare_operands(pool: &Pool, a: NodeId, b: NodeId) -> Ordering {
    let ka = pool.kind(a);
    let kb = pool.kind(b);
    let ra = class_rank(ka);
    let rb = class_rank(kb);
    if ra != rb {
        return ra.cmp(&rb);
    }
    match (ka, kb) {
        (NodeKind::Symbol(x), NodeKind::Symbol(y)) => x.cmp(&y),
        (NodeKind::Integer(_) | NodeKind::Rational { .. } | NodeKind::Float(_), _) => {
            let x = node::as_f64(ka).unwrap_or(f64::NAN);
            let y = node::as_f64(kb).unwrap_or(f64::NAN);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (NodeKind::Builtin(x), NodeKind::Builtin(y)) => (x as u8).cmp(&(y as u8)),
        (NodeKind::Call { symbol: x, .. }, NodeKind::Call { symbol: y, .. }) => {
            x.cmp(&y).then_with(|| compare_children(pool, a, b))
        }
        _ => compare_children(pool, a, b),
    }
}

fn compare_children(pool: &Pool, a: NodeId, b: NodeId) -> Ordering {
    let ea = Expression::from_id(a);
    let eb = Expression::from_id(b);
    let na = ea.number_of_children(pool);
    let nb = eb.number_of_children(pool);
    for i in 0..na.min(nb) {
        let ca = pool.child_at(a, i);
        let cb = pool.child_at(b, i);
        let ord = compare_operands(pool, ca, cb);
        if ord != Ordering::Equal {
            return ord;
        }
    }
    na.cmp(&nb)
}

fn class_rank(kind: NodeKind) -> u8 {
    match kind {
        NodeKind::Symbol(_) => 0,
        NodeKind::Call { .. } => 1,
        NodeKind::Builtin(_) => 2,
        NodeKind::Power => 3,
        NodeKind::Multiplication { .. } => 4,
        NodeKind::Division => 5,
        NodeKind::Addition { .. } => 6,
        NodeKind::Subtraction => 7,
        NodeKind::Opposite => 8,
        NodeKind::Parenthesis => 9,
        NodeKind::PercentSimple => 10,
        NodeKind::PercentAddition => 11,
        NodeKind::Integer(_) | NodeKind::Rational { .. } | NodeKind::Float(_) => 12,
        NodeKind::Undefined => 13,
    }
}

/// Shared engine for the two variadic kinds: flatten same-kind children,
/// fold numerals, drop the identity element, order the rest.
struct VariadicPlan {
    terms: SmallVec<[NodeId; 8]>,
    numeral: Option<NodeKind>,
    changed: bool,
}

fn plan_variadic(
    pool: &Pool,
    e: Expression,
    fold: impl Fn(NodeKind, NodeKind) -> Option<NodeKind>,
) -> VariadicPlan {
    let mut flat: SmallVec<[NodeId; 8]> = SmallVec::new();
    let mut flattened = false;
    for i in 0..e.number_of_children(pool) {
        let child = e.child_at_index(pool, i);
        let same = match (e.kind(pool), child.kind(pool)) {
            (NodeKind::Addition { .. }, NodeKind::Addition { .. }) => true,
            (NodeKind::Multiplication { .. }, NodeKind::Multiplication { .. }) => true,
            _ => false,
        };
        if same {
            flattened = true;
            for j in 0..child.number_of_children(pool) {
                flat.push(child.child_at_index(pool, j).id());
            }
        } else {
            flat.push(child.id());
        }
    }

    let mut numeral: Option<NodeKind> = None;
    let mut numeral_count = 0usize;
    let mut absorbed_at: Option<usize> = None;
    let mut declined = false;
    let mut terms: SmallVec<[NodeId; 8]> = SmallVec::new();
    for (i, &id) in flat.iter().enumerate() {
        let kind = pool.kind(id);
        if kind.is_numeral() {
            numeral_count += 1;
            numeral = Some(match numeral {
                None => {
                    absorbed_at = Some(i);
                    kind
                }
                Some(acc) => match fold(acc, kind) {
                    Some(folded) => folded,
                    None => {
                        // Overflow: keep the operand symbolic.
                        numeral_count -= 1;
                        declined = true;
                        terms.push(id);
                        acc
                    }
                },
            });
        } else {
            terms.push(id);
        }
    }

    let before = terms.clone();
    terms.sort_by(|&a, &b| compare_operands(pool, a, b));
    let reordered = terms != before;

    // A lone numeral still has a required slot: last in a sum, first in
    // a product. Declined folds leave extra numerals among the terms,
    // where no single slot applies.
    let misplaced = if numeral_count == 1 && !declined {
        let is_sum = matches!(e.kind(pool), NodeKind::Addition { .. });
        match absorbed_at {
            Some(p) if is_sum => p + 1 != flat.len(),
            Some(p) => p != 0,
            None => false,
        }
    } else {
        false
    };

    VariadicPlan {
        terms,
        numeral,
        changed: flattened || numeral_count > 1 || reordered || misplaced,
    }
}

fn reduce_addition(
    pool: &mut Pool,
    e: Expression,
    changed: &mut bool,
) -> Result<Expression, PoolError> {
    let mut plan = plan_variadic(pool, e, node::numeral_add);
    // Drop a zero numeral term.
    if let Some(acc) = plan.numeral {
        if acc.is_zero() && !plan.terms.is_empty() {
            plan.numeral = None;
            plan.changed = true;
        }
    }
    if !plan.changed && plan.terms.len() + usize::from(plan.numeral.is_some()) >= 2 {
        return Ok(e);
    }
    rebuild_variadic(pool, e, &plan, true, changed)
}

fn reduce_multiplication(
    pool: &mut Pool,
    e: Expression,
    changed: &mut bool,
) -> Result<Expression, PoolError> {
    let mut plan = plan_variadic(pool, e, node::numeral_mul);
    // A zero factor annihilates the product (undefined children were
    // already ruled out above).
    if let Some(acc) = plan.numeral {
        if acc.is_zero() {
            return replace_with_kind(pool, e, acc, changed);
        }
        if acc.is_one() && !plan.terms.is_empty() {
            plan.numeral = None;
            plan.changed = true;
        }
    }
    if !plan.changed && plan.terms.len() + usize::from(plan.numeral.is_some()) >= 2 {
        return Ok(e);
    }
    rebuild_variadic(pool, e, &plan, false, changed)
}

fn rebuild_variadic(
    pool: &mut Pool,
    e: Expression,
    plan: &VariadicPlan,
    is_addition: bool,
    changed: &mut bool,
) -> Result<Expression, PoolError> {
    let count = plan.terms.len() + usize::from(plan.numeral.is_some());
    let replacement = if count == 0 {
        // Everything folded away: the identity element.
        let identity = if is_addition {
            NodeKind::Integer(0)
        } else {
            NodeKind::Integer(1)
        };
        Expression::from_id(pool.allocate(plan.numeral.unwrap_or(identity))?)
    } else if count == 1 {
        match (plan.terms.first(), plan.numeral) {
            (Some(&id), None) => Expression::from_id(id).clone_in(pool)?,
            (None, Some(kind)) => Expression::from_id(pool.allocate(kind)?),
            _ => unreachable!(),
        }
    } else {
        let mut parts: Vec<Expression> = Vec::with_capacity(count);
        // Numerals go first in products, last in sums.
        if !is_addition {
            if let Some(kind) = plan.numeral {
                parts.push(Expression::from_id(pool.allocate(kind)?));
            }
        }
        for &id in &plan.terms {
            parts.push(Expression::from_id(id).clone_in(pool)?);
        }
        if is_addition {
            if let Some(kind) = plan.numeral {
                parts.push(Expression::from_id(pool.allocate(kind)?));
            }
        }
        if is_addition {
            Expression::addition(pool, &parts)?
        } else {
            Expression::multiplication(pool, &parts)?
        }
    };
    *changed = true;
    e.replace_with_in_place(pool, replacement)
}

fn reduce_division(
    pool: &mut Pool,
    e: Expression,
    changed: &mut bool,
) -> Result<Expression, PoolError> {
    use napier_core::Trinary;
    let num = e.child_at_index(pool, 0);
    let den = e.child_at_index(pool, 1);
    // Division by a symbolic zero is the undefined value, not an error.
    if den.is_null(pool) == Trinary::True {
        return replace_with_kind(pool, e, NodeKind::Undefined, changed);
    }
    let num_kind = num.kind(pool);
    let den_kind = den.kind(pool);
    if num_kind.is_numeral() && den_kind.is_numeral() {
        if let Some(folded) = node::numeral_div(num_kind, den_kind) {
            return replace_with_kind(pool, e, folded, changed);
        }
        return Ok(e);
    }
    if den_kind.is_one() {
        let inner = num.clone_in(pool)?;
        *changed = true;
        return e.replace_with_in_place(pool, inner);
    }
    if num_kind.is_zero() && den.is_null(pool) == Trinary::False {
        return replace_with_kind(pool, e, NodeKind::Integer(0), changed);
    }
    Ok(e)
}

fn reduce_power(
    pool: &mut Pool,
    e: Expression,
    changed: &mut bool,
) -> Result<Expression, PoolError> {
    use napier_core::Trinary;
    let base = e.child_at_index(pool, 0);
    let exp = e.child_at_index(pool, 1);
    let base_kind = base.kind(pool);
    let exp_kind = exp.kind(pool);

    if exp_kind.is_zero() {
        // 0^0 is undefined; anything else to the zero is one.
        return if base.is_null(pool) == Trinary::True {
            replace_with_kind(pool, e, NodeKind::Undefined, changed)
        } else {
            replace_with_kind(pool, e, NodeKind::Integer(1), changed)
        };
    }
    if exp_kind.is_one() {
        let inner = base.clone_in(pool)?;
        *changed = true;
        return e.replace_with_in_place(pool, inner);
    }
    if base_kind.is_zero() {
        return match node::numeral_sign(exp_kind) {
            Some(Trinary::True) => replace_with_kind(pool, e, NodeKind::Integer(0), changed),
            Some(_) => replace_with_kind(pool, e, NodeKind::Undefined, changed),
            None => Ok(e),
        };
    }
    if base_kind.is_numeral() && exp_kind.is_numeral() {
        if let Some(folded) = node::numeral_pow(base_kind, exp_kind) {
            return replace_with_kind(pool, e, folded, changed);
        }
    }
    Ok(e)
}

fn perfect_sqrt(v: i64) -> Option<i64> {
    if v < 0 {
        return None;
    }
    let r = (v as f64).sqrt().round() as i64;
    for c in [r - 1, r, r + 1] {
        if c >= 0 && c.checked_mul(c) == Some(v) {
            return Some(c);
        }
    }
    None
}

fn reduce_builtin(
    pool: &mut Pool,
    e: Expression,
    f: BuiltinFunction,
    ctx: &ReductionContext<'_>,
    changed: &mut bool,
) -> Result<Expression, PoolError> {
    let arg = e.child_at_index(pool, 0);
    let arg_kind = arg.kind(pool);
    if let NodeKind::Float(v) = arg_kind {
        let folded = match f {
            BuiltinFunction::Sqrt if v >= 0.0 => Some(v.sqrt()),
            BuiltinFunction::Sqrt => None,
            BuiltinFunction::Sin => Some(ctx.angle_unit.to_radians(v).sin()),
            BuiltinFunction::Cos => Some(ctx.angle_unit.to_radians(v).cos()),
            BuiltinFunction::Tan => Some(ctx.angle_unit.to_radians(v).tan()),
        };
        if let Some(v) = folded {
            return replace_with_kind(pool, e, NodeKind::Float(v), changed);
        }
        return Ok(e);
    }
    match f {
        BuiltinFunction::Sqrt => {
            let folded = match arg_kind {
                NodeKind::Integer(v) => perfect_sqrt(v).map(NodeKind::Integer),
                NodeKind::Rational { num, den } => {
                    match (perfect_sqrt(num), den.try_into().ok().and_then(perfect_sqrt)) {
                        (Some(n), Some(d)) => Some(NodeKind::Rational {
                            num: n,
                            den: d as u64,
                        }),
                        _ => None,
                    }
                }
                _ => None,
            };
            match folded {
                Some(kind) => replace_with_kind(pool, e, kind, changed),
                None => Ok(e),
            }
        }
        BuiltinFunction::Sin | BuiltinFunction::Tan if arg_kind.is_zero() => {
            replace_with_kind(pool, e, NodeKind::Integer(0), changed)
        }
        BuiltinFunction::Cos if arg_kind.is_zero() => {
            replace_with_kind(pool, e, NodeKind::Integer(1), changed)
        }
        _ => Ok(e),
    }
}
