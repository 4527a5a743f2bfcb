//! Value-semantics expression handles and tree builders.
//!
//! An [`Expression`] is a copyable reference to one node in the pool. It
//! does not own the node: the pool owns every node, and reachability from
//! the detached roots the caller controls decides lifetime. Handles are
//! invalidated by structural mutation and must be re-fetched from a stable
//! ancestor afterwards; the mutators here all return the fresh handle.

use smallvec::SmallVec;

use crate::error::PoolError;
use crate::node::{
    self, BuiltinFunction, NodeKind, Trinary,
};
use crate::pool::{NodeId, Pool};

/// A lightweight handle to an expression tree in the pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Expression {
    id: Option<NodeId>,
}

impl Expression {
    /// The "no expression" value.
    ///
    /// Every other operation asserts the handle is initialized; the check
    /// is the caller's responsibility, as in the rest of the engine's
    /// assertion policy.
    #[must_use]
    pub fn uninitialized() -> Self {
        Self { id: None }
    }

    /// Returns true if this is the "no expression" value.
    #[must_use]
    pub fn is_uninitialized(self) -> bool {
        self.id.is_none()
    }

    /// Wraps a raw node handle.
    #[must_use]
    pub fn from_id(id: NodeId) -> Self {
        Self { id: Some(id) }
    }

    /// The underlying node handle.
    ///
    /// # Panics
    ///
    /// Panics if the expression is uninitialized.
    #[must_use]
    pub fn id(self) -> NodeId {
        self.id.expect("operation on uninitialized expression")
    }

    /// Re-stamps the handle after a mutation that did not move this node.
    #[must_use]
    pub fn refreshed(self, pool: &Pool) -> Self {
        Self::from_id(self.id().refreshed(pool))
    }

    // === Accessors ===

    /// The node's kind.
    #[must_use]
    pub fn kind(self, pool: &Pool) -> NodeKind {
        pool.kind(self.id())
    }

    /// Number of direct children.
    #[must_use]
    pub fn number_of_children(self, pool: &Pool) -> usize {
        self.kind(pool).child_count()
    }

    /// The `i`-th direct child.
    #[must_use]
    pub fn child_at_index(self, pool: &Pool, i: usize) -> Expression {
        Expression::from_id(pool.child_at(self.id(), i))
    }

    /// All direct children.
    #[must_use]
    pub fn children(self, pool: &Pool) -> SmallVec<[Expression; 4]> {
        (0..self.number_of_children(pool))
            .map(|i| self.child_at_index(pool, i))
            .collect()
    }

    /// The parent node, or uninitialized for a detached root.
    ///
    /// A weak traversal lookup; it never extends the parent's lifetime.
    #[must_use]
    pub fn parent(self, pool: &Pool) -> Expression {
        match pool.parent_of(self.id()) {
            Some(p) => Expression::from_id(p),
            None => Expression::uninitialized(),
        }
    }

    /// Subtree size in pool slots.
    #[must_use]
    pub fn size(self, pool: &Pool) -> usize {
        pool.size(self.id())
    }

    /// Returns true if this is a numeric literal.
    #[must_use]
    pub fn is_number(self, pool: &Pool) -> bool {
        self.kind(pool).is_numeral()
    }

    /// Structural equality of the two subtrees.
    #[must_use]
    pub fn is_identical_to(self, pool: &Pool, other: Expression) -> bool {
        pool.subtree(self.id()) == pool.subtree(other.id())
    }

    // === Builders ===
    //
    // Builders allocate at the pool tail. Compound builders consume their
    // children, which must be the most recently built detached roots, in
    // order; reusing an existing subtree means cloning it first.

    /// Builds an integer literal.
    pub fn integer(pool: &mut Pool, value: i64) -> Result<Expression, PoolError> {
        Ok(Self::from_id(pool.allocate(NodeKind::Integer(value))?))
    }

    /// Builds a normalized rational literal. A zero denominator builds the
    /// undefined value.
    pub fn rational(pool: &mut Pool, num: i64, den: i64) -> Result<Expression, PoolError> {
        let kind = node::rational_kind(i128::from(num), i128::from(den))
            .unwrap_or(NodeKind::Undefined);
        Ok(Self::from_id(pool.allocate(kind)?))
    }

    /// Builds a float literal.
    pub fn float(pool: &mut Pool, value: f64) -> Result<Expression, PoolError> {
        Ok(Self::from_id(pool.allocate(NodeKind::Float(value))?))
    }

    /// Builds a symbol, interning its name.
    pub fn symbol(pool: &mut Pool, name: &str) -> Result<Expression, PoolError> {
        let id = pool.intern_symbol(name);
        Ok(Self::from_id(pool.allocate(NodeKind::Symbol(id))?))
    }

    /// Builds the undefined value.
    pub fn undefined(pool: &mut Pool) -> Result<Expression, PoolError> {
        Ok(Self::from_id(pool.allocate(NodeKind::Undefined)?))
    }

    fn adopt(
        pool: &mut Pool,
        kind: NodeKind,
        children: &[Expression],
    ) -> Result<Expression, PoolError> {
        let ids: SmallVec<[NodeId; 4]> = children.iter().map(|c| c.id()).collect();
        Ok(Self::from_id(pool.adopt(kind, &ids)?))
    }

    /// Builds an n-ary sum. Requires at least two terms.
    pub fn addition(pool: &mut Pool, children: &[Expression]) -> Result<Expression, PoolError> {
        assert!(children.len() >= 2 && children.len() <= u8::MAX as usize);
        Self::adopt(pool, NodeKind::Addition { n: children.len() as u8 }, children)
    }

    /// Builds an n-ary product. Requires at least two factors.
    pub fn multiplication(
        pool: &mut Pool,
        children: &[Expression],
    ) -> Result<Expression, PoolError> {
        assert!(children.len() >= 2 && children.len() <= u8::MAX as usize);
        Self::adopt(
            pool,
            NodeKind::Multiplication { n: children.len() as u8 },
            children,
        )
    }

    /// Builds `a - b`.
    pub fn subtraction(pool: &mut Pool, a: Expression, b: Expression) -> Result<Expression, PoolError> {
        Self::adopt(pool, NodeKind::Subtraction, &[a, b])
    }

    /// Builds `a / b`.
    pub fn division(pool: &mut Pool, a: Expression, b: Expression) -> Result<Expression, PoolError> {
        Self::adopt(pool, NodeKind::Division, &[a, b])
    }

    /// Builds `a ^ b`.
    pub fn power(pool: &mut Pool, a: Expression, b: Expression) -> Result<Expression, PoolError> {
        Self::adopt(pool, NodeKind::Power, &[a, b])
    }

    /// Builds `-a`.
    pub fn opposite(pool: &mut Pool, a: Expression) -> Result<Expression, PoolError> {
        Self::adopt(pool, NodeKind::Opposite, &[a])
    }

    /// Builds `(a)`.
    pub fn parenthesis(pool: &mut Pool, a: Expression) -> Result<Expression, PoolError> {
        Self::adopt(pool, NodeKind::Parenthesis, &[a])
    }

    /// Builds `a%`.
    pub fn percent_simple(pool: &mut Pool, a: Expression) -> Result<Expression, PoolError> {
        Self::adopt(pool, NodeKind::PercentSimple, &[a])
    }

    /// Builds `a + b%` (build `b` as an opposite for `a - b%`).
    pub fn percent_addition(
        pool: &mut Pool,
        a: Expression,
        b: Expression,
    ) -> Result<Expression, PoolError> {
        Self::adopt(pool, NodeKind::PercentAddition, &[a, b])
    }

    /// Builds a built-in function application.
    pub fn builtin(
        pool: &mut Pool,
        f: BuiltinFunction,
        a: Expression,
    ) -> Result<Expression, PoolError> {
        Self::adopt(pool, NodeKind::Builtin(f), &[a])
    }

    /// Builds an application of a context-resolved function.
    pub fn call(
        pool: &mut Pool,
        name: &str,
        args: &[Expression],
    ) -> Result<Expression, PoolError> {
        assert!(!args.is_empty() && args.len() <= u8::MAX as usize);
        let symbol = pool.intern_symbol(name);
        Self::adopt(pool, NodeKind::Call { symbol, n: args.len() as u8 }, args)
    }

    /// Deep-copies this subtree into a fresh detached root.
    pub fn clone_in(self, pool: &mut Pool) -> Result<Expression, PoolError> {
        Ok(Self::from_id(pool.clone_tree(self.id())?))
    }

    // === Structural mutation ===

    /// Substitutes `other` (a detached root) at this handle's position,
    /// discarding the current subtree. Returns the fresh handle.
    pub fn replace_with_in_place(
        self,
        pool: &mut Pool,
        other: Expression,
    ) -> Result<Expression, PoolError> {
        Ok(Self::from_id(pool.replace_subtree(self.id(), other.id())?))
    }

    /// Replaces the `i`-th child with `new` (a detached root). Returns the
    /// refreshed parent handle.
    pub fn replace_child_at_index_in_place(
        self,
        pool: &mut Pool,
        i: usize,
        new: Expression,
    ) -> Result<Expression, PoolError> {
        let child = pool.child_at(self.id(), i);
        pool.replace_subtree(child, new.id())?;
        Ok(self.refreshed(pool))
    }

    /// Inserts `child` (a detached root) at index `i`. Variadic parents
    /// only.
    pub fn add_child_at_index_in_place(
        self,
        pool: &mut Pool,
        i: usize,
        child: Expression,
    ) -> Result<Expression, PoolError> {
        Ok(Self::from_id(pool.insert_child(self.id(), i, child.id())?))
    }

    /// Removes and discards the `i`-th child. Variadic parents only; the
    /// caller restores the arity invariant if only one child remains.
    pub fn remove_child_at_index_in_place(
        self,
        pool: &mut Pool,
        i: usize,
    ) -> Result<Expression, PoolError> {
        Ok(Self::from_id(pool.remove_child(self.id(), i)?))
    }

    // === Properties ===

    /// Whether the expression is known to be non-negative.
    #[must_use]
    pub fn sign(self, pool: &Pool) -> Trinary {
        let kind = self.kind(pool);
        if let Some(s) = node::numeral_sign(kind) {
            return s;
        }
        match kind {
            NodeKind::Symbol(_) | NodeKind::Undefined | NodeKind::Call { .. } => Trinary::Unknown,
            NodeKind::Opposite => flip(self.child_at_index(pool, 0).sign(pool)),
            NodeKind::Parenthesis | NodeKind::PercentSimple => {
                self.child_at_index(pool, 0).sign(pool)
            }
            NodeKind::Addition { .. } => {
                let mut acc = self.child_at_index(pool, 0).sign(pool);
                for child in self.children(pool).iter().skip(1) {
                    if child.sign(pool) != acc {
                        acc = Trinary::Unknown;
                    }
                }
                acc
            }
            NodeKind::Subtraction => {
                let a = self.child_at_index(pool, 0).sign(pool);
                let b = flip(self.child_at_index(pool, 1).sign(pool));
                if a == b {
                    a
                } else {
                    Trinary::Unknown
                }
            }
            NodeKind::Multiplication { .. } => {
                let mut acc = Trinary::True;
                for child in self.children(pool) {
                    match child.sign(pool) {
                        Trinary::Unknown => return Trinary::Unknown,
                        Trinary::False => acc = flip(acc),
                        Trinary::True => {}
                    }
                }
                acc
            }
            NodeKind::Division => {
                let a = self.child_at_index(pool, 0).sign(pool);
                let b = self.child_at_index(pool, 1).sign(pool);
                match (a, b) {
                    (Trinary::Unknown, _) | (_, Trinary::Unknown) => Trinary::Unknown,
                    (a, b) => Trinary::from_bool(a == b),
                }
            }
            NodeKind::Power => {
                // A known non-negative base keeps its sign through any
                // real exponent.
                if self.child_at_index(pool, 0).sign(pool) == Trinary::True {
                    Trinary::True
                } else {
                    Trinary::Unknown
                }
            }
            NodeKind::PercentAddition => {
                // Composed from both children only when they agree.
                let a = self.child_at_index(pool, 0).sign(pool);
                let b = self.child_at_index(pool, 1).sign(pool);
                if a == b {
                    a
                } else {
                    Trinary::Unknown
                }
            }
            NodeKind::Builtin(_) => Trinary::Unknown,
            NodeKind::Integer(_) | NodeKind::Rational { .. } | NodeKind::Float(_) => {
                unreachable!("numerals handled above")
            }
        }
    }

    /// Whether the expression is known to be zero.
    #[must_use]
    pub fn is_null(self, pool: &Pool) -> Trinary {
        let kind = self.kind(pool);
        match kind {
            NodeKind::Integer(v) => Trinary::from_bool(v == 0),
            NodeKind::Rational { .. } => Trinary::False,
            NodeKind::Float(f) => {
                if f.is_nan() {
                    Trinary::Unknown
                } else {
                    Trinary::from_bool(f == 0.0)
                }
            }
            NodeKind::Opposite | NodeKind::Parenthesis | NodeKind::PercentSimple => {
                self.child_at_index(pool, 0).is_null(pool)
            }
            NodeKind::Multiplication { .. } => {
                let mut acc = Trinary::False;
                for child in self.children(pool) {
                    match child.is_null(pool) {
                        Trinary::True => return Trinary::True,
                        Trinary::Unknown => acc = Trinary::Unknown,
                        Trinary::False => {}
                    }
                }
                acc
            }
            NodeKind::Division => {
                let num = self.child_at_index(pool, 0).is_null(pool);
                let den = self.child_at_index(pool, 1).is_null(pool);
                match (num, den) {
                    (Trinary::True, Trinary::False) => Trinary::True,
                    (Trinary::False, Trinary::False) => Trinary::False,
                    _ => Trinary::Unknown,
                }
            }
            NodeKind::PercentAddition => {
                let null0 = self.child_at_index(pool, 0).is_null(pool);
                let null1 = self.child_at_index(pool, 1).is_null(pool);
                if null0 != Trinary::False || null1 == Trinary::True {
                    return null0;
                }
                // A defined sign here is a strict sign.
                if self.sign(pool) == Trinary::Unknown {
                    Trinary::Unknown
                } else {
                    Trinary::False
                }
            }
            _ => Trinary::Unknown,
        }
    }

    /// Flips a literal negative numeral factor of this expression in
    /// place: a negative numeral becomes its absolute value, an opposite
    /// loses its wrapper, and a product absorbs a leading negative
    /// numeral. Returns the fresh handle, or the uninitialized expression
    /// when nothing fired.
    pub fn make_positive_any_negative_numeral_factor(
        self,
        pool: &mut Pool,
    ) -> Result<Expression, PoolError> {
        let kind = self.kind(pool);
        if kind.is_negative_numeral() {
            return match node::numeral_neg(kind) {
                Some(pos) => Ok(Self::from_id(pool.set_kind(self.id(), pos))),
                // |i64::MIN| does not fit; decline.
                None => Ok(Expression::uninitialized()),
            };
        }
        match kind {
            NodeKind::Opposite => {
                let child = self.child_at_index(pool, 0).clone_in(pool)?;
                self.replace_with_in_place(pool, child)
            }
            NodeKind::Multiplication { n } => {
                let first = self.child_at_index(pool, 0);
                let first_kind = first.kind(pool);
                if !first_kind.is_negative_numeral() {
                    return Ok(Expression::uninitialized());
                }
                if first_kind == NodeKind::Integer(-1) {
                    if n == 2 {
                        let rest = self.child_at_index(pool, 1).clone_in(pool)?;
                        return self.replace_with_in_place(pool, rest);
                    }
                    return self.remove_child_at_index_in_place(pool, 0);
                }
                match node::numeral_neg(first_kind) {
                    Some(pos) => {
                        pool.set_kind(first.id(), pos);
                        Ok(self.refreshed(pool))
                    }
                    None => Ok(Expression::uninitialized()),
                }
            }
            _ => Ok(Expression::uninitialized()),
        }
    }
}

fn flip(t: Trinary) -> Trinary {
    match t {
        Trinary::True => Trinary::False,
        Trinary::False => Trinary::True,
        Trinary::Unknown => Trinary::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uninitialized_state() {
        let e = Expression::uninitialized();
        assert!(e.is_uninitialized());
        let mut pool = Pool::new(8);
        let one = Expression::integer(&mut pool, 1).unwrap();
        assert!(!one.is_uninitialized());
    }

    #[test]
    fn builders_and_accessors() {
        let mut pool = Pool::new(64);
        let a = Expression::integer(&mut pool, 5).unwrap();
        let b = Expression::integer(&mut pool, 3).unwrap();
        let b = Expression::opposite(&mut pool, b).unwrap();
        let pct = Expression::percent_addition(&mut pool, a, b).unwrap();

        assert_eq!(pct.kind(&pool), NodeKind::PercentAddition);
        assert_eq!(pct.number_of_children(&pool), 2);
        let snd = pct.child_at_index(&pool, 1);
        assert_eq!(snd.kind(&pool), NodeKind::Opposite);
        assert_eq!(snd.parent(&pool).id(), pct.id());
        pool.check_consistency();
    }

    #[test]
    fn rational_builder_normalizes() {
        let mut pool = Pool::new(8);
        let e = Expression::rational(&mut pool, 4, 6).unwrap();
        assert_eq!(e.kind(&pool), NodeKind::Rational { num: 2, den: 3 });
        let u = Expression::rational(&mut pool, 1, 0).unwrap();
        assert_eq!(u.kind(&pool), NodeKind::Undefined);
    }

    #[test]
    fn clone_is_a_deep_copy() {
        let mut pool = Pool::new(64);
        let a = Expression::integer(&mut pool, 2).unwrap();
        let b = Expression::integer(&mut pool, 3).unwrap();
        let div = Expression::division(&mut pool, a, b).unwrap();
        let copy = div.clone_in(&mut pool).unwrap();
        assert_ne!(div.id(), copy.id());
        assert!(div.is_identical_to(&pool, copy));
        pool.check_consistency();
    }

    #[test]
    fn percent_addition_sign_composition() {
        let mut pool = Pool::new(64);

        // Both positive: positive.
        let a = Expression::integer(&mut pool, 5).unwrap();
        let b = Expression::integer(&mut pool, 3).unwrap();
        let p = Expression::percent_addition(&mut pool, a, b).unwrap();
        assert_eq!(p.sign(&pool), Trinary::True);

        // Both negative: negative.
        let a = Expression::integer(&mut pool, -5).unwrap();
        let b = Expression::integer(&mut pool, -3).unwrap();
        let p = Expression::percent_addition(&mut pool, a, b).unwrap();
        assert_eq!(p.sign(&pool), Trinary::False);

        // Disagreeing signs: unknown, never guessed.
        let a = Expression::integer(&mut pool, 5).unwrap();
        let b = Expression::integer(&mut pool, -3).unwrap();
        let p = Expression::percent_addition(&mut pool, a, b).unwrap();
        assert_eq!(p.sign(&pool), Trinary::Unknown);
        assert_eq!(p.is_null(&pool), Trinary::Unknown);
    }

    #[test]
    fn percent_addition_nullity() {
        let mut pool = Pool::new(64);
        let a = Expression::integer(&mut pool, 0).unwrap();
        let b = Expression::integer(&mut pool, 3).unwrap();
        let p = Expression::percent_addition(&mut pool, a, b).unwrap();
        assert_eq!(p.is_null(&pool), Trinary::True);

        let a = Expression::integer(&mut pool, 5).unwrap();
        let b = Expression::integer(&mut pool, 3).unwrap();
        let p = Expression::percent_addition(&mut pool, a, b).unwrap();
        assert_eq!(p.is_null(&pool), Trinary::False);
    }

    #[test]
    fn make_positive_flips_numeral() {
        let mut pool = Pool::new(64);
        let e = Expression::integer(&mut pool, -3).unwrap();
        let pos = e.make_positive_any_negative_numeral_factor(&mut pool).unwrap();
        assert!(!pos.is_uninitialized());
        assert_eq!(pos.kind(&pool), NodeKind::Integer(3));
    }

    #[test]
    fn make_positive_unwraps_opposite() {
        let mut pool = Pool::new(64);
        let x = Expression::symbol(&mut pool, "x").unwrap();
        let e = Expression::opposite(&mut pool, x).unwrap();
        let pos = e.make_positive_any_negative_numeral_factor(&mut pool).unwrap();
        assert!(!pos.is_uninitialized());
        assert!(matches!(pos.kind(&pool), NodeKind::Symbol(_)));
        pool.check_consistency();
    }

    #[test]
    fn make_positive_absorbs_leading_factor() {
        let mut pool = Pool::new(64);
        let k = Expression::integer(&mut pool, -2).unwrap();
        let x = Expression::symbol(&mut pool, "x").unwrap();
        let e = Expression::multiplication(&mut pool, &[k, x]).unwrap();
        let pos = e.make_positive_any_negative_numeral_factor(&mut pool).unwrap();
        assert_eq!(pos.child_at_index(&pool, 0).kind(&pool), NodeKind::Integer(2));

        // A -1 factor disappears entirely.
        let k = Expression::integer(&mut pool, -1).unwrap();
        let x = Expression::symbol(&mut pool, "x").unwrap();
        let e = Expression::multiplication(&mut pool, &[k, x]).unwrap();
        let pos = e.make_positive_any_negative_numeral_factor(&mut pool).unwrap();
        assert!(matches!(pos.kind(&pool), NodeKind::Symbol(_)));
        pool.check_consistency();
    }

    #[test]
    fn make_positive_declines_on_positive_input() {
        let mut pool = Pool::new(64);
        let e = Expression::integer(&mut pool, 3).unwrap();
        let r = e.make_positive_any_negative_numeral_factor(&mut pool).unwrap();
        assert!(r.is_uninitialized());
    }
}
