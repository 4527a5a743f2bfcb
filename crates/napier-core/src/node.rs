//! Node kinds and per-kind properties.
//!
//! The node model is deliberately closed: every pipeline operation matches
//! exhaustively on [`NodeKind`], so adding a kind forces every dispatch
//! site to be revisited.

/// Unique identifier for an interned symbol name.
pub type SymbolId = u32;

/// Built-in unary functions with engine-known semantics.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BuiltinFunction {
    /// Square root.
    Sqrt,
    /// Sine, interpreted in the context's angle unit.
    Sin,
    /// Cosine, interpreted in the context's angle unit.
    Cos,
    /// Tangent, interpreted in the context's angle unit.
    Tan,
}

impl BuiltinFunction {
    /// The serialized name of the function.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            BuiltinFunction::Sqrt => "sqrt",
            BuiltinFunction::Sin => "sin",
            BuiltinFunction::Cos => "cos",
            BuiltinFunction::Tan => "tan",
        }
    }
}

/// The kind tag of a node, including its inline payload.
///
/// Compound kinds do not store child handles: children live in the slots
/// immediately following the node, so only the child count needs to be
/// carried (and only for the variadic kinds).
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum NodeKind {
    // === Atoms ===
    /// A 64-bit integer literal.
    Integer(i64),
    /// A rational literal.
    ///
    /// Invariant: `den > 1`, `gcd(|num|, den) == 1`. A rational with
    /// denominator 1 is stored as `Integer`.
    Rational {
        /// Signed numerator.
        num: i64,
        /// Positive denominator.
        den: u64,
    },
    /// A floating-point literal, produced by approximation fallbacks.
    Float(f64),
    /// A symbolic variable, resolved through the compute context.
    Symbol(SymbolId),
    /// The distinguished undefined value. Flows through arithmetic,
    /// display and approximation uniformly; it is never an error.
    Undefined,

    // === Operators ===
    /// n-ary sum. Invariant: `n >= 2`.
    Addition {
        /// Number of terms.
        n: u8,
    },
    /// Binary subtraction.
    Subtraction,
    /// n-ary product. Invariant: `n >= 2`.
    Multiplication {
        /// Number of factors.
        n: u8,
    },
    /// Binary division.
    Division,
    /// Binary power: base, exponent.
    Power,
    /// Unary negation.
    Opposite,

    // === Structural wrappers ===
    /// Explicit parentheses. Stripped by reduction, re-inserted by
    /// beautification where the rewritten shape requires them.
    Parenthesis,
    /// Plain percent: `a%`, equal to `a/100`. Preserved through exact
    /// reduction, rewritten only at the display boundary.
    PercentSimple,
    /// Percent addition: `a + b%` or `a - b%` (relative change), equal to
    /// `a * (1 + b/100)`.
    PercentAddition,

    // === Functions ===
    /// Built-in unary function application.
    Builtin(BuiltinFunction),
    /// Application of a context-resolved function.
    Call {
        /// Interned function name.
        symbol: SymbolId,
        /// Number of arguments.
        n: u8,
    },
}

impl NodeKind {
    /// Number of direct children a node of this kind owns.
    #[must_use]
    pub fn child_count(self) -> usize {
        match self {
            NodeKind::Integer(_)
            | NodeKind::Rational { .. }
            | NodeKind::Float(_)
            | NodeKind::Symbol(_)
            | NodeKind::Undefined => 0,
            NodeKind::Opposite
            | NodeKind::Parenthesis
            | NodeKind::PercentSimple
            | NodeKind::Builtin(_) => 1,
            NodeKind::Subtraction
            | NodeKind::Division
            | NodeKind::Power
            | NodeKind::PercentAddition => 2,
            NodeKind::Addition { n } | NodeKind::Multiplication { n } | NodeKind::Call { n, .. } => {
                n as usize
            }
        }
    }

    /// Returns true if this kind has no children.
    #[must_use]
    pub fn is_leaf(self) -> bool {
        self.child_count() == 0
    }

    /// Returns true if this is a numeric literal.
    #[must_use]
    pub fn is_numeral(self) -> bool {
        matches!(
            self,
            NodeKind::Integer(_) | NodeKind::Rational { .. } | NodeKind::Float(_)
        )
    }

    /// Returns true if this is exactly the integer zero or the float 0.0.
    #[must_use]
    pub fn is_zero(self) -> bool {
        matches!(self, NodeKind::Integer(0)) || matches!(self, NodeKind::Float(f) if f == 0.0)
    }

    /// Returns true if this is exactly the integer one or the float 1.0.
    #[must_use]
    pub fn is_one(self) -> bool {
        matches!(self, NodeKind::Integer(1)) || matches!(self, NodeKind::Float(f) if f == 1.0)
    }

    /// Returns true if this is a numeral strictly less than zero.
    #[must_use]
    pub fn is_negative_numeral(self) -> bool {
        match self {
            NodeKind::Integer(v) => v < 0,
            NodeKind::Rational { num, .. } => num < 0,
            NodeKind::Float(f) => f < 0.0,
            _ => false,
        }
    }
}

/// One pool slot: a node's kind plus the size of its whole subtree.
///
/// `size` counts slots, including the node itself, so the subtree of the
/// node at offset `i` is exactly `slots[i..i + size]`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Slot {
    /// The node's kind and payload.
    pub kind: NodeKind,
    /// Subtree size in slots, including this one.
    pub size: u32,
}

/// Three-valued truth for sign and nullity inference.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Trinary {
    /// Known true.
    True,
    /// Known false.
    False,
    /// Cannot be decided from the tree alone.
    Unknown,
}

impl Trinary {
    /// Converts a definite boolean.
    #[must_use]
    pub fn from_bool(b: bool) -> Self {
        if b {
            Trinary::True
        } else {
            Trinary::False
        }
    }
}

// === Numeral arithmetic ===
//
// Exact arithmetic is done in i128 and renormalized; any overflow of the
// i64/u64 payload makes the operation decline (return None) so the rewrite
// rule leaves the tree unchanged instead of wrapping. A float operand makes
// the result float.

fn gcd(mut a: u128, mut b: u128) -> u128 {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

/// Builds a normalized numeral kind from an i128 fraction.
///
/// Returns `None` when the normalized fraction does not fit the inline
/// payload, or when the denominator is zero.
#[must_use]
pub fn rational_kind(num: i128, den: i128) -> Option<NodeKind> {
    if den == 0 {
        return None;
    }
    let sign = (num < 0) != (den < 0);
    let n = num.unsigned_abs();
    let d = den.unsigned_abs();
    let g = gcd(n, d);
    let (n, d) = (n / g, d / g);
    let num = i64::try_from(n).ok()?;
    let num = if sign { num.checked_neg()? } else { num };
    let den = u64::try_from(d).ok()?;
    if den == 1 {
        Some(NodeKind::Integer(num))
    } else {
        Some(NodeKind::Rational { num, den })
    }
}

/// The numeral as an exact fraction, if it is one.
#[must_use]
pub fn as_fraction(kind: NodeKind) -> Option<(i128, i128)> {
    match kind {
        NodeKind::Integer(v) => Some((i128::from(v), 1)),
        NodeKind::Rational { num, den } => Some((i128::from(num), i128::from(den))),
        _ => None,
    }
}

/// The numeral as a float, if it is a numeral at all.
#[must_use]
pub fn as_f64(kind: NodeKind) -> Option<f64> {
    match kind {
        NodeKind::Integer(v) => Some(v as f64),
        NodeKind::Rational { num, den } => Some(num as f64 / den as f64),
        NodeKind::Float(f) => Some(f),
        _ => None,
    }
}

fn float_contagion(a: NodeKind, b: NodeKind) -> bool {
    matches!(a, NodeKind::Float(_)) || matches!(b, NodeKind::Float(_))
}

/// `a + b` over numerals.
#[must_use]
pub fn numeral_add(a: NodeKind, b: NodeKind) -> Option<NodeKind> {
    if float_contagion(a, b) {
        return Some(NodeKind::Float(as_f64(a)? + as_f64(b)?));
    }
    let (an, ad) = as_fraction(a)?;
    let (bn, bd) = as_fraction(b)?;
    rational_kind(an.checked_mul(bd)?.checked_add(bn.checked_mul(ad)?)?, ad.checked_mul(bd)?)
}

/// `a * b` over numerals.
#[must_use]
pub fn numeral_mul(a: NodeKind, b: NodeKind) -> Option<NodeKind> {
    if float_contagion(a, b) {
        return Some(NodeKind::Float(as_f64(a)? * as_f64(b)?));
    }
    let (an, ad) = as_fraction(a)?;
    let (bn, bd) = as_fraction(b)?;
    rational_kind(an.checked_mul(bn)?, ad.checked_mul(bd)?)
}

/// `a / b` over numerals. Declines when `b` is zero.
#[must_use]
pub fn numeral_div(a: NodeKind, b: NodeKind) -> Option<NodeKind> {
    if b.is_zero() {
        return None;
    }
    if float_contagion(a, b) {
        return Some(NodeKind::Float(as_f64(a)? / as_f64(b)?));
    }
    let (an, ad) = as_fraction(a)?;
    let (bn, bd) = as_fraction(b)?;
    rational_kind(an.checked_mul(bd)?, ad.checked_mul(bn)?)
}

/// `-a` over numerals.
#[must_use]
pub fn numeral_neg(a: NodeKind) -> Option<NodeKind> {
    match a {
        NodeKind::Integer(v) => Some(NodeKind::Integer(v.checked_neg()?)),
        NodeKind::Rational { num, den } => Some(NodeKind::Rational {
            num: num.checked_neg()?,
            den,
        }),
        NodeKind::Float(f) => Some(NodeKind::Float(-f)),
        _ => None,
    }
}

/// `base ^ exp` when the exponent is an exact integer of modest magnitude.
#[must_use]
pub fn numeral_pow(base: NodeKind, exp: NodeKind) -> Option<NodeKind> {
    if let NodeKind::Float(_) = base {
        let e = as_f64(exp)?;
        return Some(NodeKind::Float(as_f64(base)?.powf(e)));
    }
    let e = match exp {
        NodeKind::Integer(v) => v,
        NodeKind::Float(f) => return Some(NodeKind::Float(as_f64(base)?.powf(f))),
        _ => return None,
    };
    if e.unsigned_abs() > 64 {
        return None;
    }
    let (mut num, mut den) = as_fraction(base)?;
    if e < 0 {
        if num == 0 {
            return None;
        }
        std::mem::swap(&mut num, &mut den);
    }
    let (mut rn, mut rd): (i128, i128) = (1, 1);
    for _ in 0..e.unsigned_abs() {
        rn = rn.checked_mul(num)?;
        rd = rd.checked_mul(den)?;
    }
    rational_kind(rn, rd)
}

/// Sign of a numeral.
#[must_use]
pub fn numeral_sign(kind: NodeKind) -> Option<Trinary> {
    match kind {
        NodeKind::Integer(v) => Some(Trinary::from_bool(v >= 0)),
        NodeKind::Rational { num, .. } => Some(Trinary::from_bool(num >= 0)),
        NodeKind::Float(f) => {
            if f.is_nan() {
                Some(Trinary::Unknown)
            } else {
                Some(Trinary::from_bool(f >= 0.0))
            }
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_counts() {
        assert_eq!(NodeKind::Integer(3).child_count(), 0);
        assert_eq!(NodeKind::Opposite.child_count(), 1);
        assert_eq!(NodeKind::PercentAddition.child_count(), 2);
        assert_eq!(NodeKind::Addition { n: 5 }.child_count(), 5);
    }

    #[test]
    fn rational_normalization() {
        assert_eq!(rational_kind(4, 2), Some(NodeKind::Integer(2)));
        assert_eq!(rational_kind(2, -4), Some(NodeKind::Rational { num: -1, den: 2 }));
        assert_eq!(rational_kind(1, 0), None);
    }

    #[test]
    fn numeral_arithmetic() {
        let half = NodeKind::Rational { num: 1, den: 2 };
        let third = NodeKind::Rational { num: 1, den: 3 };
        assert_eq!(
            numeral_add(half, third),
            Some(NodeKind::Rational { num: 5, den: 6 })
        );
        assert_eq!(numeral_mul(half, NodeKind::Integer(2)), Some(NodeKind::Integer(1)));
        assert_eq!(numeral_div(NodeKind::Integer(1), NodeKind::Integer(0)), None);
        assert_eq!(numeral_neg(NodeKind::Integer(i64::MIN)), None);
    }

    #[test]
    fn numeral_power() {
        assert_eq!(
            numeral_pow(NodeKind::Integer(2), NodeKind::Integer(10)),
            Some(NodeKind::Integer(1024))
        );
        assert_eq!(
            numeral_pow(NodeKind::Integer(2), NodeKind::Integer(-2)),
            Some(NodeKind::Rational { num: 1, den: 4 })
        );
        // Exponent magnitude out of range declines.
        assert_eq!(numeral_pow(NodeKind::Integer(2), NodeKind::Integer(100)), None);
    }

    #[test]
    fn float_contagion_applies() {
        let r = numeral_add(NodeKind::Float(0.5), NodeKind::Integer(1));
        assert_eq!(r, Some(NodeKind::Float(1.5)));
    }
}
