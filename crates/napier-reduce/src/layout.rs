//! Two-dimensional visual projection of expression trees.
//!
//! A [`Layout`] is a small box model: fractions stack their operands,
//! exponents raise theirs, everything else flows horizontally. Stacking
//! replaces most of the parentheses the flat serializer needs; only
//! shapes that would still regroup on a line (a sum under a minus sign,
//! say) keep an explicit parenthesis box.

use napier_core::node::{BuiltinFunction, NodeKind};
use napier_core::{Expression, Pool};

use crate::serialize::format_float;
use crate::serialize::FloatDisplayMode;

/// A renderable box tree.
#[derive(Clone, Debug, PartialEq)]
pub enum Layout {
    /// A single glyph.
    CodePoint(char),
    /// Boxes flowed left to right on a shared baseline.
    Horizontal(Vec<Layout>),
    /// A numerator stacked over a denominator with a bar between.
    Fraction {
        /// The box above the bar.
        num: Box<Layout>,
        /// The box below the bar.
        den: Box<Layout>,
    },
    /// A box wrapped in visible parentheses.
    Parenthesis(Box<Layout>),
    /// A box raised to exponent position.
    Superscript(Box<Layout>),
    /// A box under a radical sign.
    Radical(Box<Layout>),
}

impl Layout {
    fn string(s: &str) -> Layout {
        let glyphs: Vec<Layout> = s.chars().map(Layout::CodePoint).collect();
        match glyphs.len() {
            1 => glyphs.into_iter().next().unwrap_or(Layout::CodePoint(' ')),
            _ => Layout::Horizontal(glyphs),
        }
    }

    /// Rows this box spans.
    #[must_use]
    pub fn height(&self) -> usize {
        match self {
            Layout::CodePoint(_) => 1,
            Layout::Horizontal(parts) => {
                let above = parts.iter().map(|p| p.baseline()).max().unwrap_or(0);
                let below = parts
                    .iter()
                    .map(|p| p.height() - p.baseline())
                    .max()
                    .unwrap_or(1);
                above + below
            }
            Layout::Fraction { num, den } => num.height() + den.height() + 1,
            Layout::Parenthesis(inner) => inner.height(),
            Layout::Superscript(inner) => inner.height() + 1,
            Layout::Radical(inner) => inner.height(),
        }
    }

    /// Rows above the baseline row.
    #[must_use]
    pub fn baseline(&self) -> usize {
        match self {
            Layout::CodePoint(_) => 0,
            Layout::Horizontal(parts) => parts.iter().map(|p| p.baseline()).max().unwrap_or(0),
            Layout::Fraction { num, .. } => num.height(),
            Layout::Parenthesis(inner) => inner.baseline(),
            Layout::Superscript(inner) => inner.height(),
            Layout::Radical(inner) => inner.baseline(),
        }
    }

    /// Flattens the box tree back onto one line, re-inserting the
    /// grouping the stacking made implicit. Used by tests and as a
    /// plain-text fallback.
    #[must_use]
    pub fn to_text(&self) -> String {
        match self {
            Layout::CodePoint(c) => c.to_string(),
            Layout::Horizontal(parts) => parts.iter().map(Layout::to_text).collect(),
            Layout::Fraction { num, den } => {
                format!("{}/{}", grouped(num), grouped(den))
            }
            Layout::Parenthesis(inner) => format!("({})", inner.to_text()),
            Layout::Superscript(inner) => format!("^{}", grouped(inner)),
            Layout::Radical(inner) => format!("√({})", inner.to_text()),
        }
    }

    fn is_token(&self) -> bool {
        match self {
            Layout::CodePoint(c) => c.is_alphanumeric() || *c == '.',
            Layout::Horizontal(parts) => parts.iter().all(Layout::is_token),
            Layout::Parenthesis(_) => true,
            _ => false,
        }
    }
}

fn grouped(l: &Layout) -> String {
    if l.is_token() {
        l.to_text()
    } else {
        format!("({})", l.to_text())
    }
}

/// Builds the visual box tree for `e`.
#[must_use]
pub fn create_layout(
    pool: &Pool,
    e: Expression,
    mode: FloatDisplayMode,
    significant_digits: usize,
) -> Layout {
    build(pool, e, mode, significant_digits)
}

/// Whether a child still needs visible parentheses in 2-D. Fractions
/// and superscripts carry their own grouping, so only loose additive
/// shapes qualify.
fn needs_parens(kind: NodeKind) -> bool {
    matches!(
        kind,
        NodeKind::Addition { .. } | NodeKind::Subtraction | NodeKind::Opposite
    ) || matches!(kind, NodeKind::Integer(v) if v < 0)
        || matches!(kind, NodeKind::Float(v) if v < 0.0)
        || matches!(kind, NodeKind::Rational { num, .. } if num < 0)
}

fn child_box(
    pool: &Pool,
    e: Expression,
    i: usize,
    mode: FloatDisplayMode,
    digits: usize,
) -> Layout {
    let child = e.child_at_index(pool, i);
    let inner = build(pool, child, mode, digits);
    if needs_parens(child.kind(pool)) {
        Layout::Parenthesis(Box::new(inner))
    } else {
        inner
    }
}

fn build(pool: &Pool, e: Expression, mode: FloatDisplayMode, digits: usize) -> Layout {
    match e.kind(pool) {
        NodeKind::Integer(v) => Layout::string(&v.to_string()),
        NodeKind::Rational { num, den } => Layout::Fraction {
            num: Box::new(Layout::string(&num.to_string())),
            den: Box::new(Layout::string(&den.to_string())),
        },
        NodeKind::Float(v) => Layout::string(&format_float(v, mode, digits)),
        NodeKind::Symbol(id) => Layout::string(pool.symbol_name(id).unwrap_or("?")),
        NodeKind::Undefined => Layout::string("undef"),
        NodeKind::Addition { .. } => {
            let mut parts = Vec::new();
            for i in 0..e.number_of_children(pool) {
                if i > 0 {
                    parts.push(Layout::CodePoint('+'));
                }
                parts.push(child_box(pool, e, i, mode, digits));
            }
            Layout::Horizontal(parts)
        }
        NodeKind::Subtraction => {
            let left = build(pool, e.child_at_index(pool, 0), mode, digits);
            let right = child_box(pool, e, 1, mode, digits);
            Layout::Horizontal(vec![left, Layout::CodePoint('-'), right])
        }
        NodeKind::Multiplication { .. } => {
            let mut parts = Vec::new();
            for i in 0..e.number_of_children(pool) {
                if i > 0 {
                    parts.push(Layout::CodePoint('×'));
                }
                parts.push(child_box(pool, e, i, mode, digits));
            }
            Layout::Horizontal(parts)
        }
        NodeKind::Division => Layout::Fraction {
            num: Box::new(build(pool, e.child_at_index(pool, 0), mode, digits)),
            den: Box::new(build(pool, e.child_at_index(pool, 1), mode, digits)),
        },
        NodeKind::Power => {
            let base = child_box(pool, e, 0, mode, digits);
            // A power base that is itself a power keeps parentheses to
            // distinguish (a^b)^c from a^(b^c).
            let base = if e.child_at_index(pool, 0).kind(pool) == NodeKind::Power {
                Layout::Parenthesis(Box::new(base))
            } else {
                base
            };
            let exp = build(pool, e.child_at_index(pool, 1), mode, digits);
            Layout::Horizontal(vec![base, Layout::Superscript(Box::new(exp))])
        }
        NodeKind::Opposite => {
            let inner = child_box(pool, e, 0, mode, digits);
            Layout::Horizontal(vec![Layout::CodePoint('-'), inner])
        }
        NodeKind::Parenthesis => Layout::Parenthesis(Box::new(build(
            pool,
            e.child_at_index(pool, 0),
            mode,
            digits,
        ))),
        NodeKind::PercentSimple => {
            let inner = child_box(pool, e, 0, mode, digits);
            Layout::Horizontal(vec![inner, Layout::CodePoint('%')])
        }
        NodeKind::PercentAddition => {
            let base = child_box(pool, e, 0, mode, digits);
            let delta = e.child_at_index(pool, 1);
            let (arrow, delta_box) = match delta.kind(pool) {
                NodeKind::Opposite => (
                    '↘',
                    build(pool, delta.child_at_index(pool, 0), mode, digits),
                ),
                NodeKind::Integer(v) if v < 0 => ('↘', Layout::string(&v.unsigned_abs().to_string())),
                NodeKind::Float(v) if v < 0.0 => {
                    ('↘', Layout::string(&format_float(-v, mode, digits)))
                }
                _ => ('↗', build(pool, delta, mode, digits)),
            };
            Layout::Horizontal(vec![
                base,
                Layout::CodePoint(arrow),
                delta_box,
                Layout::CodePoint('%'),
            ])
        }
        NodeKind::Builtin(BuiltinFunction::Sqrt) => Layout::Radical(Box::new(build(
            pool,
            e.child_at_index(pool, 0),
            mode,
            digits,
        ))),
        NodeKind::Builtin(f) => {
            let name = match f {
                BuiltinFunction::Sin => "sin",
                BuiltinFunction::Cos => "cos",
                BuiltinFunction::Tan => "tan",
                BuiltinFunction::Sqrt => unreachable!(),
            };
            Layout::Horizontal(vec![
                Layout::string(name),
                Layout::Parenthesis(Box::new(build(pool, e.child_at_index(pool, 0), mode, digits))),
            ])
        }
        NodeKind::Call { symbol, .. } => {
            let mut args = Vec::new();
            for i in 0..e.number_of_children(pool) {
                if i > 0 {
                    args.push(Layout::CodePoint(','));
                }
                args.push(build(pool, e.child_at_index(pool, i), mode, digits));
            }
            Layout::Horizontal(vec![
                Layout::string(pool.symbol_name(symbol).unwrap_or("?")),
                Layout::Parenthesis(Box::new(Layout::Horizontal(args))),
            ])
        }
    }
}
