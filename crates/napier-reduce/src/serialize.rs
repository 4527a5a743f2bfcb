//! Infix text projection of expression trees.
//!
//! Serialization is read-only and total: every tree has a textual form,
//! with `undef` standing in for the undefined value. Parentheses are
//! emitted from operator precedence so the text re-reads as the same
//! tree shape, on top of any explicit parenthesis nodes beautification
//! inserted.

use std::fmt::Write as _;

use napier_core::node::{BuiltinFunction, NodeKind};
use napier_core::{Expression, Pool};

/// How floating-point leaves are printed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FloatDisplayMode {
    /// Positional notation where the exponent allows, `1.5e12` style
    /// otherwise.
    Decimal,
    /// Always mantissa-exponent notation.
    Scientific,
}

/// Serializes `e` into `buffer`.
///
/// At most `buffer.len() - 1` bytes are written, truncating at a UTF-8
/// boundary. When the text fits, the byte count is returned; a return
/// value of `buffer.len() - 1` or more means it did not fit and the
/// caller should retry with a larger buffer, even if the boundary
/// backoff wrote fewer bytes than that.
pub fn serialize(
    pool: &Pool,
    e: Expression,
    buffer: &mut [u8],
    mode: FloatDisplayMode,
    significant_digits: usize,
) -> usize {
    let s = serialize_to_string(pool, e, mode, significant_digits);
    let mut end = s.len().min(buffer.len().saturating_sub(1));
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    buffer[..end].copy_from_slice(&s.as_bytes()[..end]);
    if end < s.len() {
        // Backing off to a UTF-8 boundary must not shrink the count
        // into the range the caller reads as a complete fit.
        buffer.len().saturating_sub(1)
    } else {
        end
    }
}

/// Serializes `e` into an owned string.
#[must_use]
pub fn serialize_to_string(
    pool: &Pool,
    e: Expression,
    mode: FloatDisplayMode,
    significant_digits: usize,
) -> String {
    let mut out = String::new();
    write_expr(&mut out, pool, e, mode, significant_digits);
    out
}

/// Binding strength of a node's textual form. Lower binds looser.
/// Negative numerals count as loose so they pick up parentheses
/// wherever a bare minus sign would regroup.
fn precedence(kind: NodeKind) -> u8 {
    match kind {
        NodeKind::Integer(v) if v < 0 => 1,
        NodeKind::Float(v) if v < 0.0 => 1,
        NodeKind::Rational { num, .. } if num < 0 => 1,
        NodeKind::Addition { .. }
        | NodeKind::Subtraction
        | NodeKind::Opposite
        | NodeKind::PercentAddition => 1,
        NodeKind::Multiplication { .. } => 2,
        NodeKind::Division | NodeKind::Rational { .. } => 3,
        NodeKind::Power | NodeKind::PercentSimple => 4,
        _ => 6,
    }
}

fn write_child(
    out: &mut String,
    pool: &Pool,
    child: Expression,
    parenthesize_at_or_below: u8,
    mode: FloatDisplayMode,
    digits: usize,
) {
    if precedence(child.kind(pool)) <= parenthesize_at_or_below {
        out.push('(');
        write_expr(out, pool, child, mode, digits);
        out.push(')');
    } else {
        write_expr(out, pool, child, mode, digits);
    }
}

fn write_expr(out: &mut String, pool: &Pool, e: Expression, mode: FloatDisplayMode, digits: usize) {
    match e.kind(pool) {
        NodeKind::Integer(v) => {
            let _ = write!(out, "{v}");
        }
        NodeKind::Rational { num, den } => {
            let _ = write!(out, "{num}/{den}");
        }
        NodeKind::Float(v) => out.push_str(&format_float(v, mode, digits)),
        NodeKind::Symbol(id) => out.push_str(pool.symbol_name(id).unwrap_or("?")),
        NodeKind::Undefined => out.push_str("undef"),
        NodeKind::Addition { .. } => {
            for i in 0..e.number_of_children(pool) {
                if i > 0 {
                    out.push('+');
                }
                let bound = if i > 0 { 1 } else { 0 };
                write_child(out, pool, e.child_at_index(pool, i), bound, mode, digits);
            }
        }
        NodeKind::Subtraction => {
            write_child(out, pool, e.child_at_index(pool, 0), 0, mode, digits);
            out.push('-');
            write_child(out, pool, e.child_at_index(pool, 1), 1, mode, digits);
        }
        NodeKind::Multiplication { .. } => {
            for i in 0..e.number_of_children(pool) {
                if i > 0 {
                    out.push('×');
                }
                write_child(out, pool, e.child_at_index(pool, i), 1, mode, digits);
            }
        }
        NodeKind::Division => {
            write_child(out, pool, e.child_at_index(pool, 0), 3, mode, digits);
            out.push('/');
            write_child(out, pool, e.child_at_index(pool, 1), 3, mode, digits);
        }
        NodeKind::Power => {
            write_child(out, pool, e.child_at_index(pool, 0), 4, mode, digits);
            out.push('^');
            write_child(out, pool, e.child_at_index(pool, 1), 3, mode, digits);
        }
        NodeKind::Opposite => {
            out.push('-');
            write_child(out, pool, e.child_at_index(pool, 0), 1, mode, digits);
        }
        NodeKind::Parenthesis => {
            out.push('(');
            write_expr(out, pool, e.child_at_index(pool, 0), mode, digits);
            out.push(')');
        }
        NodeKind::PercentSimple => {
            write_child(out, pool, e.child_at_index(pool, 0), 3, mode, digits);
            out.push('%');
        }
        NodeKind::PercentAddition => {
            write_child(out, pool, e.child_at_index(pool, 0), 1, mode, digits);
            let delta = e.child_at_index(pool, 1);
            match delta.kind(pool) {
                // A decrease prints its delta without the sign; the
                // arrow carries it.
                NodeKind::Opposite => {
                    out.push('↘');
                    write_child(out, pool, delta.child_at_index(pool, 0), 3, mode, digits);
                }
                NodeKind::Integer(v) if v < 0 => {
                    let _ = write!(out, "↘{}", v.unsigned_abs());
                }
                NodeKind::Float(v) if v < 0.0 => {
                    out.push('↘');
                    out.push_str(&format_float(-v, mode, digits));
                }
                NodeKind::Rational { num, den } if num < 0 => {
                    let _ = write!(out, "↘({}/{den})", -num);
                }
                _ => {
                    out.push('↗');
                    write_child(out, pool, delta, 3, mode, digits);
                }
            }
            out.push('%');
        }
        NodeKind::Builtin(f) => {
            out.push_str(builtin_name(f));
            out.push('(');
            write_expr(out, pool, e.child_at_index(pool, 0), mode, digits);
            out.push(')');
        }
        NodeKind::Call { symbol, .. } => {
            out.push_str(pool.symbol_name(symbol).unwrap_or("?"));
            out.push('(');
            for i in 0..e.number_of_children(pool) {
                if i > 0 {
                    out.push(',');
                }
                write_expr(out, pool, e.child_at_index(pool, i), mode, digits);
            }
            out.push(')');
        }
    }
}

fn builtin_name(f: BuiltinFunction) -> &'static str {
    match f {
        BuiltinFunction::Sqrt => "√",
        BuiltinFunction::Sin => "sin",
        BuiltinFunction::Cos => "cos",
        BuiltinFunction::Tan => "tan",
    }
}

/// Prints `v` with at most `digits` significant digits, trimming
/// trailing zeros.
pub(crate) fn format_float(v: f64, mode: FloatDisplayMode, digits: usize) -> String {
    if v == 0.0 {
        return "0".to_owned();
    }
    if !v.is_finite() {
        return "undef".to_owned();
    }
    let digits = digits.max(1);
    let s = format!("{:.*e}", digits - 1, v);
    let (mantissa, exp) = match s.split_once('e') {
        Some(pair) => pair,
        None => (s.as_str(), "0"),
    };
    let exp: i32 = exp.parse().unwrap_or(0);
    let mantissa = mantissa.trim_end_matches('0').trim_end_matches('.');
    let positional_fits = -4 <= exp && exp < digits as i32 + 3;
    if mode == FloatDisplayMode::Scientific || !positional_fits {
        if exp == 0 {
            mantissa.to_owned()
        } else {
            format!("{mantissa}e{exp}")
        }
    } else {
        positional(mantissa, exp)
    }
}

fn positional(mantissa: &str, exp: i32) -> String {
    let (sign, m) = match mantissa.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", mantissa),
    };
    let digits: String = m.chars().filter(|c| *c != '.').collect();
    let point = 1 + exp;
    if point <= 0 {
        let pad = "0".repeat(point.unsigned_abs() as usize);
        format!("{sign}0.{pad}{digits}")
    } else if point as usize >= digits.len() {
        let pad = "0".repeat(point as usize - digits.len());
        format!("{sign}{digits}{pad}")
    } else {
        format!("{sign}{}.{}", &digits[..point as usize], &digits[point as usize..])
    }
}
