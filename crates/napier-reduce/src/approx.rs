//! Numeric evaluation of expression trees.
//!
//! Approximation is a read-only projection: it never allocates in the
//! pool and it never fails. Anything it cannot evaluate comes back as
//! [`Evaluation::Undefined`], folding NaN and infinities into the same
//! terminal value so callers see one notion of "no number here".

use napier_core::node::{BuiltinFunction, NodeKind};
use napier_core::{Expression, Pool, ReductionContext};
use num_traits::Float;

/// The result of evaluating a tree over `T`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Evaluation<T> {
    /// A finite real value.
    Real(T),
    /// A finite complex value with a nonzero imaginary part.
    Complex {
        /// Real part.
        re: T,
        /// Imaginary part.
        im: T,
    },
    /// No numeric value: undefined input, NaN, or overflow to infinity.
    Undefined,
}

impl<T: Float> Evaluation<T> {
    /// Collapses non-finite parts to `Undefined` and a zero imaginary
    /// part to `Real`.
    fn normalized(self) -> Self {
        match self {
            Evaluation::Real(v) if v.is_finite() => Evaluation::Real(v),
            Evaluation::Complex { re, im } if re.is_finite() && im.is_finite() => {
                if im == T::zero() {
                    Evaluation::Real(re)
                } else {
                    Evaluation::Complex { re, im }
                }
            }
            _ => Evaluation::Undefined,
        }
    }

    /// The value as a real scalar, if it is one.
    #[must_use]
    pub fn to_scalar(self) -> Option<T> {
        match self.normalized() {
            Evaluation::Real(v) => Some(v),
            _ => None,
        }
    }

    fn add(self, other: Self) -> Self {
        match (self, other) {
            (Evaluation::Undefined, _) | (_, Evaluation::Undefined) => Evaluation::Undefined,
            (a, b) => {
                let (ar, ai) = a.parts();
                let (br, bi) = b.parts();
                Evaluation::Complex {
                    re: ar + br,
                    im: ai + bi,
                }
                .normalized()
            }
        }
    }

    fn mul(self, other: Self) -> Self {
        match (self, other) {
            (Evaluation::Undefined, _) | (_, Evaluation::Undefined) => Evaluation::Undefined,
            (a, b) => {
                let (ar, ai) = a.parts();
                let (br, bi) = b.parts();
                Evaluation::Complex {
                    re: ar * br - ai * bi,
                    im: ar * bi + ai * br,
                }
                .normalized()
            }
        }
    }

    fn div(self, other: Self) -> Self {
        match (self, other) {
            (Evaluation::Undefined, _) | (_, Evaluation::Undefined) => Evaluation::Undefined,
            (a, b) => {
                let (ar, ai) = a.parts();
                let (br, bi) = b.parts();
                let d = br * br + bi * bi;
                if d == T::zero() {
                    return Evaluation::Undefined;
                }
                Evaluation::Complex {
                    re: (ar * br + ai * bi) / d,
                    im: (ai * br - ar * bi) / d,
                }
                .normalized()
            }
        }
    }

    fn neg(self) -> Self {
        match self {
            Evaluation::Real(v) => Evaluation::Real(-v),
            Evaluation::Complex { re, im } => Evaluation::Complex { re: -re, im: -im },
            Evaluation::Undefined => Evaluation::Undefined,
        }
    }

    fn sqrt(self) -> Self {
        match self.normalized() {
            Evaluation::Real(v) if v >= T::zero() => Evaluation::Real(v.sqrt()).normalized(),
            Evaluation::Real(v) => Evaluation::Complex {
                re: T::zero(),
                im: (-v).sqrt(),
            }
            .normalized(),
            Evaluation::Complex { re, im } => {
                // Principal square root through polar form.
                let m = (re * re + im * im).sqrt().sqrt();
                let theta = im.atan2(re) / lit(2.0);
                Evaluation::Complex {
                    re: m * theta.cos(),
                    im: m * theta.sin(),
                }
                .normalized()
            }
            Evaluation::Undefined => Evaluation::Undefined,
        }
    }

    fn pow(self, exp: Self) -> Self {
        match (self.normalized(), exp.normalized()) {
            (Evaluation::Real(b), Evaluation::Real(x)) => {
                if b >= T::zero() || x.fract() == T::zero() {
                    Evaluation::Real(b.powf(x)).normalized()
                } else {
                    // Negative base, fractional exponent: complex branch
                    // cuts are out of scope for display evaluation.
                    Evaluation::Undefined
                }
            }
            _ => Evaluation::Undefined,
        }
    }

    fn parts(self) -> (T, T) {
        match self {
            Evaluation::Real(v) => (v, T::zero()),
            Evaluation::Complex { re, im } => (re, im),
            Evaluation::Undefined => (T::nan(), T::nan()),
        }
    }
}

fn lit<T: Float>(v: f64) -> T {
    T::from(v).unwrap_or_else(T::nan)
}

/// Evaluates `e` over `T` (`f32` or `f64` in practice).
pub fn approximate<T: Float>(
    pool: &Pool,
    e: &Expression,
    ctx: &ReductionContext<'_>,
) -> Evaluation<T> {
    eval(pool, *e, ctx)
}

fn eval<T: Float>(pool: &Pool, e: Expression, ctx: &ReductionContext<'_>) -> Evaluation<T> {
    match e.kind(pool) {
        NodeKind::Integer(v) => Evaluation::Real(lit(v as f64)).normalized(),
        NodeKind::Rational { num, den } => {
            Evaluation::Real(lit::<T>(num as f64) / lit(den as f64)).normalized()
        }
        NodeKind::Float(v) => Evaluation::Real(lit(v)).normalized(),
        NodeKind::Symbol(id) => match ctx.compute.value_for_symbol(id) {
            Some(v) => Evaluation::Real(lit(v)).normalized(),
            None => Evaluation::Undefined,
        },
        NodeKind::Undefined => Evaluation::Undefined,
        NodeKind::Addition { .. } => {
            let mut acc = eval(pool, e.child_at_index(pool, 0), ctx);
            for i in 1..e.number_of_children(pool) {
                acc = acc.add(eval(pool, e.child_at_index(pool, i), ctx));
            }
            acc
        }
        NodeKind::Multiplication { .. } => {
            let mut acc = eval(pool, e.child_at_index(pool, 0), ctx);
            for i in 1..e.number_of_children(pool) {
                acc = acc.mul(eval(pool, e.child_at_index(pool, i), ctx));
            }
            acc
        }
        NodeKind::Subtraction => {
            let a = eval(pool, e.child_at_index(pool, 0), ctx);
            let b = eval(pool, e.child_at_index(pool, 1), ctx);
            a.add(b.neg())
        }
        NodeKind::Division => {
            let a = eval(pool, e.child_at_index(pool, 0), ctx);
            let b = eval(pool, e.child_at_index(pool, 1), ctx);
            a.div(b)
        }
        NodeKind::Power => {
            let b = eval(pool, e.child_at_index(pool, 0), ctx);
            let x = eval(pool, e.child_at_index(pool, 1), ctx);
            b.pow(x)
        }
        NodeKind::Opposite => eval(pool, e.child_at_index(pool, 0), ctx).neg(),
        NodeKind::Parenthesis => eval(pool, e.child_at_index(pool, 0), ctx),
        NodeKind::PercentSimple => {
            // a% evaluates as a/100.
            match eval::<T>(pool, e.child_at_index(pool, 0), ctx).to_scalar() {
                Some(a) => Evaluation::Real(a / lit(100.0)).normalized(),
                None => Evaluation::Undefined,
            }
        }
        NodeKind::PercentAddition => {
            // a + b% evaluates as a * (1 + b/100); a negative b is
            // carried by the sign of the evaluated child.
            let a = eval::<T>(pool, e.child_at_index(pool, 0), ctx).to_scalar();
            let b = eval::<T>(pool, e.child_at_index(pool, 1), ctx).to_scalar();
            match (a, b) {
                (Some(a), Some(b)) => {
                    Evaluation::Real(a * (T::one() + b / lit(100.0))).normalized()
                }
                _ => Evaluation::Undefined,
            }
        }
        NodeKind::Builtin(f) => {
            let arg = eval(pool, e.child_at_index(pool, 0), ctx);
            match f {
                BuiltinFunction::Sqrt => arg.sqrt(),
                BuiltinFunction::Sin | BuiltinFunction::Cos | BuiltinFunction::Tan => {
                    match arg.to_scalar() {
                        Some(v) => {
                            let rad = lit::<T>(ctx.angle_unit.to_radians(1.0)) * v;
                            let r = match f {
                                BuiltinFunction::Sin => rad.sin(),
                                BuiltinFunction::Cos => rad.cos(),
                                _ => rad.tan(),
                            };
                            Evaluation::Real(r).normalized()
                        }
                        None => Evaluation::Undefined,
                    }
                }
            }
        }
        NodeKind::Call { symbol, .. } => {
            let mut args = Vec::with_capacity(e.number_of_children(pool));
            for i in 0..e.number_of_children(pool) {
                match eval::<T>(pool, e.child_at_index(pool, i), ctx).to_scalar() {
                    Some(v) => args.push(v.to_f64().unwrap_or(f64::NAN)),
                    None => return Evaluation::Undefined,
                }
            }
            match ctx.compute.value_for_function(symbol, &args) {
                Some(v) => Evaluation::Real(lit(v)).normalized(),
                None => Evaluation::Undefined,
            }
        }
    }
}
