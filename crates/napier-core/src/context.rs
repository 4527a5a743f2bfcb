//! Reduction context and the compute-context callback interface.

use crate::error::PoolError;
use crate::expression::Expression;
use crate::node::SymbolId;
use crate::pool::Pool;

/// What the reduced form will be used for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReductionTarget {
    /// A human will read the result; beautification follows.
    User,
    /// The result feeds further computation.
    System,
}

/// Unit used to interpret trigonometric arguments.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AngleUnit {
    /// Radians.
    Radian,
    /// Degrees (360 per turn).
    Degree,
    /// Gradians (400 per turn).
    Gradian,
}

impl AngleUnit {
    /// Converts a value in this unit to radians.
    #[must_use]
    pub fn to_radians(self, value: f64) -> f64 {
        match self {
            AngleUnit::Radian => value,
            AngleUnit::Degree => value * std::f64::consts::PI / 180.0,
            AngleUnit::Gradian => value * std::f64::consts::PI / 200.0,
        }
    }
}

/// Resolution interface for symbols and user-defined functions.
///
/// Every method may answer "unknown"; the pipeline propagates that as the
/// distinguished undefined value rather than failing.
pub trait ComputeContext {
    /// An exact expression bound to a symbol, built into `pool` as a
    /// detached root, or the uninitialized expression when unknown.
    fn expression_for_symbol(
        &self,
        _pool: &mut Pool,
        _symbol: SymbolId,
    ) -> Result<Expression, PoolError> {
        Ok(Expression::uninitialized())
    }

    /// A numeric value bound to a symbol.
    fn value_for_symbol(&self, _symbol: SymbolId) -> Option<f64> {
        None
    }

    /// A numeric value for a user-defined function application.
    fn value_for_function(&self, _function: SymbolId, _args: &[f64]) -> Option<f64> {
        None
    }
}

/// A context that resolves nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct EmptyContext;

impl ComputeContext for EmptyContext {}

/// Flags threaded through every pipeline call.
///
/// Copied, never mutated in place: a sub-call needing different flags makes
/// its own copy with the constructors below.
#[derive(Clone, Copy)]
pub struct ReductionContext<'a> {
    /// What the reduced form is for.
    pub target: ReductionTarget,
    /// Angle unit for trigonometric evaluation.
    pub angle_unit: AngleUnit,
    /// Symbol/function resolution callback.
    pub compute: &'a dyn ComputeContext,
}

impl<'a> ReductionContext<'a> {
    /// A context reducing for user display.
    #[must_use]
    pub fn user(compute: &'a dyn ComputeContext) -> Self {
        Self {
            target: ReductionTarget::User,
            angle_unit: AngleUnit::Radian,
            compute,
        }
    }

    /// A context reducing for further internal computation.
    #[must_use]
    pub fn system(compute: &'a dyn ComputeContext) -> Self {
        Self {
            target: ReductionTarget::System,
            angle_unit: AngleUnit::Radian,
            compute,
        }
    }

    /// A copy of this context with a different target.
    #[must_use]
    pub fn with_target(self, target: ReductionTarget) -> Self {
        Self { target, ..self }
    }

    /// A copy of this context with a different angle unit.
    #[must_use]
    pub fn with_angle_unit(self, angle_unit: AngleUnit) -> Self {
        Self { angle_unit, ..self }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn angle_conversion() {
        assert!((AngleUnit::Degree.to_radians(180.0) - std::f64::consts::PI).abs() < 1e-12);
        assert!((AngleUnit::Gradian.to_radians(200.0) - std::f64::consts::PI).abs() < 1e-12);
        assert_eq!(AngleUnit::Radian.to_radians(1.5), 1.5);
    }

    #[test]
    fn empty_context_resolves_nothing() {
        let ctx = EmptyContext;
        assert_eq!(ctx.value_for_symbol(0), None);
        assert_eq!(ctx.value_for_function(0, &[1.0]), None);
    }
}
