//! The scalar bound shared by the recorded `Base` type and any `Out` type
//! the evaluator re-targets onto.
//!
//! The host AD library is out of scope for this crate (see `SPEC_FULL.md`
//! §1), but its contract names two things every concrete scalar must
//! supply: the ordinary transcendental primitives, and a `cond` primitive
//! standing in for the host's `CondExpOp` (symbolic scalars cannot branch
//! on a runtime `bool`, so comparisons must be expressed as data).
//!
//! The `f64` implementation delegates its transcendentals to
//! `num_traits::Float` rather than `std`/`libm` directly, so a caller
//! pulling in another `num-traits`-backed scalar (a dual number, a
//! checked/saturating float, ...) only has to implement this trait once
//! and gets the same primitive set `f64` does.

use core::fmt::Debug;
use core::ops::{Add, Div, Mul, Neg, Sub};

use num_traits::Float;

use crate::op::CompareOp;

/// A scalar type usable as either the recorded `Base` of a graph or the
/// `Out` type an [`Evaluator`](crate::evaluator::Evaluator) re-targets
/// onto.
pub trait Numeric:
    Copy
    + Clone
    + Debug
    + PartialEq
    + Neg<Output = Self>
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
{
    /// The additive identity.
    fn zero() -> Self;
    /// The multiplicative identity.
    fn one() -> Self;

    /// `abs(self)`
    fn abs(self) -> Self;
    /// `sign(self)`: `+1`, `0`, or `-1`.
    fn sign(self) -> Self;
    /// `sqrt(self)`
    fn sqrt(self) -> Self;
    /// `exp(self)`
    fn exp(self) -> Self;
    /// Natural logarithm.
    fn ln(self) -> Self;
    /// `sin(self)`
    fn sin(self) -> Self;
    /// `cos(self)`
    fn cos(self) -> Self;
    /// `tan(self)`
    fn tan(self) -> Self;
    /// `sinh(self)`
    fn sinh(self) -> Self;
    /// `cosh(self)`
    fn cosh(self) -> Self;
    /// `tanh(self)`
    fn tanh(self) -> Self;
    /// `asin(self)`
    fn asin(self) -> Self;
    /// `acos(self)`
    fn acos(self) -> Self;
    /// `atan(self)`
    fn atan(self) -> Self;
    /// `self.powf(other)`
    fn powf(self, other: Self) -> Self;

    /// Stand-in for the host AD library's `CondExpOp`: select `if_true`
    /// or `if_false` according to `cmp` applied to `(left, right)`,
    /// without the caller ever branching on a symbolic condition itself.
    fn cond(cmp: CompareOp, left: Self, right: Self, if_true: Self, if_false: Self) -> Self;

    /// `self == 0`, used by the solver's `Pow` exponent checks. Provided
    /// in terms of `PartialEq` + `zero` so implementors don't need to add
    /// another method.
    fn is_zero(self) -> bool {
        self == Self::zero()
    }

    /// `self == 1`, used by the solver's `Pow` exponent pass-through.
    fn is_one(self) -> bool {
        self == Self::one()
    }
}

impl Numeric for f64 {
    fn zero() -> Self {
        0.0
    }
    fn one() -> Self {
        1.0
    }
    fn abs(self) -> Self {
        Float::abs(self)
    }
    fn sign(self) -> Self {
        if self > 0.0 {
            1.0
        } else if self < 0.0 {
            -1.0
        } else {
            0.0
        }
    }
    fn sqrt(self) -> Self {
        Float::sqrt(self)
    }
    fn exp(self) -> Self {
        Float::exp(self)
    }
    fn ln(self) -> Self {
        Float::ln(self)
    }
    fn sin(self) -> Self {
        Float::sin(self)
    }
    fn cos(self) -> Self {
        Float::cos(self)
    }
    fn tan(self) -> Self {
        Float::tan(self)
    }
    fn sinh(self) -> Self {
        Float::sinh(self)
    }
    fn cosh(self) -> Self {
        Float::cosh(self)
    }
    fn tanh(self) -> Self {
        Float::tanh(self)
    }
    fn asin(self) -> Self {
        Float::asin(self)
    }
    fn acos(self) -> Self {
        Float::acos(self)
    }
    fn atan(self) -> Self {
        Float::atan(self)
    }
    fn powf(self, other: Self) -> Self {
        Float::powf(self, other)
    }
    fn cond(cmp: CompareOp, left: Self, right: Self, if_true: Self, if_false: Self) -> Self {
        let take = match cmp {
            CompareOp::Lt => left < right,
            CompareOp::Le => left <= right,
            CompareOp::Eq => left == right,
            CompareOp::Ge => left >= right,
            CompareOp::Gt => left > right,
            CompareOp::Ne => left != right,
        };
        if take {
            if_true
        } else {
            if_false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn f64_cond_selects_branch() {
        assert_eq!(f64::cond(CompareOp::Lt, 1.0, 2.0, 10.0, 20.0), 10.0);
        assert_eq!(f64::cond(CompareOp::Gt, 1.0, 2.0, 10.0, 20.0), 20.0);
    }

    #[test]
    fn f64_sign() {
        assert_eq!(Numeric::sign(3.5_f64), 1.0);
        assert_eq!(Numeric::sign(-3.5_f64), -1.0);
        assert_eq!(Numeric::sign(0.0_f64), 0.0);
    }
}
