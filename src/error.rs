//! Error taxonomy for the operation-graph core.
//!
//! One closed, `Fail`-derived enum carries every failure mode the
//! evaluator, solver and loop-Jacobian builder can raise, mirroring how
//! `cranelift-codegen` centralizes its own failures in a single
//! `CodegenError` rather than returning ad hoc strings.

use crate::op::OpCode;
use failure_derive::Fail;

/// Result alias used throughout this crate.
pub type CgResult<T> = Result<T, CgError>;

/// Everything that can go wrong building, evaluating, solving or
/// re-synthesizing an operation graph.
#[derive(Fail, Debug, Clone, PartialEq)]
pub enum CgError {
    /// `evaluate` was called with a different number of independents than
    /// the handler has registered.
    #[fail(
        display = "invalid independent variable size: expected {} but got {}",
        expected, got
    )]
    ArityMismatch {
        /// Number of independents the handler expects.
        expected: usize,
        /// Number of independents actually supplied.
        got: usize,
    },

    /// An evaluator or solver encountered an [`OpCode`] it does not know
    /// how to handle in that role.
    #[fail(display = "unsupported operation '{:?}'", op)]
    UnsupportedOp {
        /// The offending op code.
        op: OpCode,
    },

    /// An `AtomicForward` node requested a nonzero forward/reverse order.
    #[fail(
        display = "evaluator can only handle zero order forward mode for atomic functions, got order {}",
        order
    )]
    UnsupportedAtomic {
        /// The requested (unsupported) order.
        order: usize,
    },

    /// An `AtomicForward` node referenced an atomic id with no registered
    /// implementation.
    #[fail(display = "no atomic function defined in the evaluator for {}", name)]
    MissingAtomic {
        /// `'<name>'` if the id was registered with a name, else `id '<n>'`.
        name: String,
    },

    /// `find_paths(expression, target, ..)` found zero paths.
    #[fail(display = "the provided variable is not present in the expression")]
    NotPresent,

    /// `find_paths(expression, target, ..)` found more than one path.
    #[fail(
        display = "unable to determine expression for variable: the provided variable was found in multiple locations (not yet supported)"
    )]
    Ambiguous,

    /// An operator along the solve path has no symbolic inverse.
    #[fail(display = "unable to invert operation '{:?}'", op)]
    NonInvertible {
        /// The non-invertible op code.
        op: OpCode,
    },

    /// A `Pow(base, 0)` node was encountered while descending the base
    /// argument.
    #[fail(display = "invalid zero exponent")]
    InvalidZeroExponent,

    /// The loop-sparsity analyzer attempted to write the same compressed
    /// position twice for the same `(row, col)`.
    #[fail(
        display = "repeated jacobian elements requested (equation {}, variable {})",
        row, col
    )]
    RepeatedJacobianElement {
        /// Original row (equation) index.
        row: usize,
        /// Original column (independent) index.
        col: usize,
    },
}
