//! Operation codes.
//!
//! A closed tagged enumeration, dispatched by pattern matching rather than
//! virtual calls (no `dyn Op` trait object anywhere in this crate), the way
//! `cranelift-codegen`'s `InstructionData`/`Opcode` pair is matched rather
//! than subclassed.

use core::fmt;

/// The comparison selector carried by the six `Com*` conditional op codes.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "enable-serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CompareOp {
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `==`
    Eq,
    /// `>=`
    Ge,
    /// `>`
    Gt,
    /// `!=`
    Ne,
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Eq => "==",
            CompareOp::Ge => ">=",
            CompareOp::Gt => ">",
            CompareOp::Ne => "!=",
        };
        f.write_str(s)
    }
}

/// All operation codes a node in the graph can carry.
///
/// Argument arity per variant (checked by [`OpCode::arity`]):
/// unary transcendentals take 1, `Add`/`Sub`/`Mul`/`Div`/`Pow` take 2,
/// the six `Com*` take 4, `ArrayElement`/`AtomicForward` take 2 with their
/// own `info` conventions (see the node module), and `ArrayCreation` takes
/// a variable number of scalar arguments.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "enable-serde", derive(serde::Serialize, serde::Deserialize))]
pub enum OpCode {
    /// An independent variable. Its position in the handler's independent
    /// registry is its identity; it carries no arguments.
    Inv,
    /// Identity forwarder, distinct from `Alias` only by provenance
    /// (see `evaluator.hpp`'s separate `Assign`/`Alias` arms) — both
    /// evaluate their single argument unchanged.
    Assign,
    /// Identity forwarder used by the solver/loop synthesizer to wrap a
    /// value without changing its algebraic meaning.
    Alias,

    /// `a + b`
    Add,
    /// `a - b`
    Sub,
    /// `a * b`
    Mul,
    /// `a / b`
    Div,
    /// `-a`
    UnMinus,
    /// `pow(a, b)`
    Pow,

    /// `abs(a)`
    Abs,
    /// `sign(a)`: +1, 0 or -1.
    Sign,
    /// `sqrt(a)`
    Sqrt,
    /// `exp(a)`
    Exp,
    /// `log(a)` (natural log)
    Log,
    /// `sin(a)`
    Sin,
    /// `cos(a)`
    Cos,
    /// `tan(a)`
    Tan,
    /// `sinh(a)`
    Sinh,
    /// `cosh(a)`
    Cosh,
    /// `tanh(a)`
    Tanh,
    /// `asin(a)`
    Asin,
    /// `acos(a)`
    Acos,
    /// `atan(a)`
    Atan,

    /// `left < right ? true_case : false_case`
    ComLt,
    /// `left <= right ? true_case : false_case`
    ComLe,
    /// `left == right ? true_case : false_case`
    ComEq,
    /// `left >= right ? true_case : false_case`
    ComGe,
    /// `left > right ? true_case : false_case`
    ComGt,
    /// `left != right ? true_case : false_case`
    ComNe,

    /// A fixed-size array literal; every argument must evaluate to a
    /// scalar.
    ArrayCreation,
    /// `arr[k]`, `args = [ArrayCreation, AtomicForward]`, `info = [k]`.
    ArrayElement,
    /// A single call into an opaque atomic function.
    /// `args = [input ArrayCreation, output ArrayCreation]`,
    /// `info = [atomic_id, q, p]`.
    AtomicForward,
    /// Reverse-mode counterpart of `AtomicForward`. Not executed by the
    /// evaluator (forward-only, see [`crate::error::CgError::UnsupportedOp`]);
    /// retained as a node shape so graphs that merely pass through a
    /// reverse sweep remain representable.
    AtomicReverse,

    /// Declares a fresh iteration-index variable for a loop body.
    IndexDeclare,
    /// Assigns a specific constant value to an index variable (used for
    /// conditional-emission guards: `iter == k`).
    IndexAssign,
    /// Reads the current value of an index variable (e.g. the value
    /// produced by a `LoopStart`).
    IndexOp,
    /// Marks the start of a loop body iterating an index declared by a
    /// prior `IndexDeclare`, `info = [iteration_count]`.
    LoopStart,
    /// Marks the end of a loop body, carrying the loop's indexed results.
    LoopEnd,
    /// An alias into a specific compressed output position synthesized by
    /// the loop Jacobian builder, `info = [position]`.
    DependentRefRhs,
}

impl OpCode {
    /// Fixed argument arity for op codes whose arity does not depend on
    /// their arguments. Returns `None` for `Inv` (no arguments) and for
    /// variable-arity codes (`ArrayCreation`, `LoopStart`, `LoopEnd`,
    /// `IndexDeclare`, `IndexAssign`, `IndexOp`), which callers must size
    /// themselves.
    pub fn fixed_arity(self) -> Option<usize> {
        use OpCode::*;
        match self {
            Inv => Some(0),
            Assign | Alias => Some(1),
            Add | Sub | Mul | Div | Pow => Some(2),
            UnMinus | Abs | Sign | Sqrt | Exp | Log | Sin | Cos | Tan | Sinh | Cosh | Tanh
            | Asin | Acos | Atan => Some(1),
            ComLt | ComLe | ComEq | ComGe | ComGt | ComNe => Some(4),
            ArrayElement => Some(2),
            AtomicForward | AtomicReverse => Some(2),
            DependentRefRhs => Some(1),
            ArrayCreation | LoopStart | LoopEnd | IndexDeclare | IndexAssign | IndexOp => None,
        }
    }

    /// Is this one of the six `Com*` conditional codes? If so, return its
    /// comparison selector.
    pub fn compare_op(self) -> Option<CompareOp> {
        match self {
            OpCode::ComLt => Some(CompareOp::Lt),
            OpCode::ComLe => Some(CompareOp::Le),
            OpCode::ComEq => Some(CompareOp::Eq),
            OpCode::ComGe => Some(CompareOp::Ge),
            OpCode::ComGt => Some(CompareOp::Gt),
            OpCode::ComNe => Some(CompareOp::Ne),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arity_matches_spec_table() {
        assert_eq!(OpCode::Add.fixed_arity(), Some(2));
        assert_eq!(OpCode::Abs.fixed_arity(), Some(1));
        assert_eq!(OpCode::ComLt.fixed_arity(), Some(4));
        assert_eq!(OpCode::ArrayElement.fixed_arity(), Some(2));
        assert_eq!(OpCode::AtomicForward.fixed_arity(), Some(2));
        assert_eq!(OpCode::ArrayCreation.fixed_arity(), None);
    }

    #[test]
    fn compare_op_roundtrip() {
        assert_eq!(OpCode::ComGe.compare_op(), Some(CompareOp::Ge));
        assert_eq!(OpCode::Add.compare_op(), None);
    }
}
