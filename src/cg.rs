//! The symbolic scalar recorded onto a [`CodeHandler`](crate::handler::CodeHandler).
//!
//! `CG` is either a bare [`Parameter`](CG::Parameter) (no handler attached
//! at all, same as the original's `isParameter()` case) or a
//! [`Variable`](CG::Variable) tied to one node of one handler's arena, with
//! an optionally-known forward value cached alongside it. Operator
//! overloads extend the graph the way `math.hpp`'s `CPPAD_CG_CREATE_OPERATION`
//! macro extends `CG<Base>`: two parameters always fold to a parameter with
//! no handler involved (there is nowhere to record a node), and a
//! `Variable` combined with an identity-element parameter (`x + 0`, `x * 1`,
//! ...) is elided rather than allocated when
//! [`HandlerConfig::constant_folding`](crate::config::HandlerConfig::constant_folding)
//! is set.

use core::fmt;
use core::ops::{Add, Div, Mul, Neg, Sub};

use smallvec::smallvec;

use crate::entity::NodeId;
use crate::handler::CodeHandler;
use crate::node::Argument;
use crate::num::Numeric;
use crate::op::{CompareOp, OpCode};

/// A symbolic scalar: either a bare constant or a reference to a node of a
/// [`CodeHandler`]'s arena, with an optional cached forward value.
pub enum CG<'h, B: Numeric> {
    /// A constant not tied to any handler.
    Parameter(B),
    /// A reference to a node, plus its forward value if known.
    Variable {
        handler: &'h CodeHandler<B>,
        node: NodeId,
        value: Option<B>,
    },
}

impl<'h, B: Numeric> CG<'h, B> {
    /// Build a bare parameter.
    pub fn parameter(value: B) -> Self {
        CG::Parameter(value)
    }

    /// Wrap an existing node with no known forward value.
    pub fn from_node(handler: &'h CodeHandler<B>, node: NodeId) -> Self {
        CG::Variable {
            handler,
            node,
            value: None,
        }
    }

    /// Wrap an existing node together with its known forward value.
    pub fn from_node_with_value(handler: &'h CodeHandler<B>, node: NodeId, value: B) -> Self {
        CG::Variable {
            handler,
            node,
            value: Some(value),
        }
    }

    /// Is this a bare constant?
    pub fn is_parameter(&self) -> bool {
        matches!(self, CG::Parameter(_))
    }

    /// Is this tied to a handler node?
    pub fn is_variable(&self) -> bool {
        matches!(self, CG::Variable { .. })
    }

    /// The known forward value, if any.
    pub fn value(&self) -> Option<B> {
        match self {
            CG::Parameter(v) => Some(*v),
            CG::Variable { value, .. } => *value,
        }
    }

    /// The node this value is tied to, if it is a `Variable`.
    pub fn node_id(&self) -> Option<NodeId> {
        match self {
            CG::Parameter(_) => None,
            CG::Variable { node, .. } => Some(*node),
        }
    }

    /// The handler this value is tied to, if it is a `Variable`.
    pub fn handler(&self) -> Option<&'h CodeHandler<B>> {
        match self {
            CG::Parameter(_) => None,
            CG::Variable { handler, .. } => Some(*handler),
        }
    }

    /// This value's representation as a node argument (shared with the
    /// loop Jacobian synthesizer, which needs to thread already-built `CG`
    /// results into `LoopEnd`'s argument list).
    pub(crate) fn as_argument(&self) -> Argument<B> {
        match self {
            CG::Parameter(v) => Argument::Parameter(*v),
            CG::Variable { node, .. } => Argument::Node(*node),
        }
    }

    fn unary_op<F: Fn(B) -> B>(self, op: OpCode, apply: F) -> Self {
        match self {
            CG::Parameter(v) => CG::Parameter(apply(v)),
            CG::Variable { handler, node, value } => {
                let new_value = value.map(&apply);
                let args = smallvec![Argument::Node(node)];
                let new_node = handler.add_node(op, args, smallvec::SmallVec::new());
                CG::Variable {
                    handler,
                    node: new_node,
                    value: new_value,
                }
            }
        }
    }

    fn binary_op<F: Fn(B, B) -> B>(self, other: Self, op: OpCode, apply: F) -> Self {
        if let (CG::Parameter(a), CG::Parameter(b)) = (&self, &other) {
            return CG::Parameter(apply(*a, *b));
        }
        let handler = self
            .handler()
            .or_else(|| other.handler())
            .expect("at least one operand of a CG binary operation must be a Variable");
        if handler.config().constant_folding {
            if let Some(folded) = identity_fold(op, &self, &other) {
                return folded;
            }
        }
        let value = match (self.value(), other.value()) {
            (Some(a), Some(b)) => Some(apply(a, b)),
            _ => None,
        };
        let args = smallvec![self.as_argument(), other.as_argument()];
        let node = handler.add_node(op, args, smallvec::SmallVec::new());
        CG::Variable { handler, node, value }
    }

    /// `abs(self)`
    pub fn abs(self) -> Self {
        self.unary_op(OpCode::Abs, Numeric::abs)
    }
    /// `sign(self)`
    pub fn sign(self) -> Self {
        self.unary_op(OpCode::Sign, Numeric::sign)
    }
    /// `sqrt(self)`
    pub fn sqrt(self) -> Self {
        self.unary_op(OpCode::Sqrt, Numeric::sqrt)
    }
    /// `exp(self)`
    pub fn exp(self) -> Self {
        self.unary_op(OpCode::Exp, Numeric::exp)
    }
    /// Natural logarithm.
    pub fn ln(self) -> Self {
        self.unary_op(OpCode::Log, Numeric::ln)
    }
    /// `sin(self)`
    pub fn sin(self) -> Self {
        self.unary_op(OpCode::Sin, Numeric::sin)
    }
    /// `cos(self)`
    pub fn cos(self) -> Self {
        self.unary_op(OpCode::Cos, Numeric::cos)
    }
    /// `tan(self)`
    pub fn tan(self) -> Self {
        self.unary_op(OpCode::Tan, Numeric::tan)
    }
    /// `sinh(self)`
    pub fn sinh(self) -> Self {
        self.unary_op(OpCode::Sinh, Numeric::sinh)
    }
    /// `cosh(self)`
    pub fn cosh(self) -> Self {
        self.unary_op(OpCode::Cosh, Numeric::cosh)
    }
    /// `tanh(self)`
    pub fn tanh(self) -> Self {
        self.unary_op(OpCode::Tanh, Numeric::tanh)
    }
    /// `asin(self)`
    pub fn asin(self) -> Self {
        self.unary_op(OpCode::Asin, Numeric::asin)
    }
    /// `acos(self)`
    pub fn acos(self) -> Self {
        self.unary_op(OpCode::Acos, Numeric::acos)
    }
    /// `atan(self)`
    pub fn atan(self) -> Self {
        self.unary_op(OpCode::Atan, Numeric::atan)
    }

    /// `self.powf(other)`
    pub fn powf(self, other: Self) -> Self {
        self.binary_op(other, OpCode::Pow, Numeric::powf)
    }

    /// Stand-in for the host AD library's `CondExpOp`, the `CG`-level
    /// counterpart of [`Numeric::cond`]: builds one of the six `Com*` nodes,
    /// or folds to a parameter outright when all four operands are bare
    /// constants.
    pub fn cond(cmp: CompareOp, left: Self, right: Self, if_true: Self, if_false: Self) -> Self {
        let op = match cmp {
            CompareOp::Lt => OpCode::ComLt,
            CompareOp::Le => OpCode::ComLe,
            CompareOp::Eq => OpCode::ComEq,
            CompareOp::Ge => OpCode::ComGe,
            CompareOp::Gt => OpCode::ComGt,
            CompareOp::Ne => OpCode::ComNe,
        };
        if let (CG::Parameter(l), CG::Parameter(r), CG::Parameter(t), CG::Parameter(f)) =
            (&left, &right, &if_true, &if_false)
        {
            return CG::Parameter(B::cond(cmp, *l, *r, *t, *f));
        }
        let handler = left
            .handler()
            .or_else(|| right.handler())
            .or_else(|| if_true.handler())
            .or_else(|| if_false.handler())
            .expect("at least one operand of a conditional must be a Variable");
        let value = match (left.value(), right.value(), if_true.value(), if_false.value()) {
            (Some(l), Some(r), Some(t), Some(f)) => Some(B::cond(cmp, l, r, t, f)),
            _ => None,
        };
        let args = smallvec![
            left.as_argument(),
            right.as_argument(),
            if_true.as_argument(),
            if_false.as_argument(),
        ];
        let node = handler.add_node(op, args, smallvec::SmallVec::new());
        CG::Variable { handler, node, value }
    }
}

/// Elide a binary op against an identity-element parameter operand (`x + 0`,
/// `x - 0`, `x * 1`, `x * 0`, `x / 1`), returning the equivalent operand
/// unchanged (or a fresh `Parameter(0)`) instead of letting the caller
/// allocate a no-op node. Only reached once at least one side is already a
/// `Variable`; both-parameter folding is handled unconditionally by the
/// caller before this runs.
fn identity_fold<'h, B: Numeric>(op: OpCode, lhs: &CG<'h, B>, rhs: &CG<'h, B>) -> Option<CG<'h, B>> {
    match op {
        OpCode::Add => {
            if let CG::Parameter(v) = rhs {
                if v.is_zero() {
                    return Some(copy(lhs));
                }
            }
            if let CG::Parameter(v) = lhs {
                if v.is_zero() {
                    return Some(copy(rhs));
                }
            }
        }
        OpCode::Sub => {
            if let CG::Parameter(v) = rhs {
                if v.is_zero() {
                    return Some(copy(lhs));
                }
            }
        }
        OpCode::Mul => {
            if let CG::Parameter(v) = rhs {
                if v.is_one() {
                    return Some(copy(lhs));
                }
                if v.is_zero() {
                    return Some(CG::Parameter(B::zero()));
                }
            }
            if let CG::Parameter(v) = lhs {
                if v.is_one() {
                    return Some(copy(rhs));
                }
                if v.is_zero() {
                    return Some(CG::Parameter(B::zero()));
                }
            }
        }
        OpCode::Div => {
            if let CG::Parameter(v) = rhs {
                if v.is_one() {
                    return Some(copy(lhs));
                }
            }
        }
        _ => {}
    }
    None
}

fn copy<'h, B: Numeric>(v: &CG<'h, B>) -> CG<'h, B> {
    match v {
        CG::Parameter(x) => CG::Parameter(*x),
        CG::Variable { handler, node, value } => CG::Variable {
            handler: *handler,
            node: *node,
            value: *value,
        },
    }
}

impl<'h, B: Numeric> Clone for CG<'h, B> {
    fn clone(&self) -> Self {
        copy(self)
    }
}

impl<'h, B: Numeric> Copy for CG<'h, B> {}

impl<'h, B: Numeric> fmt::Debug for CG<'h, B> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CG::Parameter(v) => f.debug_tuple("Parameter").field(v).finish(),
            CG::Variable { node, value, .. } => f
                .debug_struct("Variable")
                .field("node", node)
                .field("value", value)
                .finish(),
        }
    }
}

impl<'h, B: Numeric> PartialEq for CG<'h, B> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (CG::Parameter(a), CG::Parameter(b)) => a == b,
            (CG::Variable { node: n1, .. }, CG::Variable { node: n2, .. }) => n1 == n2,
            _ => false,
        }
    }
}

impl<'h, B: Numeric> From<B> for CG<'h, B> {
    fn from(value: B) -> Self {
        CG::Parameter(value)
    }
}

impl<'h, B: Numeric> Add for CG<'h, B> {
    type Output = CG<'h, B>;
    fn add(self, other: Self) -> Self::Output {
        self.binary_op(other, OpCode::Add, |a, b| a + b)
    }
}

impl<'h, B: Numeric> Sub for CG<'h, B> {
    type Output = CG<'h, B>;
    fn sub(self, other: Self) -> Self::Output {
        self.binary_op(other, OpCode::Sub, |a, b| a - b)
    }
}

impl<'h, B: Numeric> Mul for CG<'h, B> {
    type Output = CG<'h, B>;
    fn mul(self, other: Self) -> Self::Output {
        self.binary_op(other, OpCode::Mul, |a, b| a * b)
    }
}

impl<'h, B: Numeric> Div for CG<'h, B> {
    type Output = CG<'h, B>;
    fn div(self, other: Self) -> Self::Output {
        self.binary_op(other, OpCode::Div, |a, b| a / b)
    }
}

impl<'h, B: Numeric> Neg for CG<'h, B> {
    type Output = CG<'h, B>;
    fn neg(self) -> Self::Output {
        self.unary_op(OpCode::UnMinus, |a| -a)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HandlerConfig;

    #[test]
    fn parameter_arithmetic_folds_without_handler() {
        let a = CG::<f64>::parameter(2.0);
        let b = CG::parameter(3.0);
        let sum = a + b;
        assert!(sum.is_parameter());
        assert_eq!(sum.value(), Some(5.0));
    }

    #[test]
    fn variable_plus_zero_elides_node() {
        let h: CodeHandler<f64> = CodeHandler::new();
        let x = h.new_independent();
        let cg_x = CG::from_node_with_value(&h, x, 3.0);
        let sum = cg_x + CG::parameter(0.0);
        assert_eq!(sum.node_id(), Some(x));
        assert_eq!(h.node_count(), 1);
    }

    #[test]
    fn variable_times_zero_folds_to_parameter() {
        let h: CodeHandler<f64> = CodeHandler::new();
        let x = h.new_independent();
        let cg_x = CG::from_node_with_value(&h, x, 3.0);
        let prod = cg_x * CG::parameter(0.0);
        assert!(prod.is_parameter());
        assert_eq!(prod.value(), Some(0.0));
    }

    #[test]
    fn identity_elision_disabled_still_materializes_node() {
        let h: CodeHandler<f64> = CodeHandler::with_config(HandlerConfig {
            constant_folding: false,
            ..HandlerConfig::default()
        });
        let x = h.new_independent();
        let cg_x = CG::from_node_with_value(&h, x, 3.0);
        let sum = cg_x + CG::parameter(0.0);
        assert_ne!(sum.node_id(), Some(x));
        assert_eq!(h.node_count(), 2);
    }

    #[test]
    fn binary_op_creates_node_and_threads_value() {
        let h: CodeHandler<f64> = CodeHandler::new();
        let x = h.new_independent();
        let cg_x = CG::from_node_with_value(&h, x, 3.0);
        let product = cg_x * CG::parameter(2.0);
        assert_eq!(product.value(), Some(6.0));
        assert_eq!(h.node_count(), 2);
        assert_eq!(h.node(product.node_id().unwrap()).op(), OpCode::Mul);
    }

    #[test]
    fn unary_op_threads_value_and_allocates() {
        let h: CodeHandler<f64> = CodeHandler::new();
        let x = h.new_independent();
        let cg_x = CG::from_node_with_value(&h, x, 4.0);
        let root = cg_x.sqrt();
        assert_eq!(root.value(), Some(2.0));
        assert_eq!(h.node(root.node_id().unwrap()).op(), OpCode::Sqrt);
    }

    #[test]
    fn cond_builds_com_node_and_selects_value() {
        let h: CodeHandler<f64> = CodeHandler::new();
        let x = h.new_independent();
        let cg_x = CG::from_node_with_value(&h, x, 1.0);
        let selected = CG::cond(
            CompareOp::Lt,
            cg_x,
            CG::parameter(2.0),
            CG::parameter(10.0),
            CG::parameter(20.0),
        );
        assert_eq!(selected.value(), Some(10.0));
        assert_eq!(h.node(selected.node_id().unwrap()).op(), OpCode::ComLt);
    }

    #[test]
    fn cond_folds_when_all_parameters() {
        let selected = CG::<f64>::cond(
            CompareOp::Ge,
            CG::parameter(5.0),
            CG::parameter(2.0),
            CG::parameter(1.0),
            CG::parameter(0.0),
        );
        assert!(selected.is_parameter());
        assert_eq!(selected.value(), Some(1.0));
    }
}
