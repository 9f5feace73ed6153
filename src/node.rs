//! Node and argument types owned by a [`CodeHandler`](crate::handler::CodeHandler).

use smallvec::SmallVec;

use crate::entity::NodeId;
use crate::op::OpCode;

/// Inline capacity for a node's argument list. Covers every fixed-arity op
/// code (the `Com*` family tops out at 4) without spilling to the heap;
/// `ArrayCreation` and the loop-construct variable-arity codes still spill
/// when they need more.
const ARG_INLINE: usize = 4;

/// Inline capacity for a node's `info` vector (`AtomicForward` needs 3).
const INFO_INLINE: usize = 3;

/// Either a constant parameter or a non-owning reference to another node
/// in the same handler's arena.
///
/// Modeled as a sum type rather than a nullable reference (per the design
/// notes): a node argument is always exactly one of the two, never both,
/// never neither.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(
    feature = "enable-serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(bound(serialize = "B: serde::Serialize", deserialize = "B: serde::Deserialize<'de>"))
)]
pub enum Argument<B> {
    /// An inlined constant value.
    Parameter(B),
    /// A reference to another node owned by the same handler.
    Node(NodeId),
}

impl<B> Argument<B> {
    /// The referenced node, if this argument is a `Node`.
    pub fn node(&self) -> Option<NodeId> {
        match self {
            Argument::Node(id) => Some(*id),
            Argument::Parameter(_) => None,
        }
    }

    /// The parameter value, if this argument is a `Parameter`.
    pub fn parameter(&self) -> Option<&B> {
        match self {
            Argument::Parameter(v) => Some(v),
            Argument::Node(_) => None,
        }
    }
}

/// An operation node in the graph.
///
/// Immutable after construction: it carries only its op code, arguments
/// and info, with no scratch fields of its own. Per-traversal state
/// (colors, emitted ids, ...) lives out-of-band in a caller-owned
/// [`SecondaryMap`](crate::entity::SecondaryMap) keyed on `NodeId`
/// instead, so two traversals can run over the same graph without
/// stepping on each other's scratch state.
#[derive(Clone, Debug)]
#[cfg_attr(
    feature = "enable-serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(bound(serialize = "B: serde::Serialize", deserialize = "B: serde::Deserialize<'de>"))
)]
pub struct OperationNode<B> {
    op: OpCode,
    args: SmallVec<[Argument<B>; ARG_INLINE]>,
    info: SmallVec<[usize; INFO_INLINE]>,
}

impl<B> OperationNode<B> {
    /// Construct a node, asserting the argument count matches the op
    /// code's fixed arity when it has one.
    ///
    /// Arity mismatches are a contract violation between this crate's own
    /// constructors (the `CG` overloads and loop synthesizer), never user
    /// input, so this is a `debug_assert!` rather than a `CgError`
    /// (matching `CPPADCG_ASSERT_KNOWN`'s role as an internal consistency
    /// check, not a recoverable failure).
    pub fn new(op: OpCode, args: SmallVec<[Argument<B>; ARG_INLINE]>, info: SmallVec<[usize; INFO_INLINE]>) -> Self {
        if let Some(arity) = op.fixed_arity() {
            debug_assert_eq!(
                args.len(),
                arity,
                "op {:?} requires {} argument(s), got {}",
                op,
                arity,
                args.len()
            );
        }
        OperationNode { op, args, info }
    }

    /// The op code tagging this node.
    pub fn op(&self) -> OpCode {
        self.op
    }

    /// This node's arguments, in order.
    pub fn args(&self) -> &[Argument<B>] {
        &self.args
    }

    /// This node's op-specific integer metadata.
    pub fn info(&self) -> &[usize] {
        &self.info
    }
}

/// One step of a path walked from an expression's root down to a target
/// node: "we entered `node` via its `arg_index`-th argument".
///
/// A path is a nonempty sequence whose first element's `node` is the
/// expression root and whose last element's `node` is the target; the
/// `arg_index` of position `k` tells how position `k - 1` reached position
/// `k` (the first element's own `arg_index` is unused and set to `0`).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "enable-serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OperationPathNode {
    /// The node visited at this step.
    pub node: NodeId,
    /// Which argument of the *previous* step's node led here.
    pub arg_index: usize,
}
