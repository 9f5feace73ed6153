//! Single-path expression inversion.
//!
//! Grounded directly on `solver.hpp`'s `CodeHandler<Base>::solveFor` and
//! free `isSolvable` function: given the root of a recorded expression and
//! a target node reachable through exactly one path, walk that path from
//! the root down to the target, applying the algebraic inverse of each
//! operation encountered along the way to an accumulator that starts at
//! zero. The result is the value the target must hold for the root
//! expression to evaluate to zero (used to turn an implicit residual
//! equation into an explicit formula for one of its variables). A target
//! reachable through more than one path is rejected rather than guessed at
//! (see `SPEC_FULL.md`'s open-question decisions).

use crate::cg::CG;
use crate::entity::NodeId;
use crate::error::{CgError, CgResult};
use crate::handler::CodeHandler;
use crate::node::{Argument, OperationPathNode};
use crate::num::Numeric;
use crate::op::OpCode;

fn arg_to_cg<'h, B: Numeric>(handler: &'h CodeHandler<B>, arg: &Argument<B>) -> CG<'h, B> {
    match arg {
        Argument::Parameter(v) => CG::parameter(*v),
        Argument::Node(id) => CG::from_node(handler, *id),
    }
}

/// The argument of a binary node that is *not* the one the path continues
/// through.
fn other_arg<B>(args: &[Argument<B>], arg_index: usize) -> &Argument<B> {
    &args[if arg_index == 0 { 1 } else { 0 }]
}

/// Find the unique path from `root` to `target` and solve along it.
/// Short-circuits when `root == target` (the target *is* the expression).
pub fn solve_for<'h, B: Numeric>(
    handler: &'h CodeHandler<B>,
    root: NodeId,
    target: NodeId,
) -> CgResult<CG<'h, B>> {
    if root == target {
        return Ok(CG::from_node(handler, target));
    }

    let paths = handler.find_paths(root, target, 2);
    if paths.is_empty() {
        return Err(CgError::NotPresent);
    }
    if paths.len() > 1 {
        return Err(CgError::Ambiguous);
    }

    solve_for_path(handler, &paths[0])
}

/// Solve along an already-found path (the lower-level entry point,
/// mirroring `solveFor(const vector<OperationPathNode<Base>>&)`).
pub fn solve_for_path<'h, B: Numeric>(
    handler: &'h CodeHandler<B>,
    path: &[OperationPathNode],
) -> CgResult<CG<'h, B>> {
    let mut right_hs = CG::parameter(B::zero());

    for n in 0..path.len().saturating_sub(1) {
        let node_id = path[n].node;
        let arg_index = path[n + 1].arg_index;
        let (op, args) = {
            let node = handler.node(node_id);
            (node.op(), node.args().to_vec())
        };

        match op {
            OpCode::Mul => {
                let other = arg_to_cg(handler, other_arg(&args, arg_index));
                right_hs = right_hs / other;
            }
            OpCode::Div => {
                if arg_index == 0 {
                    let other = arg_to_cg(handler, &args[1]);
                    right_hs = right_hs * other;
                } else {
                    let other = arg_to_cg(handler, &args[0]);
                    right_hs = other / right_hs;
                }
            }
            OpCode::UnMinus => {
                right_hs = right_hs * CG::parameter(-B::one());
            }
            OpCode::Add => {
                let other = arg_to_cg(handler, other_arg(&args, arg_index));
                right_hs = right_hs - other;
            }
            OpCode::Alias => {
                // do nothing
            }
            OpCode::Sub => {
                if arg_index == 0 {
                    let other = arg_to_cg(handler, &args[1]);
                    right_hs = right_hs + other;
                } else {
                    let other = arg_to_cg(handler, &args[0]);
                    right_hs = other - right_hs;
                }
            }
            OpCode::Exp => {
                right_hs = right_hs.ln();
            }
            OpCode::Log => {
                right_hs = right_hs.exp();
            }
            OpCode::Pow => {
                if arg_index == 0 {
                    let exponent = args[1].parameter().copied();
                    match exponent {
                        Some(v) if v.is_zero() => return Err(CgError::InvalidZeroExponent),
                        Some(v) if v.is_one() => {
                            // do nothing: x^1 inverts to the identity
                        }
                        _ => return Err(CgError::NonInvertible { op }),
                    }
                } else {
                    let base = arg_to_cg(handler, &args[0]);
                    right_hs = right_hs.ln() / base.ln();
                }
            }
            OpCode::Sqrt => {
                right_hs = right_hs * right_hs;
            }
            OpCode::Cosh => {
                // NOTE: this computes acosh (`log(x + sqrt(x*x - 1))`), not
                // asinh as the upstream comment claims; implemented as
                // coded rather than silently "corrected" (see
                // `SPEC_FULL.md`'s open-question decision on this).
                let one = CG::parameter(B::one());
                right_hs = (right_hs + (right_hs * right_hs - one).sqrt()).ln();
            }
            OpCode::Sinh => {
                let one = CG::parameter(B::one());
                right_hs = (right_hs + (right_hs * right_hs + one).sqrt()).ln();
            }
            OpCode::Tanh => {
                let one = CG::parameter(B::one());
                let two = B::one() + B::one();
                let half = CG::parameter(B::one() / two);
                right_hs = half * ((one + right_hs).ln() - (one - right_hs).ln());
            }
            _ => return Err(CgError::NonInvertible { op }),
        }
    }

    Ok(right_hs)
}

/// Is `target` reachable from `root` through exactly one path, and is every
/// operation along that path invertible? Shares the path-finding and
/// walking logic with [`solve_for`] so the two never disagree about what
/// counts as solvable.
pub fn is_solvable<B: Numeric>(handler: &CodeHandler<B>, root: NodeId, target: NodeId) -> CgResult<bool> {
    if root == target {
        return Ok(true);
    }
    let paths = handler.find_paths(root, target, 2);
    if paths.is_empty() {
        return Err(CgError::NotPresent);
    }
    if paths.len() > 1 {
        return Err(CgError::Ambiguous);
    }
    Ok(is_solvable_path(handler, &paths[0]))
}

/// Lower-level entry point mirroring the free `isSolvable` function:
/// checks an already-found path without raising on "not present" or
/// "ambiguous" (the caller is assumed to already have one unique path).
pub fn is_solvable_path<B: Numeric>(handler: &CodeHandler<B>, path: &[OperationPathNode]) -> bool {
    for n in 0..path.len().saturating_sub(1) {
        let node_id = path[n].node;
        let arg_index = path[n + 1].arg_index;
        let node = handler.node(node_id);
        let op = node.op();

        match op {
            OpCode::Mul
            | OpCode::Div
            | OpCode::UnMinus
            | OpCode::Add
            | OpCode::Alias
            | OpCode::Sub
            | OpCode::Exp
            | OpCode::Log
            | OpCode::Sqrt
            | OpCode::Cosh
            | OpCode::Sinh
            | OpCode::Tanh => {}
            OpCode::Pow => {
                if arg_index == 0 {
                    let exponent = node.args()[1].parameter().copied();
                    match exponent {
                        Some(v) if v.is_zero() => return false,
                        Some(v) if v.is_one() => {}
                        _ => return false,
                    }
                }
            }
            _ => return false,
        }
    }
    true
}
