//! Rebuilds a sparse Jacobian's values from loop and no-loop contributions.
//!
//! Grounded on the `prepareSparseJacobianWithLoops` construction in
//! `cg_c_lang_compile_model_helper_loops_jac.hpp`: run the no-loop tape
//! once to get temporaries and their derivatives, then for each loop build
//! one shared `IndexDeclare`/`LoopStart`/`IndexOp` trio, an indexed
//! independent vector `xl`, run the host AD library's sparse Jacobian on
//! the loop's own tape, and fold each tape column's per-iteration
//! contributions into a single expression (conditionally gated per §4.6
//! when it is only populated at some iterations). Every compressed output
//! position is finally a `DependentRefRhs` alias into that loop's
//! `LoopEnd` node.
//!
//! The host AD library itself — running a previously recorded tape
//! forward, or computing its sparse Jacobian — is out of scope (see
//! `SPEC_FULL.md` §1); [`LoopTape`] is the contract a caller implements,
//! the same role [`crate::evaluator::AtomicFunction`] plays for atomic
//! calls.

use std::collections::{BTreeMap, BTreeSet};

use smallvec::{smallvec, SmallVec};

use crate::cg::CG;
use crate::entity::{EntityRef, NodeId};
use crate::error::{CgError, CgResult};
use crate::handler::CodeHandler;
use crate::index_pattern::IndexPattern;
use crate::loops::analyzer::{AnalysisResult, JacobianRowInfo};
use crate::loops::model::{LoopModel, NoLoopModel};
use crate::node::Argument;
use crate::num::Numeric;
use crate::op::{CompareOp, OpCode};

/// Selects how the host AD library computes a sub-Jacobian. Threaded
/// through untouched; this core never branches on it itself.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum JacobianMode {
    /// Drive the sweep independent-by-independent.
    Forward,
    /// Drive the sweep dependent-by-dependent.
    Reverse,
}

/// The host AD library's contract: run a previously recorded tape forward,
/// or compute its sparse Jacobian against a given sparsity pattern.
pub trait LoopTape<'h, B: Numeric> {
    /// Zero-order forward: evaluate every dependent (here, every
    /// temporary) of this tape at `x`.
    fn forward0(&self, x: &[CG<'h, B>]) -> Vec<CG<'h, B>>;

    /// Sparse Jacobian of this tape's dependents with respect to `x`,
    /// restricted to `sparsity` (`tapeI -> tapeJ` columns to evaluate).
    fn sparse_jacobian(
        &self,
        x: &[CG<'h, B>],
        sparsity: &BTreeMap<usize, BTreeSet<usize>>,
        mode: JacobianMode,
    ) -> BTreeMap<(usize, usize), CG<'h, B>>;
}

/// Rebuild a length-`nnz` sequence of `CG` values realizing a target sparse
/// Jacobian from its loop and no-loop contributions (the output of
/// [`analyse_sparse_jacobian_with_loops`](crate::loops::analyzer::analyse_sparse_jacobian_with_loops)).
pub fn prepare_sparse_jacobian_with_loops<'h, B: Numeric>(
    handler: &'h CodeHandler<B>,
    x: &[CG<'h, B>],
    loops: &[LoopModel],
    loop_tapes: &[&dyn LoopTape<'h, B>],
    no_loop: Option<&NoLoopModel>,
    no_loop_tape: Option<&dyn LoopTape<'h, B>>,
    analysis: &AnalysisResult,
    nnz: usize,
    mode: JacobianMode,
) -> CgResult<Vec<CG<'h, B>>> {
    if loop_tapes.len() != loops.len() {
        return Err(CgError::ArityMismatch {
            expected: loops.len(),
            got: loop_tapes.len(),
        });
    }

    let mut output: Vec<Option<CG<'h, B>>> = vec![None; nnz];
    let mut tmps: Vec<CG<'h, B>> = Vec::new();
    let mut dz_dx_temp: BTreeMap<(usize, usize), CG<'h, B>> = BTreeMap::new();

    if let (Some(no_loop), Some(tape)) = (no_loop, no_loop_tape) {
        log::debug!("running no-loop pass ({} columns)", analysis.no_loop_eval_sparsity.len());
        let (t, d) = run_no_loop_pass(tape, x, no_loop, analysis, mode, &mut output)?;
        tmps = t;
        dz_dx_temp = d;
    }

    for (li, loop_model) in loops.iter().enumerate() {
        log::debug!("running loop pass {} ({} iterations)", li, loop_model.iteration_count);
        run_loop_pass(
            handler,
            loop_model,
            loop_tapes[li],
            x,
            &tmps,
            &dz_dx_temp,
            &analysis.loop_eq_info[li],
            &analysis.loop_eval_sparsities[li],
            nnz,
            mode,
            &mut output,
        )?;
    }

    output
        .into_iter()
        .enumerate()
        .map(|(_, v)| v.ok_or(CgError::NotPresent))
        .collect()
}

fn run_no_loop_pass<'h, B: Numeric>(
    tape: &dyn LoopTape<'h, B>,
    x: &[CG<'h, B>],
    no_loop: &NoLoopModel,
    analysis: &AnalysisResult,
    mode: JacobianMode,
    output: &mut [Option<CG<'h, B>>],
) -> CgResult<(Vec<CG<'h, B>>, BTreeMap<(usize, usize), CG<'h, B>>)> {
    let tmps = tape.forward0(x);
    let jac = tape.sparse_jacobian(x, &analysis.no_loop_eval_sparsity, mode);

    let mut dz_dx_temp = BTreeMap::new();
    for (&tape_eq, cols) in &analysis.no_loop_eval_sparsity {
        for &j in cols {
            let deriv = jac.get(&(tape_eq, j)).cloned().ok_or(CgError::NotPresent)?;
            if let Some(&temp_k) = no_loop.temp_rows.get(&tape_eq) {
                dz_dx_temp.insert((temp_k, j), deriv);
            } else if let Some(positions) = analysis
                .no_loop_eval_locations
                .get(&tape_eq)
                .and_then(|m| m.get(&j))
            {
                for &pos in positions {
                    output[pos] = Some(deriv.clone());
                }
            }
        }
    }
    Ok((tmps, dz_dx_temp))
}

#[allow(clippy::too_many_arguments)]
fn run_loop_pass<'h, B: Numeric>(
    handler: &'h CodeHandler<B>,
    loop_model: &LoopModel,
    tape: &dyn LoopTape<'h, B>,
    x: &[CG<'h, B>],
    tmps: &[CG<'h, B>],
    dz_dx_temp: &BTreeMap<(usize, usize), CG<'h, B>>,
    info_by_tape_i: &BTreeMap<usize, JacobianRowInfo>,
    eval_sparsity: &BTreeMap<usize, BTreeSet<usize>>,
    nnz: usize,
    mode: JacobianMode,
    output: &mut [Option<CG<'h, B>>],
) -> CgResult<()> {
    let index_declare = handler.add_node(OpCode::IndexDeclare, SmallVec::new(), SmallVec::new());
    let loop_start = handler.add_node(
        OpCode::LoopStart,
        smallvec![Argument::Node(index_declare)],
        smallvec![loop_model.iteration_count],
    );
    let index_op_node = handler.add_node(OpCode::IndexOp, smallvec![Argument::Node(loop_start)], SmallVec::new());
    let index_op_cg = CG::from_node(handler, index_op_node);

    let xl = build_xl(handler, loop_model, x, tmps, index_op_node)?;
    let jac = tape.sparse_jacobian(&xl, eval_sparsity, mode);

    let mut loop_end_args: SmallVec<[Argument<B>; 4]> = SmallVec::new();
    let mut loop_end_nodes: Vec<NodeId> = Vec::new();
    let mut positions_assigned: BTreeSet<usize> = BTreeSet::new();

    for (&tape_i, info) in info_by_tape_i {
        for (&tape_j, positions) in &info.indexed_positions {
            let deriv = jac.get(&(tape_i, tape_j)).cloned().ok_or(CgError::NotPresent)?;
            let value = wrap_conditional(&index_op_cg, positions, nnz, deriv);
            if let Some(id) = value.node_id() {
                loop_end_nodes.push(id);
            }
            loop_end_args.push(value.as_argument());
            for &pos in positions.iter().filter(|&&p| p != nnz) {
                positions_assigned.insert(pos);
            }
        }

        for (&orig_j, positions) in &info.non_indexed_positions {
            let mut value: CG<'h, B> = if info.non_indexed_evals.contains(&orig_j) {
                let tape_j = loop_model
                    .non_indexed_tape_index(orig_j)
                    .ok_or(CgError::NotPresent)?;
                jac.get(&(tape_i, tape_j)).cloned().ok_or(CgError::NotPresent)?
            } else {
                CG::parameter(B::zero())
            };
            if let Some(temp_cols) = info.tmp_evals.get(&orig_j) {
                for &temp_k in temp_cols {
                    let tape_k = loop_model
                        .independents
                        .temporary
                        .iter()
                        .find(|&(_, &t)| t == temp_k)
                        .map(|(&tk, _)| tk)
                        .ok_or(CgError::NotPresent)?;
                    let d_tape = jac.get(&(tape_i, tape_k)).cloned().ok_or(CgError::NotPresent)?;
                    let d_temp = dz_dx_temp.get(&(temp_k, orig_j)).cloned().ok_or(CgError::NotPresent)?;
                    value = value + d_tape * d_temp;
                }
            }
            let value = wrap_conditional(&index_op_cg, positions, nnz, value);
            if let Some(id) = value.node_id() {
                loop_end_nodes.push(id);
            }
            loop_end_args.push(value.as_argument());
            for &pos in positions.iter().filter(|&&p| p != nnz) {
                positions_assigned.insert(pos);
            }
        }
    }

    let hoistable = move_non_indexed_outside_loop(handler, index_op_node, &loop_end_nodes);
    log::trace!(
        "loop body: {} column results, {} loop-invariant",
        loop_end_nodes.len(),
        hoistable.len()
    );

    let loop_end = handler.add_node(OpCode::LoopEnd, loop_end_args, smallvec![1]);
    for &pos in &positions_assigned {
        let alias = handler.add_node(
            OpCode::DependentRefRhs,
            smallvec![Argument::Node(loop_end)],
            smallvec![pos],
        );
        output[pos] = Some(CG::from_node(handler, alias));
    }

    Ok(())
}

/// Build the loop tape's indexed-independent vector: an indexed tape slot
/// becomes a node keyed on the shared iteration-value provider and an
/// [`IndexPattern`] recording which original column each iteration binds
/// to; a non-indexed slot is the caller's own `x` entry (unchanged every
/// iteration); a temporary slot is the no-loop pass's computed value for
/// it.
fn build_xl<'h, B: Numeric>(
    handler: &'h CodeHandler<B>,
    loop_model: &LoopModel,
    x: &[CG<'h, B>],
    tmps: &[CG<'h, B>],
    index_op_node: NodeId,
) -> CgResult<Vec<CG<'h, B>>> {
    let tape_len = loop_model
        .independents
        .indexed
        .keys()
        .chain(loop_model.independents.non_indexed.keys())
        .chain(loop_model.independents.temporary.keys())
        .max()
        .map(|m| m + 1)
        .unwrap_or(0);
    let mut xl = vec![CG::parameter(B::zero()); tape_len];

    for (&tape_j, per_iteration) in &loop_model.independents.indexed {
        let samples: BTreeMap<usize, i64> = per_iteration
            .iter()
            .enumerate()
            .filter_map(|(it, v)| v.map(|orig| (it, orig as i64)))
            .collect();
        let pattern = IndexPattern::detect(&samples);
        let pattern_id = handler.add_index_pattern(pattern);
        let node = handler.add_node(
            OpCode::Alias,
            smallvec![Argument::Node(index_op_node)],
            smallvec![pattern_id.index()],
        );
        xl[tape_j] = CG::from_node(handler, node);
    }
    for (&tape_j, &orig_j) in &loop_model.independents.non_indexed {
        xl[tape_j] = x.get(orig_j).cloned().ok_or(CgError::NotPresent)?;
    }
    for (&tape_j, &temp_k) in &loop_model.independents.temporary {
        xl[tape_j] = tmps.get(temp_k).cloned().ok_or(CgError::NotPresent)?;
    }
    Ok(xl)
}

/// §4.6: when `positions` (one slot per iteration, `nnz` sentinel for
/// "absent") is populated at every iteration, `value` already is the
/// shared per-iteration formula. Otherwise chain an `iter == k` guard per
/// populated iteration, each selecting `value`, falling through to a
/// running accumulator (initially zero) so un-populated iterations
/// contribute nothing.
fn wrap_conditional<'h, B: Numeric>(
    index_op: &CG<'h, B>,
    positions: &[usize],
    nnz: usize,
    value: CG<'h, B>,
) -> CG<'h, B> {
    let populated: Vec<usize> = positions
        .iter()
        .enumerate()
        .filter(|&(_, &p)| p != nnz)
        .map(|(it, _)| it)
        .collect();
    if populated.len() == positions.len() {
        return value;
    }
    let mut acc = CG::parameter(B::zero());
    for it in populated {
        acc = CG::cond(CompareOp::Eq, index_op.clone(), CG::parameter(of_usize::<B>(it)), value.clone(), acc);
    }
    acc
}

fn of_usize<B: Numeric>(n: usize) -> B {
    let mut v = B::zero();
    for _ in 0..n {
        v = v + B::one();
    }
    v
}

/// Which of a loop's column-result nodes do not depend on the loop's own
/// iteration-value node, and so would be safe for a downstream emitter to
/// hoist above `LoopStart` and evaluate once instead of `N` times. This
/// core has no instruction-scheduling or source-emission stage of its own
/// (see `SPEC_FULL.md`'s scope notes), so it reports the invariant subset
/// rather than physically relocating anything.
fn move_non_indexed_outside_loop<B: Numeric>(
    handler: &CodeHandler<B>,
    index_op_node: NodeId,
    column_nodes: &[NodeId],
) -> BTreeSet<NodeId> {
    column_nodes
        .iter()
        .copied()
        .filter(|&n| !depends_on(handler, n, index_op_node))
        .collect()
}

fn depends_on<B: Numeric>(handler: &CodeHandler<B>, node: NodeId, target: NodeId) -> bool {
    if node == target {
        return true;
    }
    let args: Vec<Argument<B>> = handler.node(node).args().to_vec();
    args.into_iter().any(|arg| match arg.node() {
        Some(child) => depends_on(handler, child, target),
        None => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loops::model::{IndependentClassification, LoopPosition};
    use std::cell::RefCell;

    struct RecordingTape<'h> {
        forward_calls: RefCell<usize>,
        jac_calls: RefCell<usize>,
        _marker: std::marker::PhantomData<&'h ()>,
    }

    impl<'h> RecordingTape<'h> {
        fn new() -> Self {
            RecordingTape {
                forward_calls: RefCell::new(0),
                jac_calls: RefCell::new(0),
                _marker: std::marker::PhantomData,
            }
        }
    }

    impl<'h> LoopTape<'h, f64> for RecordingTape<'h> {
        fn forward0(&self, _x: &[CG<'h, f64>]) -> Vec<CG<'h, f64>> {
            *self.forward_calls.borrow_mut() += 1;
            Vec::new()
        }

        fn sparse_jacobian(
            &self,
            x: &[CG<'h, f64>],
            sparsity: &BTreeMap<usize, BTreeSet<usize>>,
            _mode: JacobianMode,
        ) -> BTreeMap<(usize, usize), CG<'h, f64>> {
            *self.jac_calls.borrow_mut() += 1;
            let mut out = BTreeMap::new();
            for (&i, cols) in sparsity {
                for &j in cols {
                    out.insert((i, j), x[j].clone() * CG::parameter(2.0));
                }
            }
            out
        }
    }

    fn one_iteration_loop() -> LoopModel {
        let mut tape_to_original = BTreeMap::new();
        tape_to_original.insert(0, vec![LoopPosition { original: 0, tape: 0, iteration: 0 }]);
        let mut non_indexed = BTreeMap::new();
        non_indexed.insert(0, 0usize);
        let mut jacobian_sparsity = BTreeMap::new();
        jacobian_sparsity.insert(0, BTreeSet::from([0]));

        LoopModel {
            iteration_count: 1,
            tape_to_original,
            independents: IndependentClassification {
                indexed: BTreeMap::new(),
                non_indexed,
                temporary: BTreeMap::new(),
            },
            jacobian_sparsity,
        }
    }

    #[test]
    fn full_iteration_coverage_skips_conditional_wrap() {
        let h: CodeHandler<f64> = CodeHandler::new();
        let index_op = CG::from_node(&h, h.new_independent());
        let value = CG::from_node(&h, h.new_independent());
        let positions = vec![3usize];
        let wrapped = wrap_conditional(&index_op, &positions, 100, value.clone());
        assert_eq!(wrapped, value);
    }

    #[test]
    fn partial_coverage_builds_conditional_chain() {
        let h: CodeHandler<f64> = CodeHandler::new();
        let index_op = CG::from_node(&h, h.new_independent());
        let value = CG::from_node(&h, h.new_independent());
        let positions = vec![3usize, 100, 5]; // iteration 1 absent (sentinel 100)
        let wrapped = wrap_conditional(&index_op, &positions, 100, value);
        assert!(wrapped.is_variable());
        assert_eq!(h.node(wrapped.node_id().unwrap()).op(), OpCode::ComEq);
    }

    #[test]
    fn prepare_sparse_jacobian_fills_every_position() {
        let h: CodeHandler<f64> = CodeHandler::new();
        let x0 = CG::from_node(&h, h.new_independent());
        let loop_model = one_iteration_loop();

        let mut info = JacobianRowInfo::default();
        info.non_indexed_positions.insert(0, vec![0]);
        info.non_indexed_evals.insert(0);
        let mut info_by_tape_i = BTreeMap::new();
        info_by_tape_i.insert(0, info);

        let mut eval_sparsity = BTreeMap::new();
        eval_sparsity.insert(0, BTreeSet::from([0]));

        let analysis = AnalysisResult {
            no_loop_eval_sparsity: BTreeMap::new(),
            no_loop_eval_locations: BTreeMap::new(),
            loop_eval_sparsities: vec![eval_sparsity],
            loop_eq_info: vec![info_by_tape_i],
        };

        let tape = RecordingTape::new();
        let loop_tapes: Vec<&dyn LoopTape<f64>> = vec![&tape];
        let result = prepare_sparse_jacobian_with_loops(
            &h,
            &[x0],
            &[loop_model],
            &loop_tapes,
            None,
            None,
            &analysis,
            1,
            JacobianMode::Forward,
        )
        .unwrap();

        assert_eq!(result.len(), 1);
        assert_eq!(h.node(result[0].node_id().unwrap()).op(), OpCode::DependentRefRhs);
        assert_eq!(*tape.jac_calls.borrow(), 1);
    }
}
