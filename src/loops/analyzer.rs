//! Classifies each nonzero of a target sparse Jacobian into loop or
//! no-loop, and, within a loop, indexed / non-indexed / temporary-mediated
//! contributions.
//!
//! Grounded on `analyseSparseJacobianWithLoops` in
//! `cg_c_lang_compile_model_helper_loops_jac.hpp`: a row belonging to a
//! loop's replicated equation is resolved to that loop's own tape-level
//! Jacobian sparsity, and a column within that row is attributed to one of
//! three sources — an indexed independent whose per-iteration original
//! binding equals the column, a loop-invariant (non-indexed) independent
//! bound to the column, or a temporary computed outside the loop whose own
//! no-loop-model dependencies include the column. A column can legitimately
//! receive both a non-indexed-direct and a temporary-mediated contribution
//! (the tie-break rule: the direct contribution owns the compressed
//! position, the temporary-mediated one only adds an accumulated term); two
//! *indexed* or two *non-indexed* writes to the same iteration's slot are a
//! [`CgError::RepeatedJacobianElement`].

use std::collections::{BTreeMap, BTreeSet};

use crate::error::{CgError, CgResult};
use crate::loops::model::{LoopModel, NoLoopModel};

/// Per-(loop, tape equation) bookkeeping of where each of that equation's
/// nonzero columns lands in the compressed output.
#[derive(Clone, Debug, Default)]
pub struct JacobianRowInfo {
    /// `tapeJ -> per-iteration compressed position`, `nnz` (the analyzer's
    /// sentinel, passed in by the caller) where that iteration has no
    /// request for this column.
    pub indexed_positions: BTreeMap<usize, Vec<usize>>,
    /// `originalJ -> per-iteration compressed position` for loop-invariant
    /// columns, same sentinel convention.
    pub non_indexed_positions: BTreeMap<usize, Vec<usize>>,
    /// Original columns with at least one non-indexed-direct contribution.
    pub non_indexed_evals: BTreeSet<usize>,
    /// `originalJ -> no-loop temporary indices` whose value contributes a
    /// term to this equation's derivative with respect to `originalJ`.
    pub tmp_evals: BTreeMap<usize, BTreeSet<usize>>,
}

/// Everything the loop Jacobian synthesizer needs to know about how a
/// target Jacobian's nonzeros split across loop and no-loop contributions.
#[derive(Clone, Debug, Default)]
pub struct AnalysisResult {
    /// `tapeEq -> originalJ` columns the no-loop sub-model must evaluate
    /// (`tapeEq` here is just the no-loop model's own equation index).
    pub no_loop_eval_sparsity: BTreeMap<usize, BTreeSet<usize>>,
    /// `tapeEq -> originalJ -> positions` the no-loop model's values land
    /// at. A set rather than a single slot: the same no-loop value can
    /// legitimately be copied into more than one compressed output
    /// position.
    pub no_loop_eval_locations: BTreeMap<usize, BTreeMap<usize, BTreeSet<usize>>>,
    /// Per loop (indexed the same as the input `loops` slice), `tapeI ->
    /// tapeJ` columns that loop's own recorded Jacobian must be evaluated
    /// at.
    pub loop_eval_sparsities: Vec<BTreeMap<usize, BTreeSet<usize>>>,
    /// Per loop, `tapeI -> JacobianRowInfo`.
    pub loop_eq_info: Vec<BTreeMap<usize, JacobianRowInfo>>,
}

/// Classify every `(row, col, position)` triple of a target Jacobian's
/// sparsity pattern. `nnz` is both the total nonzero count and the
/// sentinel value written into an unpopulated per-iteration slot.
pub fn analyse_sparse_jacobian_with_loops(
    rows: &[usize],
    cols: &[usize],
    positions: &[usize],
    loops: &[LoopModel],
    no_loop: Option<&NoLoopModel>,
    nnz: usize,
) -> CgResult<AnalysisResult> {
    let mut result = AnalysisResult {
        no_loop_eval_sparsity: BTreeMap::new(),
        no_loop_eval_locations: BTreeMap::new(),
        loop_eval_sparsities: vec![BTreeMap::new(); loops.len()],
        loop_eq_info: vec![BTreeMap::new(); loops.len()],
    };

    for ((&i, &j), &e) in rows.iter().zip(cols.iter()).zip(positions.iter()) {
        match find_owner(loops, i) {
            Some((li, tape_i, iteration)) => {
                classify_loop_element(&mut result, loops, li, tape_i, iteration, i, j, e, no_loop, nnz)?;
            }
            None => {
                result.no_loop_eval_sparsity.entry(i).or_default().insert(j);
                result
                    .no_loop_eval_locations
                    .entry(i)
                    .or_default()
                    .entry(j)
                    .or_default()
                    .insert(e);
            }
        }
    }

    Ok(result)
}

/// Which `(loop index, tapeI, iteration)` originally-indexed row `original_i`
/// belongs to, if any. A row belongs to at most one loop: each iteration of
/// a loop stands in for exactly one original row.
fn find_owner(loops: &[LoopModel], original_i: usize) -> Option<(usize, usize, usize)> {
    for (li, loop_model) in loops.iter().enumerate() {
        for (&tape_i, positions) in &loop_model.tape_to_original {
            if let Some(pos) = positions.iter().find(|p| p.original == original_i) {
                return Some((li, tape_i, pos.iteration));
            }
        }
    }
    None
}

#[allow(clippy::too_many_arguments)]
fn classify_loop_element(
    result: &mut AnalysisResult,
    loops: &[LoopModel],
    li: usize,
    tape_i: usize,
    iteration: usize,
    i: usize,
    j: usize,
    e: usize,
    no_loop: Option<&NoLoopModel>,
    nnz: usize,
) -> CgResult<()> {
    let loop_model = &loops[li];
    let n = loop_model.iteration_count;
    let row_sparsity = loop_model.jacobian_sparsity.get(&tape_i);
    let row_sparsity: &BTreeSet<usize> = match row_sparsity {
        Some(s) => s,
        None => return Ok(()),
    };

    // (a) indexed: an indexed tape independent whose per-iteration
    // original binding is exactly `j`.
    for tape_j in loop_model.indexed_tape_indexes(iteration, j) {
        if !row_sparsity.contains(&tape_j) {
            continue;
        }
        let info = result.loop_eq_info[li].entry(tape_i).or_default();
        let slots = info.indexed_positions.entry(tape_j).or_insert_with(|| vec![nnz; n]);
        if slots[iteration] != nnz {
            return Err(CgError::RepeatedJacobianElement { row: i, col: j });
        }
        slots[iteration] = e;
        result.loop_eval_sparsities[li].entry(tape_i).or_default().insert(tape_j);
    }

    // (b) non-indexed direct: a loop-invariant tape independent bound to
    // `j` in every iteration.
    if let Some(tape_j) = loop_model.non_indexed_tape_index(j) {
        if row_sparsity.contains(&tape_j) {
            let info = result.loop_eq_info[li].entry(tape_i).or_default();
            let slots = info.non_indexed_positions.entry(j).or_insert_with(|| vec![nnz; n]);
            if slots[iteration] != nnz {
                return Err(CgError::RepeatedJacobianElement { row: i, col: j });
            }
            slots[iteration] = e;
            info.non_indexed_evals.insert(j);
            result.loop_eval_sparsities[li].entry(tape_i).or_default().insert(tape_j);
        }
    }

    // (c) temporary-mediated: a no-loop temporary threaded into the loop
    // whose own defining expression reads `j`. Adds a contribution to the
    // same column without claiming a compressed-position slot of its own.
    if let Some(no_loop) = no_loop {
        for (&tape_k, &temp_k) in &loop_model.independents.temporary {
            if !row_sparsity.contains(&tape_k) {
                continue;
            }
            let depends = no_loop
                .temp_dependencies
                .get(&temp_k)
                .map_or(false, |deps| deps.contains(&j));
            if depends {
                let info = result.loop_eq_info[li].entry(tape_i).or_default();
                info.tmp_evals.entry(j).or_default().insert(temp_k);
                result.loop_eval_sparsities[li].entry(tape_i).or_default().insert(tape_k);
            }
        }
    }

    Ok(())
}
