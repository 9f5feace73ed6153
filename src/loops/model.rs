//! Data shared between the loop sparsity analyzer and the loop Jacobian
//! synthesizer.
//!
//! Grounded on the `IndexedLoop`/`LoopModel` bookkeeping built up across
//! `cg_c_lang_compile_model_helper_loops_jac.hpp`: one [`LoopModel`]
//! describes a single reusable equation pattern that was recorded once and
//! is evaluated `iteration_count` times, and a [`NoLoopModel`] describes the
//! temporaries evaluated outside any loop that a loop's own equations may
//! still depend on.

use std::collections::{BTreeMap, BTreeSet};

/// One `(original, tape, iteration)` correspondence: tape equation or
/// independent `tape` at `iteration` stands in for original index
/// `original`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct LoopPosition {
    /// Index into the model's full (non-loop) dependent or independent
    /// vector.
    pub original: usize,
    /// Index into the loop's recorded tape.
    pub tape: usize,
    /// Which iteration of the loop this correspondence belongs to.
    pub iteration: usize,
}

/// How a loop's recorded tape independents relate to the original
/// independent vector.
#[derive(Clone, Debug, Default)]
pub struct IndependentClassification {
    /// `tapeJ -> per-iteration original index`, `None` where that
    /// iteration does not populate it (see
    /// [`IndexPattern`](crate::index_pattern::IndexPattern)'s partial
    /// samples).
    pub indexed: BTreeMap<usize, Vec<Option<usize>>>,
    /// `tapeJ -> original index` for tape independents every iteration
    /// binds to the same original column (loop-invariant operands).
    pub non_indexed: BTreeMap<usize, usize>,
    /// `tapeJ -> no-loop temporary index` for tape independents that are
    /// actually values computed outside the loop and threaded in.
    pub temporary: BTreeMap<usize, usize>,
}

/// One reusable equation pattern, recorded once on a tape of `iteration_count`
/// and played back that many times against different slices of the original
/// independent/dependent vectors.
#[derive(Clone, Debug)]
pub struct LoopModel {
    /// How many times this loop's tape is evaluated.
    pub iteration_count: usize,
    /// `tapeI -> per-iteration positions` relating the loop's recorded
    /// dependents back to the original dependent vector.
    pub tape_to_original: BTreeMap<usize, Vec<LoopPosition>>,
    /// How this loop's tape independents relate to the original
    /// independent vector.
    pub independents: IndependentClassification,
    /// `tapeI -> tapeJ` nonzero pattern of the loop's own (un-replicated)
    /// Jacobian, shared by every iteration.
    pub jacobian_sparsity: BTreeMap<usize, BTreeSet<usize>>,
}

impl LoopModel {
    /// Which original dependent index tape equation `tape_i` stands in for
    /// at `iteration`, if any.
    pub fn original_dependent_index(&self, tape_i: usize, iteration: usize) -> Option<usize> {
        self.tape_to_original
            .get(&tape_i)?
            .iter()
            .find(|p| p.iteration == iteration)
            .map(|p| p.original)
    }

    /// Every tape independent that is indexed and binds to `original_j` at
    /// `iteration`.
    pub fn indexed_tape_indexes(&self, iteration: usize, original_j: usize) -> Vec<usize> {
        self.independents
            .indexed
            .iter()
            .filter(|(_, per_iteration)| {
                per_iteration.get(iteration).copied().flatten() == Some(original_j)
            })
            .map(|(&tape_j, _)| tape_j)
            .collect()
    }

    /// The tape independent that is loop-invariant and bound to
    /// `original_j`, if any.
    pub fn non_indexed_tape_index(&self, original_j: usize) -> Option<usize> {
        self.independents
            .non_indexed
            .iter()
            .find(|(_, &oj)| oj == original_j)
            .map(|(&tj, _)| tj)
    }
}

/// The part of the model evaluated once, outside of any loop.
///
/// Only the piece the loop-sparsity analyzer needs is kept here: which
/// original columns a temporary's defining expression actually depends on,
/// used to decide whether a loop's Jacobian contribution that is mediated
/// through a temporary should be attributed to a given original column.
#[derive(Clone, Debug, Default)]
pub struct NoLoopModel {
    /// `temporary index -> original columns its defining expression reads`.
    pub temp_dependencies: BTreeMap<usize, BTreeSet<usize>>,
    /// `no-loop tape row -> temporary index it defines`, for rows of the
    /// no-loop tape that compute a temporary consumed by a loop rather
    /// than a final dependent output.
    pub temp_rows: BTreeMap<usize, usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_loop() -> LoopModel {
        let mut tape_to_original = BTreeMap::new();
        tape_to_original.insert(
            0,
            vec![
                LoopPosition { original: 0, tape: 0, iteration: 0 },
                LoopPosition { original: 1, tape: 0, iteration: 1 },
                LoopPosition { original: 2, tape: 0, iteration: 2 },
            ],
        );

        let mut indexed = BTreeMap::new();
        indexed.insert(0, vec![Some(0), Some(1), Some(2)]);
        let mut non_indexed = BTreeMap::new();
        non_indexed.insert(1, 7usize);

        let mut jacobian_sparsity = BTreeMap::new();
        jacobian_sparsity.insert(0, BTreeSet::from([0, 1]));

        LoopModel {
            iteration_count: 3,
            tape_to_original,
            independents: IndependentClassification {
                indexed,
                non_indexed,
                temporary: BTreeMap::new(),
            },
            jacobian_sparsity,
        }
    }

    #[test]
    fn original_dependent_index_follows_iteration() {
        let model = sample_loop();
        assert_eq!(model.original_dependent_index(0, 1), Some(1));
        assert_eq!(model.original_dependent_index(0, 5), None);
    }

    #[test]
    fn indexed_lookup_matches_per_iteration_original() {
        let model = sample_loop();
        assert_eq!(model.indexed_tape_indexes(1, 1), vec![0]);
        assert_eq!(model.indexed_tape_indexes(1, 9), Vec::<usize>::new());
    }

    #[test]
    fn non_indexed_lookup_is_iteration_invariant() {
        let model = sample_loop();
        assert_eq!(model.non_indexed_tape_index(7), Some(1));
        assert_eq!(model.non_indexed_tape_index(8), None);
    }
}
