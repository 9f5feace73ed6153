//! Closed-form descriptions of how an original index varies with an
//! iteration counter.
//!
//! [`IndexPattern::detect`] infers the narrowest variant that reproduces a
//! (possibly partial) map from iteration to value: a single linear
//! function first, then a small number of linear sections, and only then
//! falls back to an explicit lookup table. Narrower patterns let the
//! downstream emitter (out of scope here) generate a closed-form index
//! expression instead of a table lookup.

use std::collections::BTreeMap;

/// A closed-form (or explicit) description of `iteration -> value`.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "enable-serde", derive(serde::Serialize, serde::Deserialize))]
pub enum IndexPattern {
    /// `value = (slope * iteration + offset) / divisor`, using truncating
    /// integer division.
    Linear {
        /// Multiplier applied to the iteration counter.
        slope: i64,
        /// Additive constant.
        offset: i64,
        /// Divisor applied after the linear combination.
        divisor: i64,
    },
    /// A small number of contiguous iteration ranges, each following its
    /// own (possibly different) pattern.
    Sectioned {
        /// `(first_iteration_of_section, pattern_for_section)`, sorted by
        /// `first_iteration_of_section`.
        sections: Vec<(usize, Box<IndexPattern>)>,
    },
    /// An explicit `iteration -> value` table with no detected structure.
    /// Absent keys mean "not populated at that iteration".
    Random1D {
        /// The lookup table.
        values: BTreeMap<usize, i64>,
    },
    /// An explicit `iteration -> (x, z)` table for patterns over a pair of
    /// related indices (e.g. a flattened 2D array access).
    Random2D {
        /// The lookup table.
        values: BTreeMap<usize, (i64, i64)>,
    },
    /// The sum of two independent 1D patterns sharing one iteration
    /// domain, e.g. `row(iter) * row_stride + col(iter)`.
    Plane2D {
        /// Pattern for the first (e.g. row) index.
        x: Box<IndexPattern>,
        /// Pattern for the second (e.g. column) index.
        z: Box<IndexPattern>,
    },
}

impl IndexPattern {
    /// Evaluate this pattern at `iteration`, if it is populated there.
    pub fn evaluate(&self, iteration: usize) -> Option<i64> {
        match self {
            IndexPattern::Linear {
                slope,
                offset,
                divisor,
            } => {
                let numerator = slope * (iteration as i64) + offset;
                Some(numerator.div_euclid(*divisor))
            }
            IndexPattern::Sectioned { sections } => {
                let mut found: Option<&Box<IndexPattern>> = None;
                for (start, pattern) in sections {
                    if *start <= iteration {
                        found = Some(pattern);
                    } else {
                        break;
                    }
                }
                found.and_then(|p| p.evaluate(iteration))
            }
            IndexPattern::Random1D { values } => values.get(&iteration).copied(),
            IndexPattern::Random2D { values } => {
                values.get(&iteration).map(|(x, _)| *x)
            }
            IndexPattern::Plane2D { x, z } => match (x.evaluate(iteration), z.evaluate(iteration)) {
                (Some(a), Some(b)) => Some(a + b),
                _ => None,
            },
        }
    }

    /// Infer the narrowest pattern reproducing `samples`.
    ///
    /// `samples` need not cover every iteration: absent iterations are
    /// simply unpopulated in the returned pattern, and the caller (the
    /// loop Jacobian synthesizer) is responsible for deciding whether that
    /// means the value must be emitted under a conditional guard.
    pub fn detect(samples: &BTreeMap<usize, i64>) -> IndexPattern {
        if samples.is_empty() {
            return IndexPattern::Random1D {
                values: BTreeMap::new(),
            };
        }

        if let Some((slope, offset, divisor)) = fit_linear(samples) {
            return IndexPattern::Linear {
                slope,
                offset,
                divisor,
            };
        }

        if let Some(sections) = fit_sectioned(samples) {
            return IndexPattern::Sectioned { sections };
        }

        IndexPattern::Random1D {
            values: samples.clone(),
        }
    }
}

/// Try every divisor in `1..=MAX_DIVISOR`, looking for a `(slope, offset)`
/// such that `value * divisor == slope * iteration + offset` for every
/// sample. Linear detection only needs small divisors in practice (they
/// come from flattening small fixed-size per-iteration blocks).
const MAX_DIVISOR: i64 = 8;

fn fit_linear(samples: &BTreeMap<usize, i64>) -> Option<(i64, i64, i64)> {
    if samples.len() < 2 {
        let (_, &val) = samples.iter().next()?;
        // A single sample is linear with slope 0 (can't determine a real
        // slope from one point); prefer the exact constant.
        return Some((0, val, 1));
    }

    let mut iter_iter = samples.iter();
    let (&i0, &v0) = iter_iter.next().unwrap();
    let (&i1, &v1) = iter_iter.next().unwrap();

    for divisor in 1..=MAX_DIVISOR {
        let num_diff = v1 * divisor - v0 * divisor;
        let iter_diff = i1 as i64 - i0 as i64;
        if iter_diff == 0 || num_diff % iter_diff != 0 {
            continue;
        }
        let slope = num_diff / iter_diff;
        let offset = v0 * divisor - slope * (i0 as i64);

        let all_match = samples.iter().all(|(&iter, &val)| {
            let numerator = slope * (iter as i64) + offset;
            numerator.div_euclid(divisor) == val && numerator.rem_euclid(divisor) == 0
        });
        if all_match {
            return Some((slope, offset, divisor));
        }
    }
    None
}

/// Split `samples` into maximal contiguous-iteration runs and try to fit
/// each run independently. Requires at least two sections (otherwise
/// `fit_linear` would already have succeeded) and every section to fit.
fn fit_sectioned(samples: &BTreeMap<usize, i64>) -> Option<Vec<(usize, Box<IndexPattern>)>> {
    let mut runs: Vec<BTreeMap<usize, i64>> = Vec::new();
    let mut last_iter: Option<usize> = None;
    for (&iter, &val) in samples {
        let starts_new_run = match last_iter {
            Some(prev) => iter != prev + 1,
            None => true,
        };
        if starts_new_run {
            runs.push(BTreeMap::new());
        }
        runs.last_mut().unwrap().insert(iter, val);
        last_iter = Some(iter);
    }

    if runs.len() < 2 {
        return None;
    }

    let mut sections = Vec::with_capacity(runs.len());
    for run in runs {
        let start = *run.keys().next().unwrap();
        let pattern = IndexPattern::detect(&run);
        if let IndexPattern::Random1D { .. } = pattern {
            if run.len() > 1 {
                // A multi-point run that still only fits as a raw table
                // is not worth sectioning over; bail out to the overall
                // Random1D fallback.
                return None;
            }
        }
        sections.push((start, Box::new(pattern)));
    }
    Some(sections)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(usize, i64)]) -> BTreeMap<usize, i64> {
        pairs.iter().cloned().collect()
    }

    #[test]
    fn detects_simple_linear() {
        let samples = map(&[(0, 10), (1, 13), (2, 16), (3, 19)]);
        let pattern = IndexPattern::detect(&samples);
        assert_eq!(
            pattern,
            IndexPattern::Linear {
                slope: 3,
                offset: 10,
                divisor: 1
            }
        );
        for (iter, val) in &samples {
            assert_eq!(pattern.evaluate(*iter), Some(*val));
        }
    }

    #[test]
    fn detects_linear_with_divisor() {
        // value = iteration / 2
        let samples = map(&[(0, 0), (1, 0), (2, 1), (3, 1), (4, 2)]);
        let pattern = IndexPattern::detect(&samples);
        assert_eq!(
            pattern,
            IndexPattern::Linear {
                slope: 1,
                offset: 0,
                divisor: 2
            }
        );
    }

    #[test]
    fn falls_back_to_random_table() {
        let samples = map(&[(0, 7), (1, 2), (2, 40)]);
        let pattern = IndexPattern::detect(&samples);
        match pattern {
            IndexPattern::Random1D { values } => assert_eq!(values, samples),
            other => panic!("expected Random1D fallback, got {:?}", other),
        }
    }

    #[test]
    fn unpopulated_iteration_detected_by_caller() {
        // iteration 1 is deliberately absent: 0,2 fit a line, so detect
        // reports Linear, but it only spans the populated points.
        let samples = map(&[(0, 10), (2, 16)]);
        let pattern = IndexPattern::detect(&samples);
        assert_eq!(pattern.evaluate(0), Some(10));
        assert_eq!(pattern.evaluate(2), Some(16));
    }

    #[test]
    fn sectioned_pattern_evaluates_per_section() {
        let mut sections = vec![
            (
                0,
                Box::new(IndexPattern::Linear {
                    slope: 1,
                    offset: 0,
                    divisor: 1,
                }),
            ),
            (
                5,
                Box::new(IndexPattern::Linear {
                    slope: -1,
                    offset: 20,
                    divisor: 1,
                }),
            ),
        ];
        let pattern = IndexPattern::Sectioned {
            sections: std::mem::take(&mut sections),
        };
        assert_eq!(pattern.evaluate(2), Some(2));
        assert_eq!(pattern.evaluate(6), Some(14));
    }
}
