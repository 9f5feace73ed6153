//! Re-evaluates a recorded graph against a (possibly different) output
//! scalar type.
//!
//! Grounded directly on `evaluator.hpp`'s `Evaluator<Base, BaseOut>`: one
//! memoization cache per node (`evals_`), one per array-creation node
//! (`evalsArrays_`), and one "has this atomic call already run" set
//! (`evalsAtomic_`), all reset at the start and end of [`Evaluator::evaluate`]
//! so running the same evaluator twice never leaks stale results. `BaseOut`
//! is spelled `Out` here; this crate requires `Out: From<B>` where the
//! original relies on `Base`/`BaseOut` being implicitly convertible
//! numeric types.

use std::collections::{HashMap, HashSet};

use crate::cg::CG;
use crate::entity::NodeId;
use crate::error::{CgError, CgResult};
use crate::handler::CodeHandler;
use crate::node::Argument;
use crate::num::Numeric;
use crate::op::OpCode;

/// A zero-order-forward atomic function callable by the evaluator.
///
/// Only order-0 forward mode is supported, matching the original's
/// hard-coded restriction (it has no recorded tape to differentiate
/// through once re-targeted onto `Out`).
pub trait AtomicFunction<Out> {
    /// Fill `ay` (already sized to the recorded output array's length)
    /// from `ax`.
    fn forward(&self, ax: &[Out], ay: &mut [Out]);
}

/// Re-evaluates a list of dependents recorded on a [`CodeHandler<B>`]
/// against a fresh vector of independents of type `Out`.
pub struct Evaluator<'h, B: Numeric, Out: Numeric + From<B>> {
    handler: &'h CodeHandler<B>,
    dep: Vec<CG<'h, B>>,
    evals: HashMap<NodeId, Out>,
    eval_arrays: HashMap<NodeId, Vec<Out>>,
    eval_atomic: HashSet<NodeId>,
    atomic_functions: HashMap<usize, Box<dyn AtomicFunction<Out>>>,
}

impl<'h, B: Numeric, Out: Numeric + From<B>> Evaluator<'h, B, Out> {
    /// Build an evaluator for `dep`, all of which must belong to `handler`.
    pub fn new(handler: &'h CodeHandler<B>, dep: Vec<CG<'h, B>>) -> Self {
        Evaluator {
            handler,
            dep,
            evals: HashMap::new(),
            eval_arrays: HashMap::new(),
            eval_atomic: HashSet::new(),
            atomic_functions: HashMap::new(),
        }
    }

    /// Register an atomic function implementation, returning `true` if one
    /// was already registered under `id`.
    pub fn add_atomic_function(&mut self, id: usize, atomic: Box<dyn AtomicFunction<Out>>) -> bool {
        self.atomic_functions.insert(id, atomic).is_some()
    }

    /// Register several atomic functions at once, skipping `None` entries
    /// (matching `addAtomicFunctions`' null-skipping behavior).
    pub fn add_atomic_functions<I>(&mut self, atomics: I)
    where
        I: IntoIterator<Item = (usize, Option<Box<dyn AtomicFunction<Out>>>)>,
    {
        for (id, atomic) in atomics {
            if let Some(atomic) = atomic {
                self.atomic_functions.insert(id, atomic);
            }
        }
    }

    /// Re-evaluate every dependent against `indep`, which must match the
    /// handler's independent registry in both length and order.
    pub fn evaluate(&mut self, indep: &[Out]) -> CgResult<Vec<Out>> {
        let expected = self.handler.independent_count();
        if indep.len() != expected {
            return Err(CgError::ArityMismatch {
                expected,
                got: indep.len(),
            });
        }

        self.clear();

        let mut new_dep = Vec::with_capacity(self.dep.len());
        for i in 0..self.dep.len() {
            let d = self.dep[i];
            new_dep.push(self.eval_cg(&d, indep)?);
        }

        self.clear();
        Ok(new_dep)
    }

    fn clear(&mut self) {
        self.evals.clear();
        self.eval_arrays.clear();
        self.eval_atomic.clear();
    }

    fn eval_cg(&mut self, dep: &CG<'h, B>, indep: &[Out]) -> CgResult<Out> {
        match dep {
            CG::Parameter(v) => Ok(Out::from(*v)),
            CG::Variable { node, .. } => self.eval_operations(*node, indep),
        }
    }

    fn eval_arg(&mut self, arg: &Argument<B>, indep: &[Out]) -> CgResult<Out> {
        match arg {
            Argument::Node(node) => self.eval_operations(*node, indep),
            Argument::Parameter(v) => Ok(Out::from(*v)),
        }
    }

    fn eval_operations(&mut self, node_id: NodeId, indep: &[Out]) -> CgResult<Out> {
        if let Some(v) = self.evals.get(&node_id) {
            return Ok(*v);
        }

        let handler = self.handler;
        let (op, args, info) = {
            let node = handler.node(node_id);
            (node.op(), node.args().to_vec(), node.info().to_vec())
        };

        let result = match op {
            OpCode::Assign | OpCode::Alias => {
                debug_assert_eq!(args.len(), 1);
                self.eval_arg(&args[0], indep)?
            }
            OpCode::Abs => {
                debug_assert_eq!(args.len(), 1);
                self.eval_arg(&args[0], indep)?.abs()
            }
            OpCode::Acos => self.eval_arg(&args[0], indep)?.acos(),
            OpCode::Add => {
                debug_assert_eq!(args.len(), 2);
                let a = self.eval_arg(&args[0], indep)?;
                let b = self.eval_arg(&args[1], indep)?;
                a + b
            }
            OpCode::ArrayElement => {
                debug_assert_eq!(args.len(), 2);
                debug_assert_eq!(info.len(), 1);
                let index = info[0];
                let array_node = args[0]
                    .node()
                    .expect("array element's array argument must reference a node");
                let atomic_node = args[1]
                    .node()
                    .expect("array element's atomic argument must reference a node");
                // Pre-register the array (its own args are placeholders for
                // an atomic's output) before the atomic call overwrites it.
                let _ = self.eval_array_creation(array_node, indep)?;
                self.eval_atomic_operation(atomic_node, indep)?;
                let array = self
                    .eval_arrays
                    .get(&array_node)
                    .expect("array creation must be cached after its atomic operation runs");
                array[index]
            }
            OpCode::Asin => self.eval_arg(&args[0], indep)?.asin(),
            OpCode::Atan => self.eval_arg(&args[0], indep)?.atan(),
            OpCode::ComLt | OpCode::ComLe | OpCode::ComEq | OpCode::ComGe | OpCode::ComGt | OpCode::ComNe => {
                debug_assert_eq!(args.len(), 4);
                let cmp = op.compare_op().expect("Com* op code must carry a CompareOp");
                let left = self.eval_arg(&args[0], indep)?;
                let right = self.eval_arg(&args[1], indep)?;
                let if_true = self.eval_arg(&args[2], indep)?;
                let if_false = self.eval_arg(&args[3], indep)?;
                Out::cond(cmp, left, right, if_true, if_false)
            }
            OpCode::Cosh => self.eval_arg(&args[0], indep)?.cosh(),
            OpCode::Cos => self.eval_arg(&args[0], indep)?.cos(),
            OpCode::Div => {
                debug_assert_eq!(args.len(), 2);
                let a = self.eval_arg(&args[0], indep)?;
                let b = self.eval_arg(&args[1], indep)?;
                a / b
            }
            OpCode::Exp => self.eval_arg(&args[0], indep)?.exp(),
            OpCode::Inv => {
                let index = handler
                    .independent_index(node_id)
                    .expect("Inv node must be registered as an independent");
                indep[index]
            }
            OpCode::Log => self.eval_arg(&args[0], indep)?.ln(),
            OpCode::Mul => {
                debug_assert_eq!(args.len(), 2);
                let a = self.eval_arg(&args[0], indep)?;
                let b = self.eval_arg(&args[1], indep)?;
                a * b
            }
            OpCode::Pow => {
                debug_assert_eq!(args.len(), 2);
                let a = self.eval_arg(&args[0], indep)?;
                let b = self.eval_arg(&args[1], indep)?;
                a.powf(b)
            }
            OpCode::Sign => self.eval_arg(&args[0], indep)?.sign(),
            OpCode::Sinh => self.eval_arg(&args[0], indep)?.sinh(),
            OpCode::Sin => self.eval_arg(&args[0], indep)?.sin(),
            OpCode::Sqrt => self.eval_arg(&args[0], indep)?.sqrt(),
            OpCode::Sub => {
                debug_assert_eq!(args.len(), 2);
                let a = self.eval_arg(&args[0], indep)?;
                let b = self.eval_arg(&args[1], indep)?;
                a - b
            }
            OpCode::Tanh => self.eval_arg(&args[0], indep)?.tanh(),
            OpCode::Tan => self.eval_arg(&args[0], indep)?.tan(),
            OpCode::UnMinus => {
                debug_assert_eq!(args.len(), 1);
                -self.eval_arg(&args[0], indep)?
            }
            OpCode::ArrayCreation
            | OpCode::AtomicForward
            | OpCode::AtomicReverse
            | OpCode::IndexDeclare
            | OpCode::IndexAssign
            | OpCode::IndexOp
            | OpCode::LoopStart
            | OpCode::LoopEnd
            | OpCode::DependentRefRhs => {
                return Err(CgError::UnsupportedOp { op });
            }
        };

        self.evals.insert(node_id, result);
        Ok(result)
    }

    fn eval_array_creation(&mut self, node_id: NodeId, indep: &[Out]) -> CgResult<Vec<Out>> {
        if let Some(values) = self.eval_arrays.get(&node_id) {
            return Ok(values.clone());
        }

        let handler = self.handler;
        let args = {
            let node = handler.node(node_id);
            debug_assert_eq!(node.op(), OpCode::ArrayCreation);
            node.args().to_vec()
        };

        let mut values = Vec::with_capacity(args.len());
        for arg in &args {
            values.push(self.eval_arg(arg, indep)?);
        }
        self.eval_arrays.insert(node_id, values.clone());
        Ok(values)
    }

    fn eval_atomic_operation(&mut self, node_id: NodeId, indep: &[Out]) -> CgResult<()> {
        if self.eval_atomic.contains(&node_id) {
            return Ok(());
        }

        let handler = self.handler;
        let (op, args, info) = {
            let node = handler.node(node_id);
            (node.op(), node.args().to_vec(), node.info().to_vec())
        };
        if op != OpCode::AtomicForward {
            return Err(CgError::UnsupportedOp { op });
        }
        debug_assert_eq!(args.len(), 2);
        debug_assert_eq!(info.len(), 3);

        let atomic_id = info[0];
        let order = info[2];
        if order != 0 {
            return Err(CgError::UnsupportedAtomic { order });
        }

        if !self.atomic_functions.contains_key(&atomic_id) {
            let name = match handler.atomic_function_name(atomic_id) {
                Some(n) => format!("'{}'", n),
                None => format!("id '{}'", atomic_id),
            };
            return Err(CgError::MissingAtomic { name });
        }

        let input_node = args[0]
            .node()
            .expect("atomic forward's input argument must reference an array creation node");
        let output_node = args[1]
            .node()
            .expect("atomic forward's output argument must reference an array creation node");

        let ax = self.eval_array_creation(input_node, indep)?;
        let mut ay = self.eval_array_creation(output_node, indep)?;

        self.atomic_functions
            .get(&atomic_id)
            .unwrap()
            .forward(&ax, &mut ay);

        self.eval_arrays.insert(output_node, ay);
        self.eval_atomic.insert(node_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Argument;
    use smallvec::{smallvec, SmallVec};
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn evaluates_simple_expression() {
        let h: CodeHandler<f64> = CodeHandler::new();
        let x = h.new_independent();
        let expr = (CG::from_node(&h, x) + CG::parameter(2.0)) * CG::parameter(3.0);

        let mut evaluator = Evaluator::new(&h, vec![expr]);
        let result = evaluator.evaluate(&[5.0]).unwrap();
        assert_eq!(result, vec![21.0]);
    }

    #[test]
    fn rejects_wrong_independent_count() {
        let h: CodeHandler<f64> = CodeHandler::new();
        let x = h.new_independent();
        let mut evaluator = Evaluator::new(&h, vec![CG::from_node(&h, x)]);
        let err = evaluator.evaluate(&[]).unwrap_err();
        assert_eq!(err, CgError::ArityMismatch { expected: 1, got: 0 });
    }

    #[test]
    fn re_evaluation_uses_memoized_node_values() {
        let h: CodeHandler<f64> = CodeHandler::new();
        let x = h.new_independent();
        let shared = CG::from_node(&h, x) + CG::parameter(1.0);
        let dep = vec![shared, shared];
        let mut evaluator = Evaluator::new(&h, dep);
        let result = evaluator.evaluate(&[4.0]).unwrap();
        assert_eq!(result, vec![5.0, 5.0]);
    }

    struct CountingAtomic {
        calls: Rc<Cell<usize>>,
    }

    impl AtomicFunction<f64> for CountingAtomic {
        fn forward(&self, ax: &[f64], ay: &mut [f64]) {
            self.calls.set(self.calls.get() + 1);
            for (i, y) in ay.iter_mut().enumerate() {
                *y = ax[0] * (i as f64 + 1.0);
            }
        }
    }

    #[test]
    fn atomic_forward_runs_once_and_is_shared_across_array_elements() {
        let h: CodeHandler<f64> = CodeHandler::new();
        let input = h.add_node(OpCode::ArrayCreation, smallvec![Argument::Parameter(3.0)], SmallVec::new());
        let output = h.add_node(
            OpCode::ArrayCreation,
            smallvec![Argument::Parameter(0.0), Argument::Parameter(0.0)],
            SmallVec::new(),
        );
        let atomic_node = h.add_node(
            OpCode::AtomicForward,
            smallvec![Argument::Node(input), Argument::Node(output)],
            smallvec![7usize, 0, 0],
        );
        let elem0 = h.add_node(
            OpCode::ArrayElement,
            smallvec![Argument::Node(output), Argument::Node(atomic_node)],
            smallvec![0usize],
        );
        let elem1 = h.add_node(
            OpCode::ArrayElement,
            smallvec![Argument::Node(output), Argument::Node(atomic_node)],
            smallvec![1usize],
        );

        let dep = vec![CG::from_node(&h, elem0), CG::from_node(&h, elem1)];
        let mut evaluator = Evaluator::new(&h, dep);
        let calls = Rc::new(Cell::new(0));
        evaluator.add_atomic_function(7, Box::new(CountingAtomic { calls: calls.clone() }));

        let result = evaluator.evaluate(&[]).unwrap();
        assert_eq!(result, vec![3.0, 6.0]);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn missing_atomic_function_is_reported_by_name() {
        let h: CodeHandler<f64> = CodeHandler::new();
        h.add_atomic_function(9, "myAtomic");
        let input = h.add_node(OpCode::ArrayCreation, smallvec![Argument::Parameter(1.0)], SmallVec::new());
        let output = h.add_node(OpCode::ArrayCreation, smallvec![Argument::Parameter(0.0)], SmallVec::new());
        let atomic_node = h.add_node(
            OpCode::AtomicForward,
            smallvec![Argument::Node(input), Argument::Node(output)],
            smallvec![9usize, 0, 0],
        );
        let elem = h.add_node(
            OpCode::ArrayElement,
            smallvec![Argument::Node(output), Argument::Node(atomic_node)],
            smallvec![0usize],
        );

        let mut evaluator: Evaluator<f64, f64> = Evaluator::new(&h, vec![CG::from_node(&h, elem)]);
        let err = evaluator.evaluate(&[]).unwrap_err();
        assert_eq!(
            err,
            CgError::MissingAtomic {
                name: "'myAtomic'".to_string()
            }
        );
    }
}
