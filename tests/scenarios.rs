//! Scalar-graph scenarios from the testable-properties section of the
//! specification (chain-rule solve, sub-inversion asymmetry, zero-exponent
//! rejection, atomic exactly-once).

use adcg_core::{AtomicFunction, CG, CgError, CodeHandler, Evaluator};

#[test]
fn s1_chain_rule_solve() {
    // E = exp(2*x0) - 5; solveFor(E, x0) must give 0.5 * log(5).
    let h: CodeHandler<f64> = CodeHandler::new();
    let x0 = h.new_independent();
    let e = (CG::from_node(&h, x0) * CG::parameter(2.0)).exp() - CG::parameter(5.0);
    let e_node = e.node_id().unwrap();

    let rhs = adcg_core::solve_for(&h, e_node, x0).unwrap();

    let mut eval = Evaluator::new(&h, vec![rhs]);
    let solved_x0 = eval.evaluate(&[0.0]).unwrap()[0];
    assert!((solved_x0 - 0.5 * 5.0_f64.ln()).abs() < 1e-12);

    let mut residual_eval = Evaluator::new(&h, vec![e]);
    let residual = residual_eval.evaluate(&[solved_x0]).unwrap()[0];
    assert!(residual.abs() < 1e-9);
}

#[test]
fn s2_sub_inversion_is_asymmetric_in_argument_position() {
    // E = 3 - x0 (x0 at arg 1 of Sub): rhs = 3 - 0 = 3.
    let h1: CodeHandler<f64> = CodeHandler::new();
    let x0 = h1.new_independent();
    let e1 = CG::parameter(3.0) - CG::from_node(&h1, x0);
    let rhs1 = adcg_core::solve_for(&h1, e1.node_id().unwrap(), x0).unwrap();
    let mut ev1 = Evaluator::new(&h1, vec![rhs1]);
    assert_eq!(ev1.evaluate(&[0.0]).unwrap(), vec![3.0]);

    // E = x0 - 3 (x0 at arg 0 of Sub): rhs = 0 + 3 = 3.
    let h2: CodeHandler<f64> = CodeHandler::new();
    let y0 = h2.new_independent();
    let e2 = CG::from_node(&h2, y0) - CG::parameter(3.0);
    let rhs2 = adcg_core::solve_for(&h2, e2.node_id().unwrap(), y0).unwrap();
    let mut ev2 = Evaluator::new(&h2, vec![rhs2]);
    assert_eq!(ev2.evaluate(&[0.0]).unwrap(), vec![3.0]);
}

#[test]
fn s3_zero_exponent_pow_is_rejected() {
    let h: CodeHandler<f64> = CodeHandler::new();
    let x0 = h.new_independent();
    let e = CG::from_node(&h, x0).powf(CG::parameter(0.0));
    let err = adcg_core::solve_for(&h, e.node_id().unwrap(), x0).unwrap_err();
    assert_eq!(err, CgError::InvalidZeroExponent);
}

struct CountingAtomic {
    calls: std::rc::Rc<std::cell::Cell<usize>>,
}

impl AtomicFunction<f64> for CountingAtomic {
    fn forward(&self, ax: &[f64], ay: &mut [f64]) {
        self.calls.set(self.calls.get() + 1);
        for (i, y) in ay.iter_mut().enumerate() {
            *y = ax[0] + i as f64;
        }
    }
}

#[test]
fn s4_atomic_runs_exactly_once_for_three_array_element_consumers() {
    use adcg_core::{Argument, OpCode};
    use smallvec::smallvec;

    let h: CodeHandler<f64> = CodeHandler::new();
    let x0 = h.new_independent();
    let input = h.add_node(OpCode::ArrayCreation, smallvec![Argument::Node(x0)], smallvec![]);
    let output = h.add_node(
        OpCode::ArrayCreation,
        smallvec![Argument::Parameter(0.0), Argument::Parameter(0.0), Argument::Parameter(0.0)],
        smallvec![],
    );
    let atomic_node = h.add_node(
        OpCode::AtomicForward,
        smallvec![Argument::Node(input), Argument::Node(output)],
        smallvec![42usize, 0, 0],
    );
    let elems: Vec<CG<f64>> = (0..3)
        .map(|k| {
            let n = h.add_node(
                OpCode::ArrayElement,
                smallvec![Argument::Node(output), Argument::Node(atomic_node)],
                smallvec![k],
            );
            CG::from_node(&h, n)
        })
        .collect();

    let calls = std::rc::Rc::new(std::cell::Cell::new(0));
    let mut evaluator = Evaluator::new(&h, elems);
    evaluator.add_atomic_function(42, Box::new(CountingAtomic { calls: calls.clone() }));
    let result = evaluator.evaluate(&[10.0]).unwrap();

    assert_eq!(result, vec![10.0, 11.0, 12.0]);
    assert_eq!(calls.get(), 1);
}
