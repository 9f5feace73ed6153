//! An operation-graph core for an algorithmic-differentiation
//! source-code-generation toolkit.
//!
//! A [`CodeHandler`] owns an arena of [`OperationNode`]s built up by
//! recording operator-overloaded [`CG`] scalars; an [`Evaluator`] replays
//! that graph against a fresh scalar type, a [`solver`] inverts a single
//! path through it, and the [`loops`] module classifies and re-synthesizes
//! sparse Jacobian contributions for graphs with replicated equation
//! patterns. Turning any of this into an emitted C (or other target)
//! source file is deliberately out of scope — see `SPEC_FULL.md` §1.
#![deny(missing_docs)]
// #![no_std]

pub mod cg;
pub mod config;
pub mod entity;
pub mod error;
pub mod evaluator;
pub mod handler;
pub mod index_pattern;
pub mod loops;
pub mod node;
pub mod num;
pub mod op;
pub mod solver;

pub use cg::CG;
pub use config::HandlerConfig;
pub use entity::{EntityRef, IndexPatternId, NodeId, SecondaryMap};
pub use error::{CgError, CgResult};
pub use evaluator::{AtomicFunction, Evaluator};
pub use handler::CodeHandler;
pub use index_pattern::IndexPattern;
pub use node::{Argument, OperationNode, OperationPathNode};
pub use num::Numeric;
pub use op::{CompareOp, OpCode};
pub use solver::{is_solvable, is_solvable_path, solve_for, solve_for_path};
