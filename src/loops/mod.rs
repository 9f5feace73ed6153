//! Loop-aware sparse Jacobian support.
//!
//! A recorded graph may contain loop models: equation patterns recorded
//! once and conceptually replayed across many iterations rather than
//! unrolled into the arena. [`analyzer`] classifies a target Jacobian's
//! nonzeros against those loop models (and the no-loop remainder);
//! [`synth`] turns that classification back into actual `CG` values.

pub mod analyzer;
pub mod model;
pub mod synth;

pub use analyzer::{analyse_sparse_jacobian_with_loops, AnalysisResult, JacobianRowInfo};
pub use model::{IndependentClassification, LoopModel, LoopPosition, NoLoopModel};
pub use synth::{prepare_sparse_jacobian_with_loops, JacobianMode, LoopTape};
