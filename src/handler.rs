//! The arena that owns every node of one operation graph.

use std::cell::{Ref, RefCell};
use std::collections::HashMap;

use smallvec::SmallVec;

use crate::config::HandlerConfig;
use crate::entity::{EntityRef, IndexPatternId, NodeId};
use crate::index_pattern::IndexPattern;
use crate::node::{Argument, OperationNode, OperationPathNode};
use crate::op::OpCode;

/// Owns every [`OperationNode`] of one graph, the independent-variable
/// registry, the atomic-function name table, and any index patterns
/// produced by loop synthesis.
///
/// Node storage lives behind a `RefCell` rather than requiring `&mut self`
/// for `add_node`: [`CG`](crate::cg::CG) operator overloads only ever hold
/// a shared `&CodeHandler`, the same way `cranelift-codegen`'s builders
/// hold a `&mut Function` but this crate's symbolic scalars are built up
/// from values the caller does not want to thread a unique borrow
/// through. Nodes themselves never move once allocated (indices are
/// stable for the handler's lifetime), so interior mutability here never
/// invalidates an already-issued `NodeId`.
pub struct CodeHandler<B> {
    nodes: RefCell<Vec<OperationNode<B>>>,
    independents: RefCell<Vec<NodeId>>,
    atomic_names: RefCell<HashMap<usize, String>>,
    index_patterns: RefCell<Vec<IndexPattern>>,
    config: HandlerConfig,
}

impl<B> CodeHandler<B> {
    /// Create a handler with default configuration.
    pub fn new() -> Self {
        Self::with_config(HandlerConfig::default())
    }

    /// Create a handler with explicit configuration.
    pub fn with_config(config: HandlerConfig) -> Self {
        CodeHandler {
            nodes: RefCell::new(Vec::new()),
            independents: RefCell::new(Vec::new()),
            atomic_names: RefCell::new(HashMap::new()),
            index_patterns: RefCell::new(Vec::new()),
            config,
        }
    }

    /// This handler's configuration.
    pub fn config(&self) -> &HandlerConfig {
        &self.config
    }

    /// Allocate a fresh independent (`Inv`) node and register it. Its
    /// position in the independent registry (returned alongside the id)
    /// is its identity for the evaluator.
    pub fn new_independent(&self) -> NodeId {
        let id = self.raw_add_node(OpCode::Inv, SmallVec::new(), SmallVec::new());
        self.independents.borrow_mut().push(id);
        id
    }

    /// How many independents have been registered.
    pub fn independent_count(&self) -> usize {
        self.independents.borrow().len()
    }

    /// The registry position of an `Inv` node, if it is one and is
    /// registered with this handler.
    pub fn independent_index(&self, id: NodeId) -> Option<usize> {
        self.independents.borrow().iter().position(|&i| i == id)
    }

    /// The independent node at a given registry position.
    pub fn independent_at(&self, index: usize) -> Option<NodeId> {
        self.independents.borrow().get(index).copied()
    }

    /// Allocate a new node, asserting arity as [`OperationNode::new`]
    /// does. This is the single choke point every graph-extending
    /// operation (the `CG` operator overloads, the solver, the loop
    /// synthesizer) routes through.
    pub fn add_node(
        &self,
        op: OpCode,
        args: SmallVec<[Argument<B>; 4]>,
        info: SmallVec<[usize; 3]>,
    ) -> NodeId {
        self.raw_add_node(op, args, info)
    }

    fn raw_add_node(
        &self,
        op: OpCode,
        args: SmallVec<[Argument<B>; 4]>,
        info: SmallVec<[usize; 3]>,
    ) -> NodeId {
        let node = OperationNode::new(op, args, info);
        let mut nodes = self.nodes.borrow_mut();
        let id = NodeId::new(nodes.len());
        nodes.push(node);
        id
    }

    /// Total number of nodes allocated so far.
    pub fn node_count(&self) -> usize {
        self.nodes.borrow().len()
    }

    /// Borrow a single node by id.
    pub fn node(&self, id: NodeId) -> Ref<OperationNode<B>> {
        Ref::map(self.nodes.borrow(), |v| &v[id.index()])
    }

    /// Register (or overwrite) the diagnostic name of an atomic function.
    /// Returns `true` if an id with that name was already bound.
    pub fn add_atomic_function(&self, id: usize, name: impl Into<String>) -> bool {
        self.atomic_names
            .borrow_mut()
            .insert(id, name.into())
            .is_some()
    }

    /// Register many atomic function names at once, skipping `None`
    /// entries, matching `addAtomicFunctions`' null-skipping behavior.
    pub fn add_atomic_functions<I: IntoIterator<Item = (usize, Option<String>)>>(&self, entries: I) {
        let mut names = self.atomic_names.borrow_mut();
        for (id, name) in entries {
            if let Some(name) = name {
                names.insert(id, name);
            }
        }
    }

    /// The diagnostic name registered for an atomic id, if any.
    pub fn atomic_function_name(&self, id: usize) -> Option<String> {
        self.atomic_names.borrow().get(&id).cloned()
    }

    /// Move an index pattern produced by loop synthesis into this
    /// handler's long-term ownership, returning a stable reference to it.
    pub fn add_index_pattern(&self, pattern: IndexPattern) -> IndexPatternId {
        let mut patterns = self.index_patterns.borrow_mut();
        let id = IndexPatternId::new(patterns.len());
        patterns.push(pattern);
        id
    }

    /// Borrow a previously added index pattern.
    pub fn index_pattern(&self, id: IndexPatternId) -> Ref<IndexPattern> {
        Ref::map(self.index_patterns.borrow(), |v| &v[id.index()])
    }

    /// Find every path from `root` down to `target`, stopping early once
    /// `max_paths` have been found (the solver calls this with `2`: it
    /// only needs to distinguish "zero", "exactly one", or "more than
    /// one"). A path is a nonempty sequence of [`OperationPathNode`]s
    /// whose first element is `root` and whose last element is `target`.
    pub fn find_paths(&self, root: NodeId, target: NodeId, max_paths: usize) -> Vec<Vec<OperationPathNode>> {
        let mut results = Vec::new();
        let mut current = vec![OperationPathNode {
            node: root,
            arg_index: 0,
        }];
        self.find_paths_rec(root, target, max_paths, &mut current, &mut results);
        results
    }

    fn find_paths_rec(
        &self,
        node_id: NodeId,
        target: NodeId,
        max_paths: usize,
        path: &mut Vec<OperationPathNode>,
        results: &mut Vec<Vec<OperationPathNode>>,
    ) {
        if results.len() >= max_paths {
            return;
        }
        let arg_count = self.node(node_id).args().len();
        for arg_index in 0..arg_count {
            if results.len() >= max_paths {
                return;
            }
            let referenced = self.node(node_id).args()[arg_index].node();
            let child = match referenced {
                Some(child) => child,
                None => continue,
            };
            path.push(OperationPathNode {
                node: child,
                arg_index,
            });
            if child == target {
                results.push(path.clone());
            } else {
                self.find_paths_rec(child, target, max_paths, path, results);
            }
            path.pop();
        }
    }
}

impl<B> Default for CodeHandler<B> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Argument;

    #[test]
    fn independent_registry_tracks_index() {
        let h: CodeHandler<f64> = CodeHandler::new();
        let a = h.new_independent();
        let b = h.new_independent();
        assert_eq!(h.independent_index(a), Some(0));
        assert_eq!(h.independent_index(b), Some(1));
        assert_eq!(h.independent_count(), 2);
    }

    #[test]
    fn find_paths_single_use() {
        let h: CodeHandler<f64> = CodeHandler::new();
        let x = h.new_independent();
        let add = h.add_node(
            OpCode::Add,
            SmallVec::from_vec(vec![Argument::Node(x), Argument::Parameter(3.0)]),
            SmallVec::new(),
        );
        let paths = h.find_paths(add, x, 2);
        assert_eq!(paths.len(), 1);
        assert_eq!(paths[0].last().unwrap().node, x);
        assert_eq!(paths[0].last().unwrap().arg_index, 0);
    }

    #[test]
    fn find_paths_detects_ambiguity() {
        let h: CodeHandler<f64> = CodeHandler::new();
        let x = h.new_independent();
        let add = h.add_node(
            OpCode::Add,
            SmallVec::from_vec(vec![Argument::Node(x), Argument::Node(x)]),
            SmallVec::new(),
        );
        let paths = h.find_paths(add, x, 2);
        assert_eq!(paths.len(), 2);
    }

    #[test]
    fn find_paths_reports_absence() {
        let h: CodeHandler<f64> = CodeHandler::new();
        let x = h.new_independent();
        let y = h.new_independent();
        let _add = h.add_node(
            OpCode::Add,
            SmallVec::from_vec(vec![Argument::Node(x), Argument::Parameter(1.0)]),
            SmallVec::new(),
        );
        assert!(h.find_paths(x, y, 2).is_empty());
    }
}
