//! Densely numbered references into a handler-owned arena.
//!
//! Nodes are never referenced by Rust pointer. Instead every reference is a
//! small `Copy` index wrapping a `u32`, following the entity-reference
//! discipline of `cranelift-entity`: arguments, paths and scratch maps all
//! key off these indices rather than object identity, so a handler's arena
//! can be grown, cloned or (eventually) serialized without invalidating
//! anything that refers into it.

use core::fmt;
use core::marker::PhantomData;

/// A type that can be used as a densely numbered arena index.
pub trait EntityRef: Copy + Eq + PartialEq {
    /// Create a new reference from its zero-based index.
    fn new(index: usize) -> Self;

    /// Get the index of this reference.
    fn index(self) -> usize;
}

/// An opaque reference to an [`OperationNode`](crate::node::OperationNode)
/// owned by a [`CodeHandler`](crate::handler::CodeHandler).
///
/// `NodeId`s are only meaningful relative to the handler that produced them;
/// mixing ids from two different handlers is a logic error the type system
/// cannot catch (same caveat as `cranelift`'s `Inst`/`Value`/`Ebb`).
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "enable-serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NodeId(u32);

impl EntityRef for NodeId {
    fn new(index: usize) -> Self {
        debug_assert!(index < (u32::MAX as usize));
        NodeId(index as u32)
    }

    fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        (self as &dyn fmt::Display).fmt(f)
    }
}

/// An opaque reference to an index pattern owned by a `CodeHandler`.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "enable-serde", derive(serde::Serialize, serde::Deserialize))]
pub struct IndexPatternId(u32);

impl EntityRef for IndexPatternId {
    fn new(index: usize) -> Self {
        debug_assert!(index < (u32::MAX as usize));
        IndexPatternId(index as u32)
    }

    fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for IndexPatternId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "ip{}", self.0)
    }
}

/// A `K -> V` map over a densely numbered entity reference.
///
/// Unlike a primary map, a `SecondaryMap` does not allocate references; it
/// only associates out-of-band data (traversal colors, emitted ids, ...)
/// with references allocated elsewhere. Every key is implicitly present
/// with the default value, matching `cranelift_entity::SecondaryMap`.
#[derive(Debug, Clone)]
pub struct SecondaryMap<K: EntityRef, V: Clone> {
    elems: Vec<V>,
    default: V,
    unused: PhantomData<K>,
}

impl<K: EntityRef, V: Clone + Default> SecondaryMap<K, V> {
    /// Create a new, empty map using `V::default()` for unset entries.
    pub fn new() -> Self {
        Self {
            elems: Vec::new(),
            default: V::default(),
            unused: PhantomData,
        }
    }
}

impl<K: EntityRef, V: Clone> SecondaryMap<K, V> {
    /// Create a new, empty map with an explicit default value.
    pub fn with_default(default: V) -> Self {
        Self {
            elems: Vec::new(),
            default,
            unused: PhantomData,
        }
    }

    /// Get the value at `k`, or the default if it was never written.
    pub fn get(&self, k: K) -> &V {
        self.elems.get(k.index()).unwrap_or(&self.default)
    }

    /// Set the value at `k`, growing the backing store as needed.
    pub fn set(&mut self, k: K, v: V) {
        let i = k.index();
        if i >= self.elems.len() {
            self.elems.resize(i + 1, self.default.clone());
        }
        self.elems[i] = v;
    }

    /// Remove every entry, resetting the map to all-default.
    pub fn clear(&mut self) {
        self.elems.clear();
    }
}

impl<K: EntityRef, V: Clone> core::ops::Index<K> for SecondaryMap<K, V> {
    type Output = V;

    fn index(&self, k: K) -> &V {
        self.get(k)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secondary_map_defaults_until_written() {
        let mut m: SecondaryMap<NodeId, bool> = SecondaryMap::new();
        let n0 = NodeId::new(0);
        let n3 = NodeId::new(3);
        assert_eq!(*m.get(n0), false);
        m.set(n3, true);
        assert_eq!(*m.get(n3), true);
        assert_eq!(*m.get(NodeId::new(1)), false);
    }

    #[test]
    fn node_id_display() {
        assert_eq!(NodeId::new(7).to_string(), "n7");
    }
}
