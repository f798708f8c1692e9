use core::fmt::Debug;
use core::hash::Hash;

/// An opaque node handle handed out by a host tree.
///
/// Handles are compared by identity: two handles are equal iff they name the same node.
pub trait NodeHandle: Clone + Eq + Hash + Debug {}
impl<T: Clone + Eq + Hash + Debug> NodeHandle for T {}
