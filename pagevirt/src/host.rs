//! Capabilities the engine consumes from its host environment.
//!
//! The engine never holds host objects beyond node handles. Every operation receives the host
//! by `&mut` and talks to it through these traits; the host in turn feeds events back through
//! the `Engine::on_*` entry points.

use crate::{Extent, Margin, NodeHandle, Result, Viewport, WatchId};

/// The page tree: structure, structural rules, content and geometry.
pub trait PageTree {
    type Node: NodeHandle;

    /// The whole-document root. Last fallback for the discovery root.
    fn document_root(&self) -> Self::Node;

    /// All descendants of `scope` (excluding `scope`) matching `rule`, in document order.
    fn select_all(&self, scope: &Self::Node, rule: &str) -> Result<Vec<Self::Node>>;

    fn matches(&self, node: &Self::Node, rule: &str) -> Result<bool>;

    fn parent(&self, node: &Self::Node) -> Option<Self::Node>;

    /// Whether `node` is still attached under the document root.
    fn is_connected(&self, node: &Self::Node) -> bool;

    fn attribute(&self, node: &Self::Node, name: &str) -> Option<String>;

    /// The "unloaded" tag stored on the node itself.
    fn is_flagged(&self, node: &Self::Node) -> bool;
    fn set_flagged(&mut self, node: &Self::Node, flagged: bool);

    /// Detaches every child of `node` and returns them in order.
    fn take_children(&mut self, node: &Self::Node) -> Vec<Self::Node>;
    fn append_children(&mut self, node: &Self::Node, children: Vec<Self::Node>);

    fn create_placeholder(&mut self, height: u32) -> Self::Node;
    fn set_placeholder_height(&mut self, placeholder: &Self::Node, height: u32);

    /// Hands detached nodes back to the host once the engine no longer needs them.
    fn discard(&mut self, nodes: Vec<Self::Node>) {
        drop(nodes);
    }

    fn measure_height(&self, node: &Self::Node) -> u32;
    fn extent(&self, node: &Self::Node) -> Extent;
    fn viewport(&self) -> Viewport;

    /// Sets visibility-hidden on `node` without affecting layout. Returns the previous value.
    fn set_hidden(&mut self, node: &Self::Node, hidden: bool) -> bool;

    fn inner_html(&self, node: &Self::Node) -> String;

    /// Serializes detached nodes without touching them or the live tree.
    fn fragment_html(&self, nodes: &[Self::Node]) -> String;
}

/// Event-driven viewport visibility (enter/exit of the margin-widened visible region).
///
/// Events are delivered back via `Engine::on_visibility`.
pub trait VisibilityNotifier: PageTree {
    fn is_available(&self) -> bool;
    fn observe(&mut self, node: &Self::Node, margin: Margin);
    fn unobserve(&mut self, node: &Self::Node);
    fn disconnect(&mut self);
}

/// Per-node size-change subscriptions. Sizes are delivered via `Engine::on_size_change`.
pub trait SizeNotifier: PageTree {
    /// `None` when the host cannot watch sizes.
    fn watch(&mut self, node: &Self::Node) -> Option<WatchId>;
    fn unwatch(&mut self, id: WatchId);
}

/// Structural change notifications. Batches are delivered via `Engine::on_tree_changes`.
pub trait TreeNotifier: PageTree {
    fn subscribe(&mut self, scope: &Self::Node);
    fn unsubscribe(&mut self);
}

/// Everything the engine needs from a host.
pub trait Host: VisibilityNotifier + SizeNotifier + TreeNotifier {}
impl<T: VisibilityNotifier + SizeNotifier + TreeNotifier> Host for T {}
