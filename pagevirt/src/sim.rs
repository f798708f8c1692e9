//! A simulated host around [`Document`].
//!
//! `SimHost` implements every host capability in memory: the visibility notifier computes
//! intersections against the margin-widened viewport on observe, scroll and resize; size
//! watches are plain handles; tree changes come from the document's mutation records.
//! [`SimHost::pump`] delivers queued notifications to an engine until the page settles.

use std::collections::BTreeMap;

use crate::dom::{Document, NodeId};
use crate::{
    Engine, Extent, Margin, PageTree, Result, SizeNotifier, TreeChange, TreeNotifier, Viewport,
    VisibilityEvent, VisibilityNotifier, WatchId,
};

#[derive(Clone, Copy, Debug)]
struct Target {
    margin: Margin,
    visible: bool,
}

#[derive(Debug, Default)]
struct Intersections {
    targets: BTreeMap<NodeId, Target>,
    pending: Vec<VisibilityEvent<NodeId>>,
}

#[derive(Debug)]
pub struct SimHost {
    doc: Document,
    intersections: Option<Intersections>,
    watches: BTreeMap<WatchId, NodeId>,
    next_watch: u64,
    subscribed: Option<NodeId>,
}

impl SimHost {
    pub fn new(doc: Document) -> Self {
        Self {
            doc,
            intersections: Some(Intersections::default()),
            watches: BTreeMap::new(),
            next_watch: 1,
            subscribed: None,
        }
    }

    /// A host whose event-driven visibility notifier is missing.
    pub fn without_visibility_notifier(doc: Document) -> Self {
        Self {
            intersections: None,
            ..Self::new(doc)
        }
    }

    pub fn doc(&self) -> &Document {
        &self.doc
    }

    pub fn doc_mut(&mut self) -> &mut Document {
        &mut self.doc
    }

    pub fn scroll_to(&mut self, scroll_top: u64) {
        let height = self.doc.viewport().height;
        self.doc.set_viewport(Viewport { scroll_top, height });
        self.recompute();
    }

    pub fn resize_viewport(&mut self, height: u32) {
        let scroll_top = self.doc.viewport().scroll_top;
        self.doc.set_viewport(Viewport { scroll_top, height });
        self.recompute();
    }

    fn visible(&self, node: NodeId, margin: Margin) -> bool {
        self.doc.is_connected(node)
            && self
                .extent(&node)
                .intersects(self.doc.viewport().band(margin))
    }

    /// Re-evaluates every observed target and queues an event for each one that changed.
    pub fn recompute(&mut self) {
        let Some(state) = self.intersections.as_ref() else {
            return;
        };
        let changed: Vec<(NodeId, bool)> = state
            .targets
            .iter()
            .filter_map(|(node, t)| {
                let now = self.visible(*node, t.margin);
                (now != t.visible).then_some((*node, now))
            })
            .collect();
        let Some(state) = self.intersections.as_mut() else {
            return;
        };
        for (node, visible) in changed {
            if let Some(t) = state.targets.get_mut(&node) {
                t.visible = visible;
            }
            state.pending.push(VisibilityEvent { node, visible });
        }
    }

    pub fn take_visibility_events(&mut self) -> Vec<VisibilityEvent<NodeId>> {
        self.intersections
            .as_mut()
            .map(|s| core::mem::take(&mut s.pending))
            .unwrap_or_default()
    }

    pub fn take_tree_changes(&mut self) -> Vec<TreeChange<NodeId>> {
        self.doc.take_records()
    }

    pub fn observed_count(&self) -> usize {
        self.intersections.as_ref().map_or(0, |s| s.targets.len())
    }

    pub fn is_observed(&self, node: NodeId) -> bool {
        self.intersections
            .as_ref()
            .is_some_and(|s| s.targets.contains_key(&node))
    }

    pub fn watch_count(&self) -> usize {
        self.watches.len()
    }

    pub fn is_watched(&self, node: NodeId) -> bool {
        self.watches.values().any(|n| *n == node)
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscribed.is_some()
    }

    /// Delivers a size change for `node` when it is watched.
    pub fn notify_size(&mut self, engine: &mut Engine<NodeId>, node: NodeId, height: u32) {
        if self.is_watched(node) {
            engine.on_size_change(self, &node, height);
        }
    }

    /// Feeds queued tree changes and visibility events to `engine` until none are left.
    ///
    /// Each round delivers tree changes, runs the frame flush, then delivers visibility events.
    pub fn pump(&mut self, engine: &mut Engine<NodeId>, now_ms: u64) -> Result<()> {
        for _ in 0..16 {
            let changes = self.take_tree_changes();
            let scheduled = !changes.is_empty() && engine.on_tree_changes(self, &changes);
            let flushed = engine.on_frame(self, now_ms)?;
            self.recompute();
            let events = self.take_visibility_events();
            if !events.is_empty() {
                engine.on_visibility(self, &events, now_ms);
            }
            if !scheduled && !flushed && events.is_empty() {
                break;
            }
        }
        Ok(())
    }
}

impl PageTree for SimHost {
    type Node = NodeId;

    fn document_root(&self) -> NodeId {
        self.doc.document_root()
    }

    fn select_all(&self, scope: &NodeId, rule: &str) -> Result<Vec<NodeId>> {
        PageTree::select_all(&self.doc, scope, rule)
    }

    fn matches(&self, node: &NodeId, rule: &str) -> Result<bool> {
        self.doc.matches(node, rule)
    }

    fn parent(&self, node: &NodeId) -> Option<NodeId> {
        self.doc.parent(*node)
    }

    fn is_connected(&self, node: &NodeId) -> bool {
        self.doc.is_connected(*node)
    }

    fn attribute(&self, node: &NodeId, name: &str) -> Option<String> {
        self.doc.attribute(*node, name).map(str::to_owned)
    }

    fn is_flagged(&self, node: &NodeId) -> bool {
        self.doc.is_flagged(node)
    }

    fn set_flagged(&mut self, node: &NodeId, flagged: bool) {
        self.doc.set_flagged(node, flagged);
    }

    fn take_children(&mut self, node: &NodeId) -> Vec<NodeId> {
        self.doc.take_children(node)
    }

    fn append_children(&mut self, node: &NodeId, children: Vec<NodeId>) {
        self.doc.append_children(node, children);
    }

    fn create_placeholder(&mut self, height: u32) -> NodeId {
        self.doc.create_placeholder(height)
    }

    fn set_placeholder_height(&mut self, placeholder: &NodeId, height: u32) {
        self.doc.set_placeholder_height(placeholder, height);
    }

    fn discard(&mut self, nodes: Vec<NodeId>) {
        self.doc.discard(nodes);
    }

    fn measure_height(&self, node: &NodeId) -> u32 {
        self.doc.measure_height(node)
    }

    fn extent(&self, node: &NodeId) -> Extent {
        self.doc.extent(node)
    }

    fn viewport(&self) -> Viewport {
        self.doc.viewport()
    }

    fn set_hidden(&mut self, node: &NodeId, hidden: bool) -> bool {
        self.doc.set_hidden(node, hidden)
    }

    fn inner_html(&self, node: &NodeId) -> String {
        self.doc.inner_html(*node)
    }

    fn fragment_html(&self, nodes: &[NodeId]) -> String {
        self.doc.fragment_html(nodes)
    }
}

impl VisibilityNotifier for SimHost {
    fn is_available(&self) -> bool {
        self.intersections.is_some()
    }

    fn observe(&mut self, node: &NodeId, margin: Margin) {
        let visible = self.visible(*node, margin);
        let Some(state) = self.intersections.as_mut() else {
            return;
        };
        if state.targets.contains_key(node) {
            return;
        }
        state.targets.insert(*node, Target { margin, visible });
        state.pending.push(VisibilityEvent {
            node: *node,
            visible,
        });
    }

    fn unobserve(&mut self, node: &NodeId) {
        if let Some(state) = self.intersections.as_mut() {
            state.targets.remove(node);
            state.pending.retain(|e| e.node != *node);
        }
    }

    fn disconnect(&mut self) {
        if let Some(state) = self.intersections.as_mut() {
            state.targets.clear();
            state.pending.clear();
        }
    }
}

impl SizeNotifier for SimHost {
    fn watch(&mut self, node: &NodeId) -> Option<WatchId> {
        let id = WatchId(self.next_watch);
        self.next_watch += 1;
        self.watches.insert(id, *node);
        Some(id)
    }

    fn unwatch(&mut self, id: WatchId) {
        self.watches.remove(&id);
    }
}

impl TreeNotifier for SimHost {
    fn subscribe(&mut self, scope: &NodeId) {
        self.subscribed = Some(*scope);
        self.doc.set_recording(true);
    }

    fn unsubscribe(&mut self) {
        self.subscribed = None;
        self.doc.set_recording(false);
    }
}
