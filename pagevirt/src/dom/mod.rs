//! An in-memory page tree.
//!
//! `Document` is an arena of element and text nodes with a block-flow layout model: a node's
//! height is its fixed height, else its intrinsic height, else the sum of its children's
//! heights, and nodes stack vertically in document order. It implements [`PageTree`] and
//! records structural changes while recording is on, so it can stand in for a live page.

mod selector;

pub use selector::Selector;

use crate::{Extent, PageTree, Result, TreeChange, Viewport};

/// Attribute carrying the "unloaded" flag on a block.
pub const UNLOADED_ATTR: &str = "data-pagevirt-unloaded";
/// Class of the placeholder element standing in for an unloaded block's content.
pub const PLACEHOLDER_CLASS: &str = "pagevirt-placeholder";
pub const PLACEHOLDER_TEXT: &str = "[Message hidden]";

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Clone, Debug)]
enum NodeKind {
    Document,
    Element {
        tag: String,
        attrs: Vec<(String, String)>,
    },
    Text(String),
}

#[derive(Clone, Debug)]
struct NodeData {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    intrinsic_height: Option<u32>,
    fixed_height: Option<u32>,
    hidden: bool,
}

impl NodeData {
    fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            parent: None,
            children: Vec::new(),
            intrinsic_height: None,
            fixed_height: None,
            hidden: false,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Document {
    nodes: Vec<Option<NodeData>>,
    root: NodeId,
    viewport: Viewport,
    recording: bool,
    records: Vec<TreeChange<NodeId>>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    pub fn new() -> Self {
        Self {
            nodes: vec![Some(NodeData::new(NodeKind::Document))],
            root: NodeId(0),
            viewport: Viewport {
                scroll_top: 0,
                height: 800,
            },
            recording: false,
            records: Vec::new(),
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    fn data(&self, node: NodeId) -> Option<&NodeData> {
        self.nodes.get(node.index()).and_then(Option::as_ref)
    }

    fn data_mut(&mut self, node: NodeId) -> Option<&mut NodeData> {
        self.nodes.get_mut(node.index()).and_then(Option::as_mut)
    }

    fn alloc(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Some(NodeData::new(kind)));
        id
    }

    /// Whether `node` exists in the arena (attached or not).
    pub fn exists(&self, node: NodeId) -> bool {
        self.data(node).is_some()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_some()).count()
    }

    pub fn create_element(&mut self, tag: &str) -> NodeId {
        self.alloc(NodeKind::Element {
            tag: tag.to_ascii_lowercase(),
            attrs: Vec::new(),
        })
    }

    pub fn create_text(&mut self, text: &str) -> NodeId {
        self.alloc(NodeKind::Text(text.to_owned()))
    }

    pub fn tag(&self, node: NodeId) -> Option<&str> {
        match &self.data(node)?.kind {
            NodeKind::Element { tag, .. } => Some(tag),
            _ => None,
        }
    }

    pub fn text(&self, node: NodeId) -> Option<&str> {
        match &self.data(node)?.kind {
            NodeKind::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn attribute(&self, node: NodeId, name: &str) -> Option<&str> {
        match &self.data(node)?.kind {
            NodeKind::Element { attrs, .. } => attrs
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| v.as_str()),
            _ => None,
        }
    }

    pub fn set_attribute(&mut self, node: NodeId, name: &str, value: &str) {
        let Some(NodeKind::Element { attrs, .. }) = self.data_mut(node).map(|d| &mut d.kind) else {
            return;
        };
        match attrs.iter_mut().find(|(k, _)| k.eq_ignore_ascii_case(name)) {
            Some((_, v)) => value.clone_into(v),
            None => attrs.push((name.to_ascii_lowercase(), value.to_owned())),
        }
    }

    pub fn remove_attribute(&mut self, node: NodeId, name: &str) {
        if let Some(NodeKind::Element { attrs, .. }) = self.data_mut(node).map(|d| &mut d.kind) {
            attrs.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        }
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.data(node)?.parent
    }

    pub fn children(&self, node: NodeId) -> &[NodeId] {
        self.data(node).map(|d| d.children.as_slice()).unwrap_or(&[])
    }

    pub fn is_connected(&self, node: NodeId) -> bool {
        let mut cur = Some(node);
        while let Some(n) = cur {
            if n == self.root {
                return self.exists(n);
            }
            cur = self.parent(n);
        }
        false
    }

    /// Whether `ancestor` is `node` or one of its ancestors.
    pub fn contains(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut cur = Some(node);
        while let Some(n) = cur {
            if n == ancestor {
                return true;
            }
            cur = self.parent(n);
        }
        false
    }

    fn record(&mut self, target: NodeId, added: Vec<NodeId>, removed: Vec<NodeId>) {
        if self.recording && (!added.is_empty() || !removed.is_empty()) {
            self.records.push(TreeChange {
                target,
                added,
                removed,
            });
        }
    }

    fn unlink(&mut self, node: NodeId) -> Option<NodeId> {
        let parent = self.parent(node)?;
        if let Some(p) = self.data_mut(parent) {
            p.children.retain(|c| *c != node);
        }
        if let Some(d) = self.data_mut(node) {
            d.parent = None;
        }
        Some(parent)
    }

    /// Detaches `node` from its parent. The node stays in the arena.
    pub fn detach(&mut self, node: NodeId) {
        if let Some(parent) = self.unlink(node) {
            self.record(parent, Vec::new(), vec![node]);
        }
    }

    /// Appends `child` to `parent`, moving it out of its current parent first.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        if !self.exists(parent) || !self.exists(child) || self.contains(child, parent) {
            return;
        }
        self.detach(child);
        if let Some(p) = self.data_mut(parent) {
            p.children.push(child);
        }
        if let Some(c) = self.data_mut(child) {
            c.parent = Some(parent);
        }
        self.record(parent, vec![child], Vec::new());
    }

    /// Puts `new` at the position of `old`; `old` is detached but kept in the arena.
    pub fn replace_child(&mut self, old: NodeId, new: NodeId) {
        let Some(parent) = self.parent(old) else {
            return;
        };
        if !self.exists(new) || self.contains(new, parent) {
            return;
        }
        self.detach(new);
        let Some(index) = self.children(parent).iter().position(|c| *c == old) else {
            return;
        };
        if let Some(p) = self.data_mut(parent) {
            p.children[index] = new;
        }
        if let Some(d) = self.data_mut(old) {
            d.parent = None;
        }
        if let Some(d) = self.data_mut(new) {
            d.parent = Some(parent);
        }
        self.record(parent, vec![new], vec![old]);
    }

    /// Frees `node` and its subtree. Freed ids are never reused.
    pub fn free(&mut self, node: NodeId) {
        self.unlink(node);
        let mut stack = vec![node];
        while let Some(n) = stack.pop() {
            if let Some(data) = self.nodes.get_mut(n.index()).and_then(Option::take) {
                stack.extend(data.children);
            }
        }
    }

    /// Sets the node's own content height, used when it has no fixed height.
    pub fn set_height(&mut self, node: NodeId, height: u32) {
        if let Some(d) = self.data_mut(node) {
            d.intrinsic_height = Some(height);
        }
    }

    /// Pins the node's height (like an inline style) and mirrors it in its `style` attribute.
    pub fn set_fixed_height(&mut self, node: NodeId, height: u32) {
        if let Some(d) = self.data_mut(node) {
            d.fixed_height = Some(height);
        }
        self.set_attribute(node, "style", &format!("height: {height}px"));
    }

    pub fn height(&self, node: NodeId) -> u32 {
        let Some(data) = self.data(node) else {
            return 0;
        };
        if let Some(h) = data.fixed_height.or(data.intrinsic_height) {
            return h;
        }
        data.children
            .iter()
            .fold(0u32, |acc, c| acc.saturating_add(self.height(*c)))
    }

    /// Document-space top offset.
    pub fn top(&self, node: NodeId) -> u64 {
        let Some(parent) = self.parent(node) else {
            return 0;
        };
        let before: u64 = self
            .children(parent)
            .iter()
            .take_while(|c| **c != node)
            .map(|c| self.height(*c) as u64)
            .sum();
        self.top(parent).saturating_add(before)
    }

    pub fn is_hidden(&self, node: NodeId) -> bool {
        self.data(node).is_some_and(|d| d.hidden)
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
    }

    /// Turns structural change recording on or off. Turning it off drops unread records.
    pub fn set_recording(&mut self, recording: bool) {
        self.recording = recording;
        if !recording {
            self.records.clear();
        }
    }

    pub fn take_records(&mut self) -> Vec<TreeChange<NodeId>> {
        core::mem::take(&mut self.records)
    }

    /// Every descendant of `scope` (excluding `scope`) in document order.
    pub fn descendants(&self, scope: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(scope).iter().rev().copied().collect();
        while let Some(n) = stack.pop() {
            out.push(n);
            stack.extend(self.children(n).iter().rev().copied());
        }
        out
    }

    pub fn select_all(&self, scope: NodeId, selector: &str) -> Result<Vec<NodeId>> {
        let selector = Selector::parse(selector)?;
        Ok(self
            .descendants(scope)
            .into_iter()
            .filter(|n| selector.matches(self, *n))
            .collect())
    }

    pub fn select_first(&self, scope: NodeId, selector: &str) -> Result<Option<NodeId>> {
        Ok(self.select_all(scope, selector)?.into_iter().next())
    }

    pub fn inner_html(&self, node: NodeId) -> String {
        let mut out = String::new();
        for child in self.children(node) {
            self.write_node(*child, &mut out);
        }
        out
    }

    pub fn outer_html(&self, node: NodeId) -> String {
        let mut out = String::new();
        self.write_node(node, &mut out);
        out
    }

    fn write_node(&self, node: NodeId, out: &mut String) {
        let Some(data) = self.data(node) else {
            return;
        };
        match &data.kind {
            NodeKind::Document => {
                for child in &data.children {
                    self.write_node(*child, out);
                }
            }
            NodeKind::Text(text) => escape_into(text, false, out),
            NodeKind::Element { tag, attrs } => {
                out.push('<');
                out.push_str(tag);
                for (name, value) in attrs {
                    out.push(' ');
                    out.push_str(name);
                    out.push_str("=\"");
                    escape_into(value, true, out);
                    out.push('"');
                }
                out.push('>');
                if VOID_ELEMENTS.contains(&tag.as_str()) {
                    return;
                }
                for child in &data.children {
                    self.write_node(*child, out);
                }
                out.push_str("</");
                out.push_str(tag);
                out.push('>');
            }
        }
    }

    /// Creates `<tag attrs…>` and appends it to `parent`.
    pub fn append_element(
        &mut self,
        parent: NodeId,
        tag: &str,
        attrs: &[(&str, &str)],
    ) -> NodeId {
        let el = self.create_element(tag);
        for (name, value) in attrs {
            self.set_attribute(el, name, value);
        }
        self.append_child(parent, el);
        el
    }

    pub fn append_text(&mut self, parent: NodeId, text: &str, height: u32) -> NodeId {
        let t = self.create_text(text);
        self.set_height(t, height);
        self.append_child(parent, t);
        t
    }
}

fn escape_into(text: &str, attribute: bool, out: &mut String) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' if !attribute => out.push_str("&lt;"),
            '>' if !attribute => out.push_str("&gt;"),
            '"' if attribute => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
}

impl PageTree for Document {
    type Node = NodeId;

    fn document_root(&self) -> NodeId {
        self.root
    }

    fn select_all(&self, scope: &NodeId, rule: &str) -> Result<Vec<NodeId>> {
        Document::select_all(self, *scope, rule)
    }

    fn matches(&self, node: &NodeId, rule: &str) -> Result<bool> {
        Ok(Selector::parse(rule)?.matches(self, *node))
    }

    fn parent(&self, node: &NodeId) -> Option<NodeId> {
        Document::parent(self, *node)
    }

    fn is_connected(&self, node: &NodeId) -> bool {
        Document::is_connected(self, *node)
    }

    fn attribute(&self, node: &NodeId, name: &str) -> Option<String> {
        Document::attribute(self, *node, name).map(str::to_owned)
    }

    fn is_flagged(&self, node: &NodeId) -> bool {
        Document::attribute(self, *node, UNLOADED_ATTR).is_some()
    }

    fn set_flagged(&mut self, node: &NodeId, flagged: bool) {
        if flagged {
            self.set_attribute(*node, UNLOADED_ATTR, "true");
        } else {
            self.remove_attribute(*node, UNLOADED_ATTR);
        }
    }

    fn take_children(&mut self, node: &NodeId) -> Vec<NodeId> {
        let Some(data) = self.data_mut(*node) else {
            return Vec::new();
        };
        let children = core::mem::take(&mut data.children);
        for child in &children {
            if let Some(d) = self.data_mut(*child) {
                d.parent = None;
            }
        }
        self.record(*node, Vec::new(), children.clone());
        children
    }

    fn append_children(&mut self, node: &NodeId, children: Vec<NodeId>) {
        if !self.exists(*node) {
            return;
        }
        let mut added = Vec::with_capacity(children.len());
        for child in children {
            if !self.exists(child) || self.contains(child, *node) {
                continue;
            }
            self.detach(child);
            if let Some(d) = self.data_mut(child) {
                d.parent = Some(*node);
            }
            if let Some(d) = self.data_mut(*node) {
                d.children.push(child);
            }
            added.push(child);
        }
        self.record(*node, added, Vec::new());
    }

    fn create_placeholder(&mut self, height: u32) -> NodeId {
        let el = self.create_element("div");
        self.set_attribute(el, "class", PLACEHOLDER_CLASS);
        self.set_fixed_height(el, height);
        let text = self.create_text(PLACEHOLDER_TEXT);
        if let Some(d) = self.data_mut(el) {
            d.children.push(text);
        }
        if let Some(d) = self.data_mut(text) {
            d.parent = Some(el);
        }
        el
    }

    fn set_placeholder_height(&mut self, placeholder: &NodeId, height: u32) {
        self.set_fixed_height(*placeholder, height);
    }

    fn discard(&mut self, nodes: Vec<NodeId>) {
        for node in nodes {
            self.free(node);
        }
    }

    fn measure_height(&self, node: &NodeId) -> u32 {
        self.height(*node)
    }

    fn extent(&self, node: &NodeId) -> Extent {
        Extent {
            top: self.top(*node),
            height: self.height(*node),
        }
    }

    fn viewport(&self) -> Viewport {
        self.viewport
    }

    fn set_hidden(&mut self, node: &NodeId, hidden: bool) -> bool {
        match self.data_mut(*node) {
            Some(d) => core::mem::replace(&mut d.hidden, hidden),
            None => false,
        }
    }

    fn inner_html(&self, node: &NodeId) -> String {
        Document::inner_html(self, *node)
    }

    fn fragment_html(&self, nodes: &[NodeId]) -> String {
        let mut out = String::new();
        for node in nodes {
            self.write_node(*node, &mut out);
        }
        out
    }
}
