use core::mem;
use std::collections::HashSet;

use crate::engine::Engine;
use crate::store::{Residency, Unloaded};
use crate::{BlockId, Host, NodeHandle, PageTree};

impl<N: NodeHandle> Engine<N> {
    /// Registers `node` as a block, returning its id.
    ///
    /// A node first seen while already carrying the unloaded flag (e.g. re-rendered by the host
    /// with its attributes copied) is adopted as unloaded with no stored children.
    pub(crate) fn track<T: PageTree<Node = N>>(&mut self, tree: &T, node: &N) -> BlockId {
        let flagged = tree.is_flagged(node);
        let height = if flagged { tree.measure_height(node) } else { 0 };
        let (id, created) = self.store.insert(node, || {
            if flagged {
                Residency::Unloaded(Unloaded {
                    children: None,
                    placeholder: None,
                    placeholder_height: height,
                    watcher: None,
                })
            } else {
                Residency::Materialized
            }
        });
        if created && flagged {
            vdebug!(block = %id, "track: adopted a block that was already unloaded");
            self.cx.unloaded_count += 1;
        }
        id
    }

    /// Replaces the content of `node` with a height-preserving placeholder.
    ///
    /// Returns `false` when the block was already unloaded.
    pub fn unload<H: Host<Node = N>>(&mut self, host: &mut H, node: &N) -> bool {
        let id = self.track(&*host, node);
        self.unload_id(host, id)
    }

    pub(crate) fn unload_id<H: Host<Node = N>>(&mut self, host: &mut H, id: BlockId) -> bool {
        let Some(record) = self.store.get(id) else {
            return false;
        };
        if record.unloaded().is_some() {
            return false;
        }
        let node = record.node.clone();

        self.recall.set(id, host.inner_html(&node));

        let measured = host.measure_height(&node);
        let height = if measured == 0 {
            self.cx.options.min_placeholder_height
        } else {
            measured
        };
        let children = host.take_children(&node);
        let placeholder = host.create_placeholder(height);
        host.append_children(&node, vec![placeholder.clone()]);
        host.set_flagged(&node, true);
        let watcher = host.watch(&node);

        if let Some(record) = self.store.get_mut(id) {
            record.residency = Residency::Unloaded(Unloaded {
                children: Some(children),
                placeholder: Some(placeholder),
                placeholder_height: height,
                watcher,
            });
        }
        self.cx.unloaded_count += 1;

        if !self.cx.logged_unload {
            self.cx.logged_unload = true;
            vdebug!(block = %id, height, "unload: first block unloaded");
        }
        vtrace!(block = %id, height, "unload");
        true
    }

    /// Puts the original children of `node` back in place of its placeholder.
    ///
    /// Returns `false` when the block was not unloaded (or is not tracked).
    pub fn restore<H: Host<Node = N>>(&mut self, host: &mut H, node: &N) -> bool {
        match self.store.id_of(node) {
            Some(id) => self.restore_id(host, id),
            None => false,
        }
    }

    pub(crate) fn restore_id<H: Host<Node = N>>(&mut self, host: &mut H, id: BlockId) -> bool {
        let Some(record) = self.store.get_mut(id) else {
            return false;
        };
        let residency = mem::replace(&mut record.residency, Residency::Materialized);
        let Residency::Unloaded(parts) = residency else {
            return false;
        };
        let node = record.node.clone();

        if let Some(watcher) = parts.watcher {
            host.unwatch(watcher);
        }

        match parts.children {
            Some(children) => {
                let current = host.take_children(&node);
                host.discard(current);
                host.append_children(&node, children);
            }
            None => {
                // Children were lost: keep whatever the host rendered, drop only our placeholder.
                if let Some(placeholder) = parts.placeholder {
                    let current = host.take_children(&node);
                    let (ours, kept): (Vec<_>, Vec<_>) =
                        current.into_iter().partition(|c| *c == placeholder);
                    host.discard(ours);
                    host.append_children(&node, kept);
                }
            }
        }
        host.set_flagged(&node, false);
        self.cx.unloaded_count = self.cx.unloaded_count.saturating_sub(1);

        if !self.cx.logged_restore {
            self.cx.logged_restore = true;
            vdebug!(block = %id, "restore: first block restored");
        }
        vtrace!(block = %id, "restore");
        true
    }

    /// Restores every tracked unloaded block. Returns how many were restored.
    pub fn restore_all<H: Host<Node = N>>(&mut self, host: &mut H) -> usize {
        let mut restored = 0;
        for id in self.store.unloaded_ids() {
            if self.restore_id(host, id) {
                restored += 1;
            }
        }
        if restored > 0 {
            vdebug!(restored, "restore_all");
        }
        restored
    }

    /// Size-change notification for a watched block. Keeps the placeholder height equal to the
    /// block's live height while it stays unloaded.
    pub fn on_size_change<H: Host<Node = N>>(&mut self, host: &mut H, node: &N, height: u32) {
        let min = self.cx.options.min_placeholder_height;
        let Some(id) = self.store.id_of(node) else {
            return;
        };
        let Some(unloaded) = self.store.get_mut(id).and_then(|r| r.unloaded_mut()) else {
            return;
        };
        let Some(placeholder) = unloaded.placeholder.as_ref() else {
            return;
        };
        let height = if height == 0 { min } else { height };
        if unloaded.placeholder_height != height {
            host.set_placeholder_height(placeholder, height);
            unloaded.placeholder_height = height;
            vtrace!(block = %id, height, "on_size_change: placeholder resized");
        }
    }

    /// Drops every record derived from block `id`: registration, size watcher, recall entry
    /// and pending restores.
    ///
    /// Stored children are handed back to the node first, so the block never stays hidden if
    /// the host puts it back into the tree.
    pub(crate) fn release<H: Host<Node = N>>(&mut self, host: &mut H, id: BlockId) {
        self.restore_id(host, id);
        let Some(record) = self.store.remove(id) else {
            return;
        };
        host.unobserve(&record.node);
        self.recall.delete(&id);
        self.delayed.retain(|d| d.id != id);
        vtrace!(block = %id, "release");
    }

    /// Releases tracked blocks that discovery no longer reports because a newly matched
    /// ancestor in `blocks` now contains them.
    ///
    /// Each one is restored first, so the ancestor owns its full content before it can be
    /// unloaded itself.
    pub(crate) fn absorb_nested<H: Host<Node = N>>(&mut self, host: &mut H, blocks: &[N]) {
        let found: HashSet<&N> = blocks.iter().collect();
        let nested: Vec<BlockId> = self
            .store
            .records()
            .filter(|(_, r)| !found.contains(&r.node))
            .filter(|(_, r)| {
                let mut up = host.parent(&r.node);
                while let Some(p) = up {
                    if found.contains(&p) {
                        return true;
                    }
                    up = host.parent(&p);
                }
                false
            })
            .map(|(id, _)| *id)
            .collect();
        for id in nested {
            vdebug!(block = %id, "absorb_nested: block now inside another block");
            self.release(host, id);
        }
    }
}
