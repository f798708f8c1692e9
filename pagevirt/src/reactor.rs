use crate::engine::Engine;
use crate::{Host, NodeHandle, Result, TrackingModeKind, TreeChange};

/// Coalesces qualifying tree-change batches into a single flush per scheduling tick.
#[derive(Debug)]
pub(crate) struct Reactor<N> {
    subscribed: bool,
    /// `Some` while a flush is scheduled; holds every removed node seen since.
    pending: Option<Vec<N>>,
}

impl<N> Reactor<N> {
    pub(crate) fn new() -> Self {
        Self {
            subscribed: false,
            pending: None,
        }
    }
}

impl<N: NodeHandle> Engine<N> {
    /// Subscribes to tree changes for the whole document and activates tracking.
    pub fn attach<H: Host<Node = N>>(
        &mut self,
        host: &mut H,
        now_ms: u64,
    ) -> Result<TrackingModeKind> {
        if !self.reactor.subscribed {
            let root = host.document_root();
            host.subscribe(&root);
            self.reactor.subscribed = true;
        }
        self.activate(host, now_ms)
    }

    pub(crate) fn detach_reactor<H: Host<Node = N>>(&mut self, host: &mut H) {
        if self.reactor.subscribed {
            host.unsubscribe();
            self.reactor.subscribed = false;
        }
        self.reactor.pending = None;
    }

    /// Whether a flush is scheduled for the next [`Engine::on_frame`].
    pub fn has_pending_flush(&self) -> bool {
        self.reactor.pending.is_some()
    }

    /// A batch of structural changes from the host.
    ///
    /// Records whose target is a tracked block are the engine's own swaps (or host edits inside
    /// an existing block) and never qualify a batch by themselves. A batch qualifies when an
    /// added or removed node is, or contains, something the rule set matches, or when a removed
    /// node is itself tracked. Returns `true` when a flush is (or already was) scheduled.
    pub fn on_tree_changes<H: Host<Node = N>>(
        &mut self,
        host: &mut H,
        changes: &[TreeChange<N>],
    ) -> bool {
        let qualifies = changes.iter().any(|change| {
            if self.store.id_of(&change.target).is_some() {
                return false;
            }
            change.removed.iter().any(|n| self.store.id_of(n).is_some())
                || change
                    .added
                    .iter()
                    .chain(change.removed.iter())
                    .any(|n| self.discovery.touches(&*host, n))
        });
        if !qualifies {
            return self.reactor.pending.is_some();
        }

        let pending = self.reactor.pending.get_or_insert_with(Vec::new);
        for change in changes {
            pending.extend(change.removed.iter().cloned());
        }
        vtrace!(pending = pending.len(), "on_tree_changes: flush scheduled");
        true
    }

    /// The single flush point for coalesced tree changes; call once per rendering frame.
    ///
    /// Removed blocks are released before discovery runs again, so a block is never both
    /// removed and freshly tracked in the same pass. Returns `Ok(false)` when nothing was
    /// pending.
    pub fn on_frame<H: Host<Node = N>>(&mut self, host: &mut H, now_ms: u64) -> Result<bool> {
        let Some(removed) = self.reactor.pending.take() else {
            return Ok(false);
        };

        for node in &removed {
            for block in self.discovery.matching_within(&*host, node) {
                if self.store.id_of(&block).is_none() {
                    host.unobserve(&block);
                }
            }
        }

        let gone: Vec<_> = self
            .store
            .records()
            .filter(|(_, r)| !host.is_connected(&r.node))
            .map(|(id, _)| *id)
            .collect();
        for id in gone {
            self.release(host, id);
        }
        vdebug!(removed = removed.len(), "on_frame: released removed blocks");

        self.activate(host, now_ms)?;
        Ok(true)
    }
}
