use std::collections::HashMap;

use crate::{BlockId, BlockState, NodeHandle, WatchId};

/// Everything a block owns while it is unloaded.
///
/// The detached children and size watcher live only inside this variant, so they exist iff
/// the block is unloaded.
#[derive(Debug)]
pub(crate) struct Unloaded<N> {
    /// `None` when the block was adopted in the unloaded state (host re-render) or the
    /// children were otherwise lost.
    pub(crate) children: Option<Vec<N>>,
    pub(crate) placeholder: Option<N>,
    pub(crate) placeholder_height: u32,
    pub(crate) watcher: Option<WatchId>,
}

#[derive(Debug)]
pub(crate) enum Residency<N> {
    Materialized,
    Unloaded(Unloaded<N>),
}

#[derive(Debug)]
pub(crate) struct BlockRecord<N> {
    pub(crate) node: N,
    pub(crate) residency: Residency<N>,
}

impl<N> BlockRecord<N> {
    pub(crate) fn state(&self) -> BlockState {
        match self.residency {
            Residency::Materialized => BlockState::Materialized,
            Residency::Unloaded(_) => BlockState::Unloaded,
        }
    }

    pub(crate) fn unloaded(&self) -> Option<&Unloaded<N>> {
        match &self.residency {
            Residency::Unloaded(u) => Some(u),
            Residency::Materialized => None,
        }
    }

    pub(crate) fn unloaded_mut(&mut self) -> Option<&mut Unloaded<N>> {
        match &mut self.residency {
            Residency::Unloaded(u) => Some(u),
            Residency::Materialized => None,
        }
    }
}

/// Arena of tracked blocks keyed by synthetic id.
///
/// Records are only ever removed explicitly (on the tree-change path or at shutdown), which
/// keeps leak-freedom observable through [`BlockStore::len`] and friends.
#[derive(Debug)]
pub(crate) struct BlockStore<N> {
    next_id: u64,
    ids: HashMap<N, BlockId>,
    records: HashMap<BlockId, BlockRecord<N>>,
}

impl<N: NodeHandle> BlockStore<N> {
    pub(crate) fn new() -> Self {
        Self {
            next_id: 1,
            ids: HashMap::new(),
            records: HashMap::new(),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }

    pub(crate) fn id_of(&self, node: &N) -> Option<BlockId> {
        self.ids.get(node).copied()
    }

    /// Returns the id for `node`, registering it if needed. The flag is `true` for new records.
    pub(crate) fn insert(
        &mut self,
        node: &N,
        residency: impl FnOnce() -> Residency<N>,
    ) -> (BlockId, bool) {
        if let Some(&id) = self.ids.get(node) {
            return (id, false);
        }
        let id = BlockId(self.next_id);
        self.next_id += 1;
        self.ids.insert(node.clone(), id);
        self.records.insert(
            id,
            BlockRecord {
                node: node.clone(),
                residency: residency(),
            },
        );
        (id, true)
    }

    pub(crate) fn get(&self, id: BlockId) -> Option<&BlockRecord<N>> {
        self.records.get(&id)
    }

    pub(crate) fn get_mut(&mut self, id: BlockId) -> Option<&mut BlockRecord<N>> {
        self.records.get_mut(&id)
    }

    pub(crate) fn remove(&mut self, id: BlockId) -> Option<BlockRecord<N>> {
        let record = self.records.remove(&id)?;
        self.ids.remove(&record.node);
        Some(record)
    }

    pub(crate) fn ids(&self) -> Vec<BlockId> {
        let mut ids: Vec<_> = self.records.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub(crate) fn unloaded_ids(&self) -> Vec<BlockId> {
        let mut ids: Vec<_> = self
            .records
            .iter()
            .filter(|(_, r)| r.unloaded().is_some())
            .map(|(id, _)| *id)
            .collect();
        ids.sort_unstable();
        ids
    }

    pub(crate) fn records(&self) -> impl Iterator<Item = (&BlockId, &BlockRecord<N>)> {
        self.records.iter()
    }

    pub(crate) fn watcher_count(&self) -> usize {
        self.records
            .values()
            .filter(|r| r.unloaded().is_some_and(|u| u.watcher.is_some()))
            .count()
    }

    pub(crate) fn detached_count(&self) -> usize {
        self.records
            .values()
            .filter(|r| r.unloaded().is_some_and(|u| u.children.is_some()))
            .count()
    }
}
