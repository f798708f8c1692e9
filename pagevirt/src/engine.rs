use crate::discovery::Discovery;
use crate::reactor::Reactor;
use crate::store::BlockStore;
use crate::tracking::TrackingMode;
use crate::{
    BlockId, BlockState, Diagnostics, EngineOptions, Host, NodeHandle, PageTree, RecallCache,
    Result, Role, RuleSet, StateSync,
};

/// Engine-wide state shared by every component.
#[derive(Debug)]
pub(crate) struct Context {
    pub(crate) options: EngineOptions,
    pub(crate) enabled: bool,
    pub(crate) page_hidden: bool,
    /// Set once the event-driven notifier is found missing; polling is used for the rest of
    /// the session.
    pub(crate) event_driven_unavailable: bool,
    pub(crate) unloaded_count: usize,
    pub(crate) logged_unload: bool,
    pub(crate) logged_restore: bool,
}

impl Context {
    fn new(options: EngineOptions) -> Self {
        Self {
            enabled: options.enabled,
            options,
            page_hidden: false,
            event_driven_unavailable: false,
            unloaded_count: 0,
            logged_unload: false,
            logged_restore: false,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct DelayedRestore {
    pub(crate) due_ms: u64,
    pub(crate) id: BlockId,
}

/// The virtualization and observation engine.
///
/// This type is host-agnostic:
/// - It holds node handles, never host objects.
/// - Your host drives it with events (`on_visibility`, `on_tree_changes`, `on_frame`,
///   `on_tick`, `on_scroll`, `on_size_change`, page lifecycle) and passes itself by `&mut`.
/// - Every block it touches is tracked under a synthetic [`BlockId`] until the host removes the
///   block or the engine shuts down.
///
/// For the persisted toggle and the bulk-extraction workflow, see the `pagevirt-adapter` crate.
#[derive(Debug)]
pub struct Engine<N> {
    pub(crate) cx: Context,
    pub(crate) discovery: Discovery,
    pub(crate) store: BlockStore<N>,
    pub(crate) recall: RecallCache<BlockId, String>,
    pub(crate) mode: TrackingMode,
    pub(crate) reactor: Reactor<N>,
    pub(crate) delayed: Vec<DelayedRestore>,
}

impl<N: NodeHandle> Engine<N> {
    /// Creates an engine. Invalid numeric options are reset to their defaults.
    pub fn new(options: EngineOptions, rules: RuleSet) -> Self {
        let cx = Context::new(options.sanitized());
        vdebug!(
            rules = rules.selectors.len(),
            enabled = cx.enabled,
            recall_capacity = cx.options.recall_capacity,
            "Engine::new"
        );
        Self {
            discovery: Discovery::new(cx.options.content_roots.clone(), rules),
            store: BlockStore::new(),
            recall: RecallCache::new(cx.options.recall_capacity),
            mode: TrackingMode::Inactive,
            reactor: Reactor::new(),
            delayed: Vec::new(),
            cx,
        }
    }

    pub fn options(&self) -> &EngineOptions {
        &self.cx.options
    }

    pub fn rules(&self) -> &RuleSet {
        self.discovery.rules()
    }

    pub fn is_enabled(&self) -> bool {
        self.cx.enabled
    }

    /// Sets the artificial restore delay used by event-driven restores.
    pub fn set_restore_delay_ms(&mut self, delay_ms: u64) {
        self.cx.options.restore_delay_ms = delay_ms;
    }

    /// Runs discovery without tracking anything.
    pub fn find_blocks<T: PageTree<Node = N>>(&self, tree: &T) -> Result<Vec<N>> {
        self.discovery.find_blocks(tree)
    }

    pub fn block_id(&self, node: &N) -> Option<BlockId> {
        self.store.id_of(node)
    }

    pub fn state(&self, node: &N) -> Option<BlockState> {
        let id = self.store.id_of(node)?;
        self.store.get(id).map(|r| r.state())
    }

    pub fn is_unloaded(&self, node: &N) -> bool {
        self.state(node) == Some(BlockState::Unloaded)
    }

    /// Height of the placeholder currently standing in for `node`, if unloaded.
    pub fn placeholder_height(&self, node: &N) -> Option<u32> {
        let id = self.store.id_of(node)?;
        let unloaded = self.store.get(id)?.unloaded()?;
        unloaded.placeholder.as_ref()?;
        Some(unloaded.placeholder_height)
    }

    pub fn classify<T: PageTree<Node = N>>(&self, tree: &T, node: &N) -> Role {
        self.discovery.rules().classify(tree, node)
    }

    pub fn recall_cache(&self) -> &RecallCache<BlockId, String> {
        &self.recall
    }

    pub fn snapshot(&self) -> Diagnostics {
        Diagnostics {
            tracked: self.store.len(),
            unloaded: self.cx.unloaded_count,
            mode: self.mode.kind(),
            cache_len: self.recall.len(),
            cache_capacity: self.recall.capacity(),
            watchers: self.store.watcher_count(),
            detached: self.store.detached_count(),
            enabled: self.cx.enabled,
        }
    }

    /// Compares the unloaded counter against the flags actually present in the tree.
    pub fn check_state_sync<T: PageTree<Node = N>>(&self, tree: &T) -> StateSync {
        let flagged_in_tree = self
            .store
            .records()
            .filter(|(_, r)| tree.is_connected(&r.node) && tree.is_flagged(&r.node))
            .count();
        StateSync {
            counter: self.cx.unloaded_count,
            flagged_in_tree,
        }
    }

    /// Stops everything and releases every record.
    ///
    /// Unloaded blocks are restored first so no content is left hidden.
    pub fn shutdown<H: Host<Node = N>>(&mut self, host: &mut H) {
        self.restore_all(host);
        self.detach_reactor(host);
        self.switch_mode(host, TrackingMode::Inactive);
        for id in self.store.ids() {
            self.release(host, id);
        }
        self.recall.clear();
        self.delayed.clear();
        self.cx.unloaded_count = 0;
        vdebug!("Engine::shutdown: all resources released");
    }
}
