use core::fmt;

/// Stable synthetic identity assigned to a block on first discovery.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BlockId(pub(crate) u64);

impl BlockId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Handle of a size-change subscription issued by the host.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct WatchId(pub u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BlockState {
    Materialized,
    Unloaded,
}

/// Vertical extent of a node in document coordinates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Extent {
    pub top: u64,
    pub height: u32,
}

impl Extent {
    pub fn bottom(&self) -> u64 {
        self.top.saturating_add(self.height as u64)
    }

    /// Edge-adjacent extents count as intersecting.
    pub fn intersects(&self, band: Band) -> bool {
        self.bottom() >= band.start && self.top <= band.end
    }
}

/// The visible region of the page: scroll offset plus viewport height.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Viewport {
    pub scroll_top: u64,
    pub height: u32,
}

impl Viewport {
    pub fn bottom(&self) -> u64 {
        self.scroll_top.saturating_add(self.height as u64)
    }

    /// The visible region widened by `margin` on each side.
    pub fn band(&self, margin: Margin) -> Band {
        Band {
            start: self.scroll_top.saturating_sub(margin.top as u64),
            end: self.bottom().saturating_add(margin.bottom as u64),
        }
    }
}

/// Pixel margins above and below the visible region.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Margin {
    pub top: u32,
    pub bottom: u32,
}

/// A closed vertical interval `[start, end]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Band {
    pub start: u64,
    pub end: u64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TrackingModeKind {
    #[default]
    Inactive,
    EventDriven,
    Polling,
}

/// A block entered or left the margin-widened visible region.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VisibilityEvent<N> {
    pub node: N,
    pub visible: bool,
}

/// One structural change record: children added to / removed from `target`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TreeChange<N> {
    pub target: N,
    pub added: Vec<N>,
    pub removed: Vec<N>,
}

/// Author role of a block.
///
/// `Unknown` is returned whenever the rule set cannot decide; it is never folded into
/// one of the other two.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Role {
    User,
    Assistant,
    #[default]
    Unknown,
}

impl Role {
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "user" => Self::User,
            "assistant" => Self::Assistant,
            _ => Self::Unknown,
        }
    }
}

/// A read-only snapshot of engine state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Diagnostics {
    pub tracked: usize,
    pub unloaded: usize,
    pub mode: TrackingModeKind,
    pub cache_len: usize,
    pub cache_capacity: usize,
    /// Live size watchers held by unloaded blocks.
    pub watchers: usize,
    /// Unloaded blocks that still own their detached children.
    pub detached: usize,
    pub enabled: bool,
}

/// Counter/tree agreement check.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StateSync {
    pub counter: usize,
    pub flagged_in_tree: usize,
}

impl StateSync {
    pub fn is_synchronized(&self) -> bool {
        self.counter == self.flagged_in_tree
    }
}
