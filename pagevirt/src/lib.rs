//! A headless engine that keeps very long chat pages responsive.
//!
//! Message blocks that scroll out of a margin-widened viewport are *unloaded*: their children
//! are detached and held aside, and a placeholder of the same height takes their place so
//! the scroll geometry never moves. Blocks coming back into range are *restored* with the
//! exact nodes that were removed.
//!
//! The engine is host-agnostic. A host (a browser binding, a test harness, the bundled
//! [`sim::SimHost`]) provides:
//! - the page tree, structural rules and geometry ([`PageTree`])
//! - an event-driven visibility notifier ([`VisibilityNotifier`]), optional at runtime
//! - per-node size watches ([`SizeNotifier`]) and structural change batches ([`TreeNotifier`])
//!
//! and drives the engine via its `on_*` entry points. When the event-driven notifier is
//! unavailable the engine falls back to geometry polling.
//!
//! A persisted on/off toggle and the "restore everything, read, put it back" bulk extraction
//! workflow live in the `pagevirt-adapter` crate.
#![forbid(unsafe_code)]

#[macro_use]
mod macros;

mod discovery;
mod engine;
mod error;
mod extract;
mod handle;
mod host;
mod options;
mod reactor;
mod recall;
mod rules;
mod store;
mod timer;
mod tracking;
mod transitions;
mod types;

pub mod dom;
pub mod sim;

#[cfg(test)]
mod tests;

pub use discovery::Discovery;
pub use engine::Engine;
pub use error::{Error, Result, RuleFailure};
pub use handle::NodeHandle;
pub use host::{Host, PageTree, SizeNotifier, TreeNotifier, VisibilityNotifier};
pub use options::{
    DEFAULT_MARGIN, DEFAULT_MIN_PLACEHOLDER_HEIGHT, DEFAULT_POLL_INTERVAL_MS,
    DEFAULT_RECALL_CAPACITY, EngineOptions,
};
pub use recall::{RecallCache, ReleaseHook};
pub use rules::{RoleRule, RuleSet};
pub use timer::IntervalTimer;
pub use types::{
    Band, BlockId, BlockState, Diagnostics, Extent, Margin, Role, StateSync, TrackingModeKind,
    TreeChange, Viewport, VisibilityEvent, WatchId,
};
