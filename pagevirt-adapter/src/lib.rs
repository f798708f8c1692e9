//! Adapter workflows for the `pagevirt` engine.
//!
//! The `pagevirt` crate is host-agnostic and focuses on block state and visibility tracking.
//! This crate provides the workflows an integration builds on top of it:
//!
//! - A persisted on/off toggle (JSON boolean under [`ENABLED_KEY`])
//! - Page background/foreground handling
//! - Bulk extraction for copy/export: restore everything, wait two frames, read, put the
//!   prior mode back
//! - Best-effort delivery to clipboard/file sinks
#![forbid(unsafe_code)]

#[macro_use]
mod macros;

mod controller;
mod export;
mod frames;
mod persist;

#[cfg(test)]
mod tests;

pub use controller::Controller;
pub use export::{ExportSink, ExtractedBlock, MemorySink, SinkError, deliver};
pub use frames::{FrameSource, YieldingFrames};
pub use persist::{
    ENABLED_KEY, FlagStore, MemoryFlagStore, StoreError, load_enabled, save_enabled,
};
