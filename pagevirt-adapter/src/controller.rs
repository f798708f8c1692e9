use pagevirt::{
    Diagnostics, Engine, EngineOptions, Host, NodeHandle, Result, RuleSet, TrackingModeKind,
};

use crate::export::{ExportSink, ExtractedBlock, deliver};
use crate::frames::FrameSource;
use crate::persist::{FlagStore, load_enabled, save_enabled};

/// A host-neutral controller that wraps a [`pagevirt::Engine`] and provides the workflows an
/// integration needs on top of it (persisted toggle, page lifecycle, bulk extraction).
///
/// This type holds no host objects. Integrations drive it by calling:
/// - `attach` once the page is ready
/// - `toggle` / `set_enabled` from user actions
/// - `on_page_hidden` / `on_page_visible` on page lifecycle changes
/// - `extract_all` / `export` for copy and download
///
/// Everything else (visibility events, tree changes, ticks) goes straight to
/// [`Controller::engine_mut`].
#[derive(Debug)]
pub struct Controller<N, S> {
    engine: Engine<N>,
    store: S,
}

impl<N: NodeHandle, S: FlagStore> Controller<N, S> {
    /// Creates a controller. A persisted toggle overrides `options.enabled`.
    pub fn new(options: EngineOptions, rules: RuleSet, store: S) -> Self {
        let options = match load_enabled(&store) {
            Some(enabled) => options.with_enabled(enabled),
            None => options,
        };
        Self {
            engine: Engine::new(options, rules),
            store,
        }
    }

    pub fn from_engine(engine: Engine<N>, store: S) -> Self {
        Self { engine, store }
    }

    pub fn engine(&self) -> &Engine<N> {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut Engine<N> {
        &mut self.engine
    }

    pub fn into_engine(self) -> Engine<N> {
        self.engine
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn is_enabled(&self) -> bool {
        self.engine.is_enabled()
    }

    pub fn snapshot(&self) -> Diagnostics {
        self.engine.snapshot()
    }

    pub fn attach<H: Host<Node = N>>(
        &mut self,
        host: &mut H,
        now_ms: u64,
    ) -> Result<TrackingModeKind> {
        self.engine.attach(host, now_ms)
    }

    /// Turns virtualization on or off and persists the choice. A failed write is logged and
    /// does not affect the engine.
    pub fn set_enabled<H: Host<Node = N>>(
        &mut self,
        host: &mut H,
        enabled: bool,
        now_ms: u64,
    ) -> Result<TrackingModeKind> {
        save_enabled(&mut self.store, enabled);
        self.engine.set_enabled(host, enabled, now_ms)
    }

    /// Flips the toggle. Returns the new state.
    pub fn toggle<H: Host<Node = N>>(&mut self, host: &mut H, now_ms: u64) -> Result<bool> {
        let enabled = !self.engine.is_enabled();
        self.set_enabled(host, enabled, now_ms)?;
        adebug!(enabled, "Controller::toggle");
        Ok(enabled)
    }

    pub fn on_page_hidden<H: Host<Node = N>>(&mut self, host: &mut H) {
        self.engine.on_page_hidden(host);
    }

    pub fn on_page_visible<H: Host<Node = N>>(
        &mut self,
        host: &mut H,
        now_ms: u64,
    ) -> Result<TrackingModeKind> {
        self.engine.on_page_visible(host, now_ms)
    }

    /// Reads every block with all content materialized.
    ///
    /// Virtualization is switched off (restoring every block), the page gets two frames to
    /// settle, then each block is read. The prior toggle state is put back afterwards whether
    /// or not the read succeeded; the persisted toggle is never touched.
    pub async fn extract_all<H, F>(
        &mut self,
        host: &mut H,
        frames: &mut F,
        now_ms: u64,
    ) -> Result<Vec<ExtractedBlock>>
    where
        H: Host<Node = N>,
        F: FrameSource,
    {
        let was_enabled = self.engine.is_enabled();
        self.engine.set_enabled(host, false, now_ms)?;

        frames.next_frame().await;
        frames.next_frame().await;

        let read = self.read_blocks(host);

        if was_enabled {
            if let Err(_err) = self.engine.set_enabled(host, true, now_ms) {
                awarn!(error = %_err, "extract_all: re-enabling virtualization failed");
            }
        }
        adebug!(ok = read.is_ok(), was_enabled, "extract_all: done");
        read
    }

    fn read_blocks<H: Host<Node = N>>(&mut self, host: &mut H) -> Result<Vec<ExtractedBlock>> {
        let blocks = self.engine.find_blocks(&*host)?;
        let mut out = Vec::with_capacity(blocks.len());
        for block in &blocks {
            let role = self.engine.classify(&*host, block);
            let html = self.engine.extract_html(host, block);
            out.push(ExtractedBlock { role, html });
        }
        Ok(out)
    }

    /// [`Controller::extract_all`] followed by a best-effort delivery to `sink`.
    ///
    /// Returns whether the sink accepted the export. Sink failures never change engine state.
    pub async fn export<H, F, K>(
        &mut self,
        host: &mut H,
        frames: &mut F,
        sink: &mut K,
        now_ms: u64,
    ) -> Result<bool>
    where
        H: Host<Node = N>,
        F: FrameSource,
        K: ExportSink,
    {
        let blocks = self.extract_all(host, frames, now_ms).await?;
        Ok(deliver(sink, &blocks).await)
    }

    /// Restores every block and releases every engine resource.
    pub fn shutdown<H: Host<Node = N>>(&mut self, host: &mut H) {
        self.engine.shutdown(host);
    }
}
