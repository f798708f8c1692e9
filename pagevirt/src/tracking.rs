use core::mem;

use crate::engine::{DelayedRestore, Engine};
use crate::timer::IntervalTimer;
use crate::{Error, Host, Margin, NodeHandle, Result, TrackingModeKind, VisibilityEvent};

/// The single active visibility-tracking mechanism.
///
/// Only [`Engine::switch_mode`] assigns this value, and it always tears the previous mode down
/// first.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum TrackingMode {
    Inactive,
    EventDriven { margin: Margin },
    Polling { timer: IntervalTimer },
}

impl TrackingMode {
    pub(crate) fn kind(&self) -> TrackingModeKind {
        match self {
            Self::Inactive => TrackingModeKind::Inactive,
            Self::EventDriven { .. } => TrackingModeKind::EventDriven,
            Self::Polling { .. } => TrackingModeKind::Polling,
        }
    }
}

impl<N: NodeHandle> Engine<N> {
    pub fn mode(&self) -> TrackingModeKind {
        self.mode.kind()
    }

    pub(crate) fn switch_mode<H: Host<Node = N>>(&mut self, host: &mut H, next: TrackingMode) {
        match mem::replace(&mut self.mode, TrackingMode::Inactive) {
            TrackingMode::Inactive => {}
            TrackingMode::EventDriven { .. } => host.disconnect(),
            TrackingMode::Polling { mut timer } => timer.stop(),
        }
        vdebug!(mode = ?next.kind(), "switch_mode");
        self.mode = next;
    }

    fn margin_now<H: Host<Node = N>>(&self, host: &H) -> Margin {
        self.cx.options.margin_px(host.viewport().height)
    }

    /// Starts (or refreshes) visibility tracking.
    ///
    /// Event-driven tracking is tried first. When the notifier is unavailable, or discovery
    /// finds no blocks to observe, the polling fallback takes over. When virtualization is
    /// disabled the engine goes inactive.
    pub fn activate<H: Host<Node = N>>(
        &mut self,
        host: &mut H,
        now_ms: u64,
    ) -> Result<TrackingModeKind> {
        if !self.cx.enabled {
            self.switch_mode(host, TrackingMode::Inactive);
            return Ok(TrackingModeKind::Inactive);
        }

        let blocks = self.discovery.find_blocks(&*host)?;
        self.absorb_nested(host, &blocks);
        for block in &blocks {
            self.track(&*host, block);
        }

        if !self.cx.event_driven_unavailable && !host.is_available() {
            self.cx.event_driven_unavailable = true;
            let _err = Error::CapabilityUnavailable("visibility notifier");
            vwarn!(error = %_err, "activate: using polling for this session");
        }

        if self.cx.event_driven_unavailable || blocks.is_empty() {
            vdebug!(blocks = blocks.len(), "activate: polling fallback");
            self.start_polling(host, now_ms);
            return Ok(TrackingModeKind::Polling);
        }

        let margin = self.margin_now(&*host);
        self.switch_mode(host, TrackingMode::EventDriven { margin });
        for block in &blocks {
            host.observe(block, margin);
        }
        vdebug!(
            blocks = blocks.len(),
            margin_top = margin.top,
            margin_bottom = margin.bottom,
            "activate: event-driven"
        );
        Ok(TrackingModeKind::EventDriven)
    }

    /// Disconnects the event-driven notifier and activates again from scratch.
    pub fn refresh<H: Host<Node = N>>(
        &mut self,
        host: &mut H,
        now_ms: u64,
    ) -> Result<TrackingModeKind> {
        self.switch_mode(host, TrackingMode::Inactive);
        self.activate(host, now_ms)
    }

    fn start_polling<H: Host<Node = N>>(&mut self, host: &mut H, now_ms: u64) {
        let mut timer = match self.mode {
            TrackingMode::Polling { timer } => timer,
            _ => IntervalTimer::new(self.cx.options.poll_interval_ms),
        };
        if !self.cx.page_hidden {
            timer.start(now_ms);
        }
        self.switch_mode(host, TrackingMode::Polling { timer });
        if !self.cx.page_hidden {
            self.poll(host);
        }
    }

    /// Visibility events from the event-driven notifier.
    pub fn on_visibility<H: Host<Node = N>>(
        &mut self,
        host: &mut H,
        events: &[VisibilityEvent<N>],
        now_ms: u64,
    ) {
        for event in events {
            let id = match self.store.id_of(&event.node) {
                Some(id) => id,
                None if host.is_connected(&event.node) => self.track(&*host, &event.node),
                None => continue,
            };

            if !self.cx.enabled {
                self.restore_id(host, id);
                continue;
            }

            if event.visible {
                let delay = self.cx.options.restore_delay_ms;
                if delay > 0 {
                    if !self.delayed.iter().any(|d| d.id == id) {
                        self.delayed.push(DelayedRestore {
                            due_ms: now_ms.saturating_add(delay),
                            id,
                        });
                    }
                } else {
                    self.restore_id(host, id);
                }
            } else {
                self.delayed.retain(|d| d.id != id);
                self.unload_id(host, id);
            }
        }
    }

    /// Timer entry point: fires due delayed restores and the polling interval.
    pub fn on_tick<H: Host<Node = N>>(&mut self, host: &mut H, now_ms: u64) {
        if !self.delayed.is_empty() {
            let (due, pending): (Vec<_>, Vec<_>) = mem::take(&mut self.delayed)
                .into_iter()
                .partition(|d| d.due_ms <= now_ms);
            self.delayed = pending;
            for d in due {
                self.restore_id(host, d.id);
            }
        }

        let fired = match &mut self.mode {
            TrackingMode::Polling { timer } => timer.fire(now_ms),
            _ => false,
        };
        if fired {
            self.poll(host);
        }
    }

    pub fn on_scroll<H: Host<Node = N>>(&mut self, host: &mut H) {
        if self.polling_live() {
            self.poll(host);
        }
    }

    pub fn on_resize<H: Host<Node = N>>(&mut self, host: &mut H) {
        if self.polling_live() {
            self.poll(host);
        }
    }

    fn polling_live(&self) -> bool {
        matches!(self.mode, TrackingMode::Polling { timer } if timer.is_running())
    }

    /// One polling pass: recompute visibility by geometry for every discovered block.
    pub(crate) fn poll<H: Host<Node = N>>(&mut self, host: &mut H) {
        if !self.cx.enabled {
            return;
        }
        let blocks = match self.discovery.find_blocks(&*host) {
            Ok(blocks) => blocks,
            Err(_err) => {
                vdebug!(error = %_err, "poll: discovery failed");
                return;
            }
        };
        self.absorb_nested(host, &blocks);
        let band = host.viewport().band(self.margin_now(&*host));
        for block in &blocks {
            let id = self.track(&*host, block);
            if host.extent(block).intersects(band) {
                self.restore_id(host, id);
            } else {
                self.unload_id(host, id);
            }
        }
    }

    /// Turns virtualization on or off.
    ///
    /// Turning it off restores every unloaded block and stops both tracking mechanisms.
    pub fn set_enabled<H: Host<Node = N>>(
        &mut self,
        host: &mut H,
        enabled: bool,
        now_ms: u64,
    ) -> Result<TrackingModeKind> {
        if !enabled {
            self.cx.enabled = false;
            self.delayed.clear();
            self.restore_all(host);
            self.switch_mode(host, TrackingMode::Inactive);
            return Ok(TrackingModeKind::Inactive);
        }
        self.cx.enabled = true;
        self.activate(host, now_ms)
    }

    /// The page went to the background. Polling is suspended, which restores every unloaded
    /// block first; event-driven registrations are kept.
    pub fn on_page_hidden<H: Host<Node = N>>(&mut self, host: &mut H) {
        self.cx.page_hidden = true;
        let suspended = match &mut self.mode {
            TrackingMode::Polling { timer } => {
                timer.stop();
                true
            }
            _ => false,
        };
        if suspended {
            self.restore_all(host);
            vdebug!("on_page_hidden: polling suspended");
        }
    }

    /// The page returned to the foreground. Tracking is re-activated when enabled so
    /// registrations reflect the current tree.
    pub fn on_page_visible<H: Host<Node = N>>(
        &mut self,
        host: &mut H,
        now_ms: u64,
    ) -> Result<TrackingModeKind> {
        self.cx.page_hidden = false;
        if !self.cx.enabled {
            return Ok(self.mode.kind());
        }
        self.activate(host, now_ms)
    }
}
