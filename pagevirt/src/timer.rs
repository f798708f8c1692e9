/// A host-driven recurring timer.
///
/// The timer owns no host resource; the host advances it through `Engine::on_tick`. The handle
/// is the pending due time, and [`IntervalTimer::stop`] clears it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IntervalTimer {
    interval_ms: u64,
    next_due_ms: Option<u64>,
}

impl IntervalTimer {
    pub fn new(interval_ms: u64) -> Self {
        Self {
            interval_ms: interval_ms.max(1),
            next_due_ms: None,
        }
    }

    pub fn interval_ms(&self) -> u64 {
        self.interval_ms
    }

    pub fn is_running(&self) -> bool {
        self.next_due_ms.is_some()
    }

    pub fn next_due_ms(&self) -> Option<u64> {
        self.next_due_ms
    }

    /// No-op when already running.
    pub fn start(&mut self, now_ms: u64) {
        if self.next_due_ms.is_none() {
            self.next_due_ms = Some(now_ms.saturating_add(self.interval_ms));
        }
    }

    /// Safe to call any number of times.
    pub fn stop(&mut self) {
        self.next_due_ms = None;
    }

    /// Returns `true` (and re-arms) when the timer is due at `now_ms`.
    pub fn fire(&mut self, now_ms: u64) -> bool {
        match self.next_due_ms {
            Some(due) if now_ms >= due => {
                self.next_due_ms = Some(now_ms.saturating_add(self.interval_ms));
                true
            }
            _ => false,
        }
    }
}
