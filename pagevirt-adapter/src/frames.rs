use core::future::Future;
use core::pin::Pin;
use core::task::{Context, Poll};

/// Rendering-frame boundaries, as awaited by the bulk extraction workflow.
pub trait FrameSource {
    /// Resolves at the next frame boundary.
    fn next_frame(&mut self) -> impl Future<Output = ()>;
}

/// A frame source for headless hosts: every frame is one cooperative yield.
#[derive(Clone, Copy, Debug, Default)]
pub struct YieldingFrames {
    frames: u64,
}

impl YieldingFrames {
    pub fn new() -> Self {
        Self::default()
    }

    /// Frames requested so far.
    pub fn frames(&self) -> u64 {
        self.frames
    }
}

impl FrameSource for YieldingFrames {
    fn next_frame(&mut self) -> impl Future<Output = ()> {
        self.frames += 1;
        YieldOnce { yielded: false }
    }
}

struct YieldOnce {
    yielded: bool,
}

impl Future for YieldOnce {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.yielded {
            return Poll::Ready(());
        }
        self.yielded = true;
        cx.waker().wake_by_ref();
        Poll::Pending
    }
}
