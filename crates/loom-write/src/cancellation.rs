use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A lightweight, clonable cancellation signal checked at the start of
/// `Flush`'s per-table tasks and at loop boundaries in the auto-increment
/// tracker's branch walk (§5). Resolves the source's mixed sync/async
/// cancellation story in favor of a plain polled flag rather than a future.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
