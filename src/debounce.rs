use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Cancellable delayed trigger. Each [`schedule`](Debouncer::schedule) call
/// invalidates the ticket handed out before it, so in a burst of calls only the
/// last ticket survives its quiet window.
///
/// This cancels the *scheduling* of work; a call that already started is not
/// interrupted.
#[derive(Debug, Clone)]
pub struct Debouncer {
    window: Duration,
    generation: Arc<AtomicU64>,
}

impl Debouncer {
    pub const DEFAULT_WINDOW: Duration = Duration::from_millis(400);

    pub fn new(window: Duration) -> Self {
        Self { window, generation: Arc::new(AtomicU64::new(0)) }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn schedule(&self) -> Ticket {
        let id = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        Ticket { id, generation: Arc::clone(&self.generation), window: self.window }
    }

    /// Invalidates the outstanding ticket without scheduling a new one.
    pub fn cancel(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }
}

impl Default for Debouncer {
    fn default() -> Self {
        Self::new(Self::DEFAULT_WINDOW)
    }
}

#[derive(Debug)]
pub struct Ticket {
    id: u64,
    generation: Arc<AtomicU64>,
    window: Duration,
}

impl Ticket {
    pub fn is_current(&self) -> bool {
        self.generation.load(Ordering::SeqCst) == self.id
    }

    /// Sleeps through the quiet window. `true` means nothing superseded this
    /// ticket and the work should run now.
    pub async fn fire(self) -> bool {
        sleep(self.window).await;
        self.is_current()
    }
}

#[cfg(target_arch = "wasm32")]
pub(crate) async fn sleep(duration: Duration) {
    gloo_timers::future::sleep(duration).await;
}

#[cfg(not(target_arch = "wasm32"))]
pub(crate) async fn sleep(duration: Duration) {
    tokio::time::sleep(duration).await;
}
