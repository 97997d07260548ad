use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Longest uninterrupted sleep while waiting on a stop request.
const SLEEP_SLICE: Duration = Duration::from_millis(50);

/// Cooperative stop signal shared by both loops.
///
/// Cloning shares the same flag.
#[derive(Debug, Clone)]
pub struct ShutdownFlag {
    running: Arc<AtomicBool>,
}

impl ShutdownFlag {
    /// Create a flag in the running state.
    pub fn new() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Ask every loop holding this flag to stop after its current step.
    pub fn request_stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// True until a stop is requested.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Sleep for `duration`, waking early on a stop request.
    ///
    /// Returns `true` if still running afterwards.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        while self.is_running() {
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            std::thread::sleep((deadline - now).min(SLEEP_SLICE));
        }
        false
    }
}

impl Default for ShutdownFlag {
    fn default() -> Self {
        Self::new()
    }
}
