//! Wall-clock time source for running on real hardware.

use std::thread;
use std::time::{Duration, Instant};

use crate::traits::{Clock, Delay};

/// Monotonic clock backed by [`Instant`], sleeping the calling thread on delays.
///
/// Time is counted from construction.
///
/// # Example
///
/// ```rust
/// use prl_launcher::hal::SystemClock;
/// use prl_launcher::traits::{Clock, Delay};
///
/// let clock = SystemClock::new();
/// let start = clock.now_ms();
/// clock.delay_ms(5);
/// assert!(clock.now_ms() >= start + 5);
/// ```
#[derive(Clone, Copy, Debug)]
pub struct SystemClock {
    start: Instant,
}

impl SystemClock {
    /// Creates a clock reading 0 now.
    #[inline]
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    #[inline]
    fn now_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

impl Delay for SystemClock {
    fn delay_ms(&self, ms: u64) {
        thread::sleep(Duration::from_millis(ms));
    }
}
