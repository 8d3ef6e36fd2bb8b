//! Tick scheduling
//!
//! The core itself never waits: syncers expose a pure `tick()` and leave
//! the waiting to an `IntervalRunner`, which drives a tick closure from a
//! background thread at a fixed interval. `stop()` halts at the next
//! boundary; an in-flight tick always completes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// A fixed tick period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    ms: u64,
}

impl Interval {
    /// Period for a tick rate in Hz: `1000 / hz` milliseconds.
    pub fn from_hz(hz: f64) -> Self {
        Self {
            ms: (1_000.0 / hz).round() as u64,
        }
    }

    /// Period from an explicit millisecond count.
    pub fn from_millis(ms: u64) -> Self {
        Self { ms }
    }

    /// The period in milliseconds.
    pub fn millis(&self) -> u64 {
        self.ms
    }

    /// The period as a `Duration`.
    pub fn as_duration(&self) -> Duration {
        Duration::from_millis(self.ms)
    }
}

/// Drives a tick closure at a fixed interval from a background thread.
///
/// The closure is shared with the thread, so the runner can be stopped and
/// started again. Dropping a running runner stops it.
///
/// # Example
///
/// ```
/// use std::sync::atomic::{AtomicU32, Ordering};
/// use std::sync::Arc;
/// use vesna_protocol::{Interval, IntervalRunner};
///
/// let ticks = Arc::new(AtomicU32::new(0));
/// let counter = Arc::clone(&ticks);
/// let mut runner = IntervalRunner::new(
///     move || { counter.fetch_add(1, Ordering::SeqCst); },
///     Interval::from_millis(1),
/// );
///
/// runner.start();
/// assert!(runner.is_running());
/// std::thread::sleep(std::time::Duration::from_millis(20));
/// runner.stop();
/// assert!(ticks.load(Ordering::SeqCst) > 0);
/// ```
pub struct IntervalRunner {
    tick: Arc<Mutex<Box<dyn FnMut() + Send>>>,
    interval: Interval,
    running: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl IntervalRunner {
    /// Creates a runner for the given tick closure and interval. The runner
    /// starts stopped.
    pub fn new(tick: impl FnMut() + Send + 'static, interval: Interval) -> Self {
        Self {
            tick: Arc::new(Mutex::new(Box::new(tick))),
            interval,
            running: Arc::new(AtomicBool::new(false)),
            handle: None,
        }
    }

    /// Starts ticking. No-op when already running.
    pub fn start(&mut self) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }

        let tick = Arc::clone(&self.tick);
        let running = Arc::clone(&self.running);
        let period = self.interval.as_duration();

        self.handle = Some(thread::spawn(move || {
            while running.load(Ordering::SeqCst) {
                (tick.lock().expect("tick closure poisoned"))();
                thread::sleep(period);
            }
        }));
    }

    /// Stops at the next tick boundary and waits for the thread to finish.
    /// No-op when already stopped.
    pub fn stop(&mut self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }

    /// True while the background thread is ticking.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// The configured tick period.
    pub fn interval(&self) -> Interval {
        self.interval
    }
}

impl Drop for IntervalRunner {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for IntervalRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntervalRunner")
            .field("interval", &self.interval)
            .field("running", &self.is_running())
            .finish()
    }
}
