//! Periodic sample scheduler
//!
//! Tracks the deadline of the next sampling window in milliseconds of
//! monotonic time. The caller supplies the clock, so tests advance virtual
//! time while the firmware feeds it `embassy_time::Instant`.

use core::cell::Cell;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::signal::Signal;

/// Fixed-period timer that wakes the rate reporter
pub struct SampleScheduler {
    window_ms: u32,
    deadline: Mutex<CriticalSectionRawMutex, Cell<Option<u64>>>,
    started: Signal<CriticalSectionRawMutex, ()>,
}

impl SampleScheduler {
    pub const fn new(window_ms: u32) -> Self {
        Self {
            window_ms,
            deadline: Mutex::new(Cell::new(None)),
            started: Signal::new(),
        }
    }

    pub fn window_ms(&self) -> u32 {
        self.window_ms
    }

    /// Start (or restart) the timer; the first tick is one window from `now_ms`
    pub fn start(&self, now_ms: u64) {
        self.deadline
            .lock(|d| d.set(Some(now_ms + u64::from(self.window_ms))));
        self.started.signal(());
    }

    pub fn stop(&self) {
        self.deadline.lock(|d| d.set(None));
    }

    pub fn is_running(&self) -> bool {
        self.next_deadline().is_some()
    }

    /// Time of the next tick, if running
    pub fn next_deadline(&self) -> Option<u64> {
        self.deadline.lock(|d| d.get())
    }

    /// Returns true if a tick is due at `now_ms`, and schedules the next one.
    ///
    /// Overdue windows collapse into a single tick; the schedule stays
    /// aligned to the original period.
    pub fn poll(&self, now_ms: u64) -> bool {
        let window = u64::from(self.window_ms.max(1));
        self.deadline.lock(|d| match d.get() {
            Some(deadline) if now_ms >= deadline => {
                let missed = (now_ms - deadline) / window;
                d.set(Some(deadline + (missed + 1) * window));
                true
            }
            _ => false,
        })
    }

    /// Wait until the timer has been started
    pub async fn wait_started(&self) {
        while !self.is_running() {
            self.started.wait().await;
        }
    }
}
