use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex, PoisonError};
use std::time::Duration;

/// Stop request shared between the poll loop, Ctrl+C and the keyboard monitor.
///
/// Waits on the signal end early once it is triggered, so the loop never
/// sleeps past a stop request.
pub struct ShutdownSignal {
    shutdown: AtomicBool,
    /// Set by the keyboard monitor; consumed by the poll loop
    timer_reset: AtomicBool,
    condvar: Condvar,
    mutex: Mutex<()>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self {
            shutdown: AtomicBool::new(false),
            timer_reset: AtomicBool::new(false),
            condvar: Condvar::new(),
            mutex: Mutex::new(()),
        }
    }

    pub fn trigger(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.condvar.notify_all();
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    pub fn request_timer_reset(&self) {
        self.timer_reset.store(true, Ordering::SeqCst);
    }

    /// Whether a timer reset was requested since the last call
    pub fn take_timer_reset(&self) -> bool {
        self.timer_reset.swap(false, Ordering::SeqCst)
    }

    /// Sleep for `duration` or until shutdown. Returns `true` on shutdown.
    pub fn wait(&self, duration: Duration) -> bool {
        if self.is_shutdown() {
            return true;
        }

        // The mutex guards no data, so a poisoned lock is still usable
        let guard = self.mutex.lock().unwrap_or_else(PoisonError::into_inner);
        match self
            .condvar
            .wait_timeout_while(guard, duration, |_| !self.is_shutdown())
        {
            Ok((_, timeout)) => !timeout.timed_out(),
            Err(_) => true,
        }
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}
