//! Interruptible one-shot waits.
//!
//! The delayed scan sleeps on this signal instead of `thread::sleep`, so a
//! Ctrl-C (or a test) can cut the wait short.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::Duration;

pub struct ShutdownSignal {
    triggered: AtomicBool,
    condvar: Condvar,
    mutex: Mutex<()>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self {
            triggered: AtomicBool::new(false),
            condvar: Condvar::new(),
            mutex: Mutex::new(()),
        }
    }

    /// Trigger the signal, waking every waiting thread.
    pub fn trigger(&self) {
        self.triggered.store(true, Ordering::SeqCst);
        self.condvar.notify_all();
    }

    pub fn is_shutdown(&self) -> bool {
        self.triggered.load(Ordering::SeqCst)
    }

    /// Wait for `duration` or until triggered.
    ///
    /// Returns `true` if the signal fired, `false` if the full duration
    /// elapsed.
    pub fn wait(&self, duration: Duration) -> bool {
        if self.is_shutdown() {
            return true;
        }

        let guard = match self.mutex.lock() {
            Ok(guard) => guard,
            // A poisoned guard means a waiter panicked; stop waiting.
            Err(_) => return true,
        };
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
