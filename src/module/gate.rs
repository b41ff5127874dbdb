//! Per-module mutual exclusion between the scheduler and command dispatch.
use std::time::Duration;

use parking_lot::{Mutex, MutexGuard};

use crate::error::Error;
use crate::Result;

/// Mutex with a bounded wait. Acquisition fails with [`Error::Busy`] once the timeout elapses, the caller never proceeds without the lock.
#[derive(Debug)]
pub struct Gate {
    lock: Mutex<()>,
    timeout: Duration,
}

/// Held while a step or command runs. Dropping it releases the gate.
pub struct GateGuard<'a> {
    guard: MutexGuard<'a, ()>,
}

impl Gate {
    pub fn new(timeout: Duration) -> Self {
        Self {
            lock: Mutex::new(()),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn acquire(&self) -> Result<GateGuard<'_>> {
        self.lock
            .try_lock_for(self.timeout)
            .map(|guard| GateGuard { guard })
            .ok_or(Error::Busy)
    }

    pub fn is_locked(&self) -> bool {
        self.lock.is_locked()
    }
}

impl GateGuard<'_> {
    /// Releases the gate while `f` runs and takes it back afterwards. Lets long running commands wait for the scheduler.
    pub fn unlocked<F, U>(&mut self, f: F) -> U
    where
        F: FnOnce() -> U,
    {
        MutexGuard::unlocked(&mut self.guard, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn bounded_wait_then_fail() {
        let gate = Gate::new(Duration::from_millis(20));
        let _guard = gate.acquire().unwrap();

        let started = std::time::Instant::now();
        assert!(matches!(gate.acquire(), Err(Error::Busy)));
        assert!(started.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn unlocked_releases() {
        let gate = Arc::new(Gate::new(Duration::from_millis(500)));
        let mut guard = gate.acquire().unwrap();

        let other = gate.clone();
        let acquired = guard.unlocked(move || {
            std::thread::spawn(move || other.acquire().is_ok())
                .join()
                .unwrap()
        });
        assert!(acquired);
        assert!(gate.is_locked());
        drop(guard);
        assert!(!gate.is_locked());
    }
}
