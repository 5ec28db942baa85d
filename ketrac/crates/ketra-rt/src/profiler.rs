//! Sampling profiler: a dedicated OS thread wakes on an interval and reads
//! the interpreter thread's current callee out of an atomic, rather than
//! instrumenting every call.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Packs `(function_slot, pc)` into one atomic word so the profiler thread
/// can read the interpreter's current location without a lock. Updated by
/// [`crate::interp::thread::Thread`] on every `call`/`ret`.
#[derive(Clone, Default)]
pub struct Callee {
    word: Arc<AtomicU64>,
}

impl Callee {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn set(&self, function_slot: u32, pc: u32) {
        self.word.store((function_slot as u64) << 32 | pc as u64, Ordering::Relaxed);
    }

    #[inline]
    pub fn get(&self) -> (u32, u32) {
        let word = self.word.load(Ordering::Relaxed);
        ((word >> 32) as u32, word as u32)
    }
}

/// A sampling profiler: one background thread, one shared [`Callee`] cell
/// per interpreter thread it watches.
pub struct Profiler {
    handle: Option<JoinHandle<HashMap<u32, u64>>>,
    stop: Arc<std::sync::atomic::AtomicBool>,
}

impl Profiler {
    /// Spawn the sampling thread. `callee` is read every `interval`;
    /// samples are tallied by function slot and returned from `stop()`.
    pub fn start(callee: Callee, interval: Duration) -> Self {
        let stop = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let stop_clone = Arc::clone(&stop);
        let handle = std::thread::spawn(move || {
            let mut samples: HashMap<u32, u64> = HashMap::new();
            while !stop_clone.load(Ordering::Relaxed) {
                let (function_slot, _pc) = callee.get();
                *samples.entry(function_slot).or_insert(0) += 1;
                std::thread::sleep(interval);
            }
            samples
        });
        Profiler { handle: Some(handle), stop }
    }

    /// Stop the sampling thread and collect its per-function sample counts.
    pub fn stop(mut self) -> HashMap<u32, u64> {
        self.stop.store(true, Ordering::Relaxed);
        self.handle.take().map(|h| h.join().unwrap_or_default()).unwrap_or_default()
    }
}

impl Drop for Profiler {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn callee_round_trips_packed_fields() {
        let callee = Callee::new();
        callee.set(7, 42);
        assert_eq!(callee.get(), (7, 42));
    }
}
