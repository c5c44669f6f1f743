use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crossbeam_utils::CachePadded;

use crate::tenant::WorkerId;

/// The cross-worker "leftover tokens" pool (§3, §4.5).
///
/// `leftover` is a single 64-bit atomic counter; `donate` is a fetch-add,
/// `try_take` is a CAS loop (§9 — correctness does not require anything
/// stronger than that). Every pinned worker core hammers this counter once
/// per tick, so it is `CachePadded` to keep it off the same line as whatever
/// else lands next to it in the allocator — the same reasoning
/// `seanchatmangpt-knhk/knhk-kernel` applies to its own per-core hot-path
/// counters. The `scheduled_bit_vector` reset protocol is deliberately *not*
/// atomic: the spec calls the exact reset moment immaterial to correctness,
/// only to how promptly excess tokens get reclaimed, so a plain
/// mutex-guarded `Vec<bool>` is the right tool rather than a second
/// lock-free structure.
#[derive(Debug)]
pub struct GlobalTokenPool {
    leftover: CachePadded<AtomicU64>,
    observed: Mutex<Vec<bool>>,
}

impl GlobalTokenPool {
    pub fn new(num_workers: usize) -> Self {
        Self {
            leftover: CachePadded::new(AtomicU64::new(0)),
            observed: Mutex::new(vec![false; num_workers]),
        }
    }

    pub fn available(&self) -> u64 {
        self.leftover.load(Ordering::Relaxed)
    }

    /// Adds `n` tokens to the pool (fetch-add).
    pub fn donate(&self, n: u64) {
        if n > 0 {
            self.leftover.fetch_add(n, Ordering::AcqRel);
        }
    }

    /// CAS loop: takes up to `want` tokens from the pool, returning the
    /// amount actually taken (which may be less than `want`, including zero).
    pub fn try_take(&self, want: u64) -> u64 {
        if want == 0 {
            return 0;
        }
        let mut avail = self.leftover.load(Ordering::Acquire);
        loop {
            let take = want.min(avail);
            if take == 0 {
                return 0;
            }
            match self.leftover.compare_exchange_weak(
                avail,
                avail - take,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return take,
                Err(current) => avail = current,
            }
        }
    }

    /// Called once per worker per tick, after its sub-round 2 completes.
    /// When every worker has called this since the last reset, the last
    /// observer zeroes the pool and clears the vector — this bounds how
    /// stale leftover tokens can get when some workers are sleeping.
    pub fn observe_tick_complete(&self, worker: WorkerId, num_workers: usize) {
        let mut observed = self.observed.lock().unwrap();
        if observed.len() != num_workers {
            observed.resize(num_workers, false);
        }
        if worker.0 < observed.len() {
            observed[worker.0] = true;
        }
        if observed.iter().all(|&b| b) {
            self.leftover.store(0, Ordering::Relaxed);
            observed.iter_mut().for_each(|b| *b = false);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn donate_then_take_round_trips() {
        let pool = GlobalTokenPool::new(2);
        pool.donate(500);
        assert_eq!(pool.available(), 500);
        assert_eq!(pool.try_take(1000), 500);
        assert_eq!(pool.available(), 0);
    }

    #[test]
    fn try_take_never_returns_more_than_available() {
        let pool = GlobalTokenPool::new(1);
        pool.donate(100);
        assert_eq!(pool.try_take(30), 30);
        assert_eq!(pool.try_take(1000), 70);
        assert_eq!(pool.try_take(1), 0);
    }

    #[test]
    fn resets_only_after_every_worker_has_observed() {
        let pool = GlobalTokenPool::new(2);
        pool.donate(42);
        pool.observe_tick_complete(WorkerId(0), 2);
        // Only one of two workers has reported; leftover survives.
        assert_eq!(pool.available(), 42);
        pool.observe_tick_complete(WorkerId(1), 2);
        // Last observer resets.
        assert_eq!(pool.available(), 0);
    }

    #[test]
    fn cross_worker_donation_scenario_s5() {
        // S5: worker 1 donates 500 leftover; worker 2 wants 1000, gets 500.
        let pool = GlobalTokenPool::new(2);
        pool.donate(500);
        let acquired = pool.try_take(1000);
        assert_eq!(acquired, 500);
    }
}
