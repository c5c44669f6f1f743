//! `DispatchShim` (§4.6): "Takes a dequeued request, hands it to FlashIO with
//! a completion callback that (a) notifies NetIO with `(cookie, status,
//! payload)`, (b) increments the tenant's completion counter, (c) returns
//! the Request's backing buffers to their pool."
//!
//! §9's "manual pool-allocated request objects" guidance: the source tracks
//! in-flight requests via raw pointers into a manually managed pool; here
//! that becomes a typed arena with a free list and a generation counter per
//! slot, so a completion that races a stale/reused slot is detected rather
//! than silently reading garbage.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use flux_engine::{Dispatcher, PayloadHandle, Request, TenantId};
use tracing::{error, warn};

use crate::flashio::{FlashHandle, FlashIo, FlashOp, FlashStatus};
use crate::metrics::WorkerMetrics;
use crate::netio::{CompletionStatus, NetIo, OutboundEvent};

#[derive(Debug, Clone, Copy)]
struct InFlight {
    tenant_id: TenantId,
    client_cookie: u64,
    payload_handle: PayloadHandle,
}

/// An arena of in-flight request metadata, indexed by a (slot, generation)
/// pair so a completion arriving after its slot has been freed and reused is
/// caught rather than misattributed (§9).
#[derive(Debug, Default)]
struct InFlightPool {
    slots: Vec<Option<InFlight>>,
    generations: Vec<u32>,
    free: Vec<usize>,
}

/// Stable key handed out by [`InFlightPool::insert`]; packs `(index,
/// generation)` into one `u64` so it can ride alongside a [`FlashHandle`]
/// without a second allocation.
type PoolKey = u64;

impl InFlightPool {
    fn pack(index: usize, generation: u32) -> PoolKey {
        (index as u64) << 32 | u64::from(generation)
    }

    fn unpack(key: PoolKey) -> (usize, u32) {
        ((key >> 32) as usize, key as u32)
    }

    fn insert(&mut self, entry: InFlight) -> PoolKey {
        if let Some(index) = self.free.pop() {
            self.slots[index] = Some(entry);
            Self::pack(index, self.generations[index])
        } else {
            let index = self.slots.len();
            self.slots.push(Some(entry));
            self.generations.push(0);
            Self::pack(index, 0)
        }
    }

    /// Removes and returns the entry for `key`, or `None` if the slot was
    /// already freed or has since been reused (a stale completion).
    fn take(&mut self, key: PoolKey) -> Option<InFlight> {
        let (index, generation) = Self::unpack(key);
        if self.generations.get(index).copied() != Some(generation) {
            return None;
        }
        let slot = self.slots.get_mut(index)?;
        let entry = slot.take()?;
        self.generations[index] = self.generations[index].wrapping_add(1);
        self.free.push(index);
        Some(entry)
    }
}

/// Bridges a popped [`flux_engine::Request`] to `FlashIo::submit`, and
/// routes completions from `FlashIo::poll` back to `NetIo`. Implements
/// [`flux_engine::Dispatcher`] so a [`flux_engine::Scheduler`] can drive it
/// directly on the hot path.
pub struct DispatchShim<'a, F, N> {
    flash: &'a mut F,
    net: &'a mut N,
    pool: &'a mut InFlightPoolHandle,
    completion_counters: &'a CompletionCounters,
    metrics: &'a WorkerMetrics,
}

/// Owns the in-flight arena and the mapping from the driver's own
/// [`FlashHandle`] to our pool key — kept separate from the pool itself so a
/// `DispatchShim` can borrow it across a tick without also owning the
/// `FlashIo`/`NetIo` collaborators for that long.
#[derive(Debug, Default)]
pub struct InFlightPoolHandle {
    pool: InFlightPool,
    by_flash_handle: HashMap<FlashHandle, PoolKey>,
}

impl InFlightPoolHandle {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.by_flash_handle.len()
    }
}

/// Per-tenant dispatched-completion counters, read by the admin surface and
/// tests. Lock-free: one `AtomicU64` per tenant, grown lazily.
#[derive(Debug, Default)]
pub struct CompletionCounters {
    counts: std::sync::Mutex<HashMap<TenantId, AtomicU64>>,
}

impl CompletionCounters {
    pub fn new() -> Self {
        Self::default()
    }

    fn increment(&self, tenant_id: TenantId) {
        let counts = self.counts.lock().unwrap();
        if let Some(counter) = counts.get(&tenant_id) {
            counter.fetch_add(1, Ordering::Relaxed);
            return;
        }
        drop(counts);
        let mut counts = self.counts.lock().unwrap();
        counts
            .entry(tenant_id)
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(&self, tenant_id: TenantId) -> u64 {
        self.counts
            .lock()
            .unwrap()
            .get(&tenant_id)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }
}

impl<'a, F: FlashIo, N: NetIo> DispatchShim<'a, F, N> {
    pub fn new(
        flash: &'a mut F,
        net: &'a mut N,
        pool: &'a mut InFlightPoolHandle,
        completion_counters: &'a CompletionCounters,
        metrics: &'a WorkerMetrics,
    ) -> Self {
        Self {
            flash,
            net,
            pool,
            completion_counters,
            metrics,
        }
    }

    /// Drains `FlashIo::poll()` and, for each completion, performs
    /// `DispatchShim`'s three duties (§4.6): notify NetIO, bump the
    /// tenant's completion counter, and free the request's pool slot.
    /// Completions do not unseat tenant accounting (§4.5 "Failure
    /// semantics") — tokens were already debited at dispatch time.
    pub fn drain_completions(&mut self) {
        for completion in self.flash.poll() {
            let Some(key) = self.pool.by_flash_handle.remove(&completion.handle) else {
                warn!(
                    handle = completion.handle,
                    "completion for unknown or already-retired flash handle; dropping"
                );
                continue;
            };
            let Some(entry) = self.pool.pool.take(key) else {
                warn!(
                    handle = completion.handle,
                    "stale in-flight slot generation on completion; dropping"
                );
                continue;
            };

            let status = match completion.status {
                FlashStatus::Ok => CompletionStatus::Ok,
                FlashStatus::Error(device_status) => {
                    error!(
                        tenant_id = entry.tenant_id.0,
                        category = ?device_status.category,
                        code = device_status.code,
                        "flash completion error"
                    );
                    CompletionStatus::DeviceError(device_status)
                }
            };

            self.net.enqueue_outbound(OutboundEvent::Completed {
                client_cookie: entry.client_cookie,
                status,
                payload_handle: Some(entry.payload_handle),
                service_time_us: completion.service_time_us,
            });
            self.completion_counters.increment(entry.tenant_id);
            self.metrics.record_service_time_us(u64::from(completion.service_time_us));
        }
    }
}

impl<F: FlashIo, N: NetIo> Dispatcher for DispatchShim<'_, F, N> {
    fn has_room(&self) -> bool {
        self.flash.has_room()
    }

    /// Per §4.5 "Failure semantics": a submit failure *after* the caller
    /// checked `has_room()` indicates a gating bug (ran out of command slots
    /// despite the capacity check) and is fatal.
    fn dispatch(&mut self, request: Request) {
        let op = FlashOp {
            opcode: request.opcode,
            lba: request.lba,
            len_sectors: request.len_sectors,
            payload_handle: request.payload_handle,
        };
        let handle = self
            .flash
            .submit(op)
            .expect("FlashIo::submit failed after has_room() check passed");

        let entry = InFlight {
            tenant_id: request.tenant_id,
            client_cookie: request.client_cookie,
            payload_handle: request.payload_handle,
        };
        let key = self.pool.pool.insert(entry);
        self.pool.by_flash_handle.insert(handle, key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flashio::FakeFlashIo;
    use crate::netio::ChannelNetIo;
    use flux_engine::Opcode;

    fn req(tenant_id: u64, cookie: u64) -> Request {
        Request {
            tenant_id: TenantId(tenant_id),
            opcode: Opcode::Read,
            lba: 0,
            len_sectors: 8,
            cost_tokens: 100,
            payload_handle: 42,
            client_cookie: cookie,
            enqueue_ts: 0,
        }
    }

    #[test]
    fn dispatch_then_complete_notifies_netio_and_frees_slot() {
        let mut flash = FakeFlashIo::new(4);
        let mut net = ChannelNetIo::new();
        let mut pool = InFlightPoolHandle::new();
        let counters = CompletionCounters::new();
        let metrics = WorkerMetrics::new();

        {
            let mut shim = DispatchShim::new(&mut flash, &mut net, &mut pool, &counters, &metrics);
            shim.dispatch(req(1, 99));
        }
        assert_eq!(pool.len(), 1);

        flash.complete_all();
        {
            let mut shim = DispatchShim::new(&mut flash, &mut net, &mut pool, &counters, &metrics);
            shim.drain_completions();
        }

        assert_eq!(pool.len(), 0);
        assert_eq!(counters.get(TenantId(1)), 1);
        net.flush_responses();
        let flushed = net.flushed();
        assert_eq!(flushed.len(), 1);
        match flushed[0] {
            OutboundEvent::Completed { client_cookie, status, .. } => {
                assert_eq!(client_cookie, 99);
                assert_eq!(status, CompletionStatus::Ok);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn slot_reuse_gets_a_fresh_generation() {
        let mut pool = InFlightPool::default();
        let entry = InFlight {
            tenant_id: TenantId(1),
            client_cookie: 1,
            payload_handle: 0,
        };
        let key1 = pool.insert(entry);
        pool.take(key1).unwrap();
        let key2 = pool.insert(entry);
        // Same slot index, bumped generation: the old key must not resolve.
        assert!(pool.take(key1).is_none());
        assert!(pool.take(key2).is_some());
    }
}
