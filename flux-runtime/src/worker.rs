//! `Worker` (§5): owns exactly one [`TenantManager`] + its tenants' entries
//! in a [`SoftwareQueueTable`] + one [`Scheduler`] instance + one `FlashIo`
//! queue pair. Never shares mutable tenant state with another worker —
//! cross-worker coordination happens only through the lock-free
//! [`GlobalTokenPool`] and the registry's [`RegistrySnapshot`].

use flux_engine::{
    CostModel, GlobalTokenPool, Request, RegistrySnapshot, Scheduler, SoftwareQueueTable,
    TenantHandle, TenantId, TenantManager, TickOutcome, WorkerId,
};
use tracing::warn;

use crate::dispatch::{CompletionCounters, DispatchShim, InFlightPoolHandle};
use crate::error::DataPlaneError;
use crate::flashio::FlashIo;
use crate::metrics::WorkerMetrics;
use crate::netio::{DecodedRequest, NetIo};

/// Capacity of a tenant's [`flux_engine::SoftwareQueue`] once adopted by a
/// worker. Not part of the registration SLO — purely a local backpressure
/// bound, analogous to a bounded channel's buffer size.
pub const DEFAULT_QUEUE_CAPACITY: usize = 4096;

/// One pinned-core worker's full state: its tenant set, their software
/// queues, the scheduler driving them, the flash device queue pair, and the
/// in-flight request bookkeeping [`DispatchShim`] needs.
pub struct Worker<F> {
    id: WorkerId,
    manager: TenantManager,
    queues: SoftwareQueueTable,
    scheduler: Scheduler,
    flash: F,
    inflight: InFlightPoolHandle,
    completions: CompletionCounters,
    metrics: WorkerMetrics,
}

impl<F: FlashIo> Worker<F> {
    pub fn new(id: WorkerId, scheduler: Scheduler, flash: F) -> Self {
        Self {
            id,
            manager: TenantManager::new(),
            queues: SoftwareQueueTable::new(),
            scheduler,
            flash,
            inflight: InFlightPoolHandle::new(),
            completions: CompletionCounters::new(),
            metrics: WorkerMetrics::new(),
        }
    }

    pub fn id(&self) -> WorkerId {
        self.id
    }

    pub fn completions(&self) -> &CompletionCounters {
        &self.completions
    }

    /// This worker's dispatch/admission/service-time instruments. `TickDriver`
    /// reads from the same instance `tick()` records into, so service-time
    /// samples from `DispatchShim` land in the histogram the driver reports.
    pub fn metrics(&self) -> &WorkerMetrics {
        &self.metrics
    }

    /// Adopts a newly registered tenant onto this worker (§5 — called once,
    /// at admission time, by whatever placed the connection here).
    pub fn adopt_tenant(&mut self, handle: TenantHandle) {
        let tenant_id = handle.tenant_id;
        self.manager.adopt(handle);
        self.queues.create(tenant_id, DEFAULT_QUEUE_CAPACITY);
    }

    pub fn retire_tenant(&mut self, tenant_id: TenantId) {
        self.manager.retire(tenant_id);
        self.queues.remove(tenant_id);
    }

    /// Freezes a decoded request's cost (§3 — cost is computed once, at
    /// enqueue, and never recomputed) and pushes it onto its tenant's
    /// software queue, activating the tenant's ring entry.
    fn enqueue_decoded(
        &mut self,
        decoded: DecodedRequest,
        cost_model: &CostModel,
        now_ticks: u64,
    ) -> Result<(), DataPlaneError> {
        let len_bytes = u64::from(decoded.len_sectors) * u64::from(crate::wire::DEFAULT_SECTOR_SIZE);
        let request = Request {
            tenant_id: decoded.tenant_id,
            opcode: decoded.opcode,
            lba: decoded.lba,
            len_sectors: decoded.len_sectors,
            cost_tokens: cost_model.cost(decoded.opcode, len_bytes),
            payload_handle: decoded.payload_handle,
            client_cookie: decoded.client_cookie,
            enqueue_ts: now_ticks,
        };
        self.queues.enqueue(request)?;
        self.manager.activate(decoded.tenant_id);
        Ok(())
    }

    /// The per-worker half of `TickDriver`'s four-step loop (§4.7): drain
    /// flash completions, drain NetIO into queues, run one scheduler tick,
    /// flush responses. `TickDriver` owns the `NetIo` collaborator and the
    /// shared registry/pool state, so both are borrowed in rather than owned
    /// here — that is what keeps this type testable without a real NetIo.
    pub fn tick(
        &mut self,
        net: &mut impl NetIo,
        registry_snapshot: &RegistrySnapshot,
        cost_model: &CostModel,
        pool: &GlobalTokenPool,
        num_workers: usize,
        now_ticks: u64,
    ) -> TickOutcome {
        {
            let mut shim = DispatchShim::new(
                &mut self.flash,
                net,
                &mut self.inflight,
                &self.completions,
                &self.metrics,
            );
            shim.drain_completions();
        }

        for decoded in net.drain_into_queues() {
            if let Err(err) = self.enqueue_decoded(decoded, cost_model, now_ticks) {
                warn!(
                    tenant_id = decoded.tenant_id.0,
                    error = %err,
                    "dropping decoded request"
                );
            }
        }

        let outcome = {
            let mut shim = DispatchShim::new(
                &mut self.flash,
                net,
                &mut self.inflight,
                &self.completions,
                &self.metrics,
            );
            self.scheduler.schedule(
                &mut self.manager,
                &mut self.queues,
                registry_snapshot,
                pool,
                self.id,
                num_workers,
                &mut shim,
            )
        };

        net.flush_responses();
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flashio::FakeFlashIo;
    use crate::netio::ChannelNetIo;
    use flux_engine::{DeviceModel, Opcode, SchedulerMode, TenantRegistry};
    use quanta::Clock;

    #[test]
    fn tick_drains_one_decoded_request_through_to_dispatch() {
        let device = DeviceModel::unlimited();
        let registry = TenantRegistry::new(device, CostModel::fake());
        let handle = registry
            .register_flow(TenantId(1), 1, 1_000_000_000, 100, WorkerId(0))
            .unwrap();
        handle.set_scaled_iopus_limit(1_000_000.0);

        let (clock, _mock) = Clock::mock();
        let scheduler = Scheduler::new(SchedulerMode::LessV0, clock, 20_000);
        let flash = FakeFlashIo::new(16);
        let mut worker = Worker::new(WorkerId(0), scheduler, flash);
        worker.adopt_tenant(handle);

        let mut net = ChannelNetIo::new();
        net.deliver(DecodedRequest {
            tenant_id: TenantId(1),
            opcode: Opcode::Read,
            lba: 0,
            len_sectors: 8,
            payload_handle: 0,
            client_cookie: 42,
        });

        let pool = GlobalTokenPool::new(1);
        let outcome = worker.tick(&mut net, registry.snapshot(), registry.cost_model(), &pool, 1, 0);
        assert_eq!(outcome.lc_dispatched, 1);
    }

    #[test]
    fn enqueue_for_unknown_tenant_is_dropped_not_fatal() {
        let device = DeviceModel::unlimited();
        let registry = TenantRegistry::new(device, CostModel::fake());
        let (clock, _mock) = Clock::mock();
        let scheduler = Scheduler::new(SchedulerMode::LessV0, clock, 20_000);
        let flash = FakeFlashIo::new(16);
        let mut worker = Worker::new(WorkerId(0), scheduler, flash);

        let mut net = ChannelNetIo::new();
        net.deliver(DecodedRequest {
            tenant_id: TenantId(99),
            opcode: Opcode::Read,
            lba: 0,
            len_sectors: 8,
            payload_handle: 0,
            client_cookie: 1,
        });
        let pool = GlobalTokenPool::new(1);
        let outcome = worker.tick(&mut net, registry.snapshot(), registry.cost_model(), &pool, 1, 0);
        assert_eq!(outcome.lc_dispatched, 0);
    }
}
