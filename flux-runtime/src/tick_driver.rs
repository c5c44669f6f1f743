//! `TickDriver` (§4.7): the four-step per-worker loop — poll flash
//! completions, drain NetIO into queues, run one scheduler tick, flush
//! responses — on a blocking OS thread pinned to a configured `cpu` id.
//!
//! `tokio` itself never drives this loop (§1/§2: the scheduler's hot path is
//! blocking-OS-thread, kernel-bypass style, not an async task); it is used
//! only for `time` facilities in tests and to host the optional `admin` HTTP
//! surface alongside these threads.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use flux_engine::{CostModel, GlobalTokenPool, TenantRegistry, WorkerId};
use quanta::Clock;
use tracing::{error, info, warn};

use crate::affinity;
use crate::flashio::FlashIo;
use crate::netio::NetIo;
use crate::worker::Worker;

/// Spawns and owns the pinned OS threads driving one [`Worker`] each.
/// Dropping or calling [`TickDriver::shutdown`] signals every thread to
/// finish its current tick and exit; `join` blocks until they have.
pub struct TickDriver {
    shutdown: Arc<AtomicBool>,
    handles: Vec<JoinHandle<()>>,
}

impl TickDriver {
    pub fn new() -> Self {
        Self {
            shutdown: Arc::new(AtomicBool::new(false)),
            handles: Vec::new(),
        }
    }

    /// Spawns one pinned worker thread. `cpu_id` is best-effort: a failed
    /// pin is logged and the thread runs unpinned rather than aborting the
    /// deployment (§6.3 lists `cpu` as a placement hint, not a hard
    /// dependency the driver must refuse to start without).
    pub fn spawn_worker<F, N>(
        &mut self,
        cpu_id: usize,
        mut worker: Worker<F>,
        mut net: N,
        registry: Arc<TenantRegistry>,
        cost_model: CostModel,
        pool: Arc<GlobalTokenPool>,
        num_workers: usize,
    ) where
        F: FlashIo + 'static,
        N: NetIo + 'static,
    {
        let shutdown = self.shutdown.clone();
        let worker_id = worker.id();
        let handle = std::thread::Builder::new()
            .name(format!("flux-worker-{}", worker_id.0))
            .spawn(move || {
                if let Err(err) = affinity::pin_to_cpu(cpu_id) {
                    warn!(worker_id = worker_id.0, cpu_id, %err, "failed to pin worker thread");
                }
                run_tick_loop(&mut worker, &mut net, &registry, &cost_model, &pool, num_workers, &shutdown);
            })
            .expect("failed to spawn tick driver thread");
        self.handles.push(handle);
    }

    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }

    pub fn join(self) {
        for handle in self.handles {
            if let Err(err) = handle.join() {
                error!(?err, "tick driver worker thread panicked");
            }
        }
    }
}

impl Default for TickDriver {
    fn default() -> Self {
        Self::new()
    }
}

/// The actual per-thread loop. Split out as a free function so tests can
/// drive a handful of iterations directly without spawning a real thread.
fn run_tick_loop<F: FlashIo, N: NetIo>(
    worker: &mut Worker<F>,
    net: &mut N,
    registry: &TenantRegistry,
    cost_model: &CostModel,
    pool: &GlobalTokenPool,
    num_workers: usize,
    shutdown: &AtomicBool,
) {
    let clock = Clock::new();
    let start = clock.now();
    info!(worker_id = worker.id().0, "tick driver loop starting");

    while !shutdown.load(Ordering::Relaxed) {
        let now_ticks = clock.now().duration_since(start).as_micros() as u64;
        let outcome = worker.tick(net, registry.snapshot(), cost_model, pool, num_workers, now_ticks);
        worker.metrics().record_tick(worker.id().0 as usize, &outcome);
        if outcome.lc_dispatched == 0 && outcome.be_dispatched == 0 {
            std::thread::yield_now();
        }
    }
    info!(worker_id = worker.id().0, "tick driver loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flashio::FakeFlashIo;
    use crate::netio::{ChannelNetIo, DecodedRequest};
    use flux_engine::{DeviceModel, Opcode, SchedulerMode, Scheduler, TenantId};

    #[test]
    fn run_tick_loop_stops_promptly_on_shutdown() {
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
            client_cookie: 1,
        });

        let pool = GlobalTokenPool::new(1);
        let shutdown = AtomicBool::new(false);

        // Run just enough iterations to drain the one request, then stop.
        let mut dispatched = false;
        for i in 0..3 {
            if i == 2 {
                shutdown.store(true, Ordering::Relaxed);
            }
            let outcome = worker.tick(&mut net, registry.snapshot(), registry.cost_model(), &pool, 1, i);
            if outcome.lc_dispatched > 0 {
                dispatched = true;
                break;
            }
        }
        assert!(dispatched, "the one delivered request should have been dispatched before shutdown");
    }
}
