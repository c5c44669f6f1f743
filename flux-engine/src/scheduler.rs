use crossbeam_utils::CachePadded;
use quanta::{Clock, Instant};

use crate::manager::TenantManager;
use crate::queue::{Request, SoftwareQueueTable};
use crate::registry::RegistrySnapshot;
use crate::tenant::{TenantId, WorkerId};
use crate::token_pool::GlobalTokenPool;
use crate::TOKEN_FRAC_GIVEAWAY;

/// The host's two collaborator seams reduced to exactly what the scheduler
/// needs on the hot path: "is there room to submit?" and "submit this."
/// `flux-runtime`'s `DispatchShim` implements this over the real `FlashIo`
/// collaborator; tests implement it directly.
pub trait Dispatcher {
    fn has_room(&self) -> bool;
    fn dispatch(&mut self, request: Request);
}

/// Scheduler mode selector (§6.3). All modes share sub-round 2 verbatim and
/// differ only in sub-round-1 ordering (§9).
///
/// `Wfq` and `Wdrr` are declared-but-empty in the source and stay that way
/// here: accepted as configuration, scheduled identically to `LessV0`.
/// `LessV1`'s "smoothy share" ordering is unimplemented upstream; until it
/// is, it also falls back to `LessV0`'s round-robin-with-credit ordering —
/// [`crate::tenant::TenantShared`] still carries the `smoothy_share` field a
/// future implementation would read. `LessV2` is equally unspecified
/// upstream and gets the same treatment. `Reflex`/`ReflexRr` are the
/// variants closest to `LessV0` itself (strict round robin vs. round robin
/// with a fairness-to-late-joiners adjustment. they are not distinguished
/// here; both run the `LessV0` ordering).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerMode {
    Reflex,
    ReflexRr,
    Wfq,
    Wdrr,
    LessV0,
    LessV1,
    LessV2,
}

/// Per-tick dispatch counts, for tests and observability.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickOutcome {
    pub lc_dispatched: u32,
    pub be_dispatched: u32,
    /// Sub-round 1 hit `FlashIo` capacity and returned early (§4.5).
    pub lc_busy: bool,
    /// Tokens handed to the global pool this tick (sub-round 2 end-of-round
    /// surplus, or the whole-leftover donate when local demand was zero).
    pub donated: u64,
    /// Tokens pulled from the global pool to cover local BE demand.
    pub acquired: u64,
}

/// The two-sub-round dispatch loop, run once per tick by one worker (§4.5).
///
/// Owns nothing about tenant identity or demand — those live in
/// [`TenantManager`] and [`SoftwareQueueTable`], passed in by the caller
/// (`flux-runtime`'s `TickDriver`) each tick, alongside the shared,
/// lock-free [`RegistrySnapshot`] and [`GlobalTokenPool`].
///
/// A process runs one `Scheduler` per pinned worker core; when these are held
/// in a `Vec<Scheduler>` indexed by core id, the hot timestamps below can land
/// on the same cache line as a neighboring worker's. `CachePadded` keeps each
/// worker's tick state off its neighbors' lines, the same concern
/// `seanchatmangpt-knhk/knhk-kernel` pads for its own per-core structures.
pub struct Scheduler {
    #[allow(dead_code)]
    mode: SchedulerMode,
    clock: Clock,
    last_sched_lc: CachePadded<Instant>,
    last_sched_be: CachePadded<Instant>,
    token_deficit_limit: i64,
    /// Worker-local leftover accumulated by sub-round 1's credit giveaway,
    /// consumed by the same tick's sub-round 2 (§4.5).
    local_leftover: CachePadded<u64>,
}

impl Scheduler {
    pub fn new(mode: SchedulerMode, clock: Clock, token_deficit_limit: i64) -> Self {
        let now = clock.now();
        Self {
            mode,
            clock,
            last_sched_lc: CachePadded::new(now),
            last_sched_be: CachePadded::new(now),
            token_deficit_limit,
            local_leftover: CachePadded::new(0),
        }
    }

    pub fn mode(&self) -> SchedulerMode {
        self.mode
    }

    /// Runs one full tick: sub-round 1 (LC), then sub-round 2 (BE), then
    /// reports this worker's tick as complete to the global pool's
    /// eventually-consistent reset protocol.
    #[allow(clippy::too_many_arguments)]
    pub fn schedule(
        &mut self,
        manager: &mut TenantManager,
        queues: &mut SoftwareQueueTable,
        registry: &RegistrySnapshot,
        pool: &GlobalTokenPool,
        worker: WorkerId,
        num_workers: usize,
        dispatcher: &mut impl Dispatcher,
    ) -> TickOutcome {
        let mut outcome = TickOutcome::default();
        self.run_subround1(manager, queues, dispatcher, &mut outcome);
        self.run_subround2(manager, queues, registry, pool, dispatcher, &mut outcome);
        pool.observe_tick_complete(worker, num_workers);
        outcome
    }

    fn run_subround1(
        &mut self,
        manager: &mut TenantManager,
        queues: &mut SoftwareQueueTable,
        dispatcher: &mut impl Dispatcher,
        outcome: &mut TickOutcome,
    ) {
        let now = self.clock.now();
        let delta_us = now.duration_since(*self.last_sched_lc).as_micros() as f64;
        *self.last_sched_lc = now;

        let order: Vec<TenantId> = manager.lc_active().iter_from_cursor().collect();
        let mut doomed = Vec::new();
        let mut local_leftover: u64 = 0;

        for tenant_id in order {
            let Some(handle) = manager.handle(tenant_id) else {
                continue;
            };
            let rate_per_us = handle.scaled_iopus_limit();
            let credit_grant = (rate_per_us * delta_us + 0.5) as i64;

            let Some(queue) = queues.get_mut(tenant_id) else {
                continue;
            };
            queue.add_token_credit(credit_grant);

            while !queue.is_empty() && queue.token_credit() > -self.token_deficit_limit {
                if !dispatcher.has_room() {
                    manager.lc_active_mut().set_cursor_to(tenant_id);
                    outcome.lc_busy = true;
                    *self.local_leftover = local_leftover;
                    return;
                }
                let req = queue.pop_front().expect("checked non-empty above");
                queue.add_token_credit(-(req.cost_tokens as i64));
                dispatcher.dispatch(req);
                outcome.lc_dispatched += 1;
            }

            let threshold = 3 * credit_grant;
            if queue.token_credit() > threshold {
                let excess = queue.token_credit() - threshold;
                let donate = (excess as f64 * TOKEN_FRAC_GIVEAWAY).round() as i64;
                local_leftover += donate as u64;
                queue.add_token_credit(-donate);
            }

            if queue.is_empty() && queue.token_credit() >= 0 {
                doomed.push(tenant_id);
            }
        }

        manager.lc_active_mut().deactivate_many(&doomed);
        *self.local_leftover = local_leftover;
    }

    fn run_subround2(
        &mut self,
        manager: &mut TenantManager,
        queues: &mut SoftwareQueueTable,
        registry: &RegistrySnapshot,
        pool: &GlobalTokenPool,
        dispatcher: &mut impl Dispatcher,
        outcome: &mut TickOutcome,
    ) {
        let now = self.clock.now();
        let delta_s = now.duration_since(*self.last_sched_be).as_secs_f64();
        *self.last_sched_be = now;

        let order: Vec<TenantId> = manager.be_active().iter_from_cursor().collect();

        let local_demand: u64 = order
            .iter()
            .filter_map(|id| queues.get(*id))
            .map(|q| q.total_token_demand().saturating_sub(q.saved_tokens()))
            .sum();
        let local_leftover = std::mem::replace(&mut *self.local_leftover, 0);

        if local_leftover > 0 && local_demand == 0 {
            pool.donate(local_leftover);
            outcome.donated += local_leftover;
            return;
        }

        let mut be_budget = if local_leftover < local_demand {
            let acquired = pool.try_take(local_demand - local_leftover);
            outcome.acquired += acquired;
            local_leftover + acquired
        } else {
            local_leftover
        };

        let rate_per_tenant = registry.be_token_rate_per_tenant();

        let mut doomed = Vec::new();
        for tenant_id in &order {
            let Some(queue) = queues.get_mut(*tenant_id) else {
                continue;
            };
            be_budget += queue.take_saved_tokens();
            be_budget += (rate_per_tenant * delta_s + 0.5) as u64;

            while !queue.is_empty() && queue.peek_head_cost() <= be_budget && dispatcher.has_room() {
                let req = queue.pop_front().expect("checked non-empty above");
                be_budget -= req.cost_tokens;
                dispatcher.dispatch(req);
                outcome.be_dispatched += 1;
            }

            be_budget -= queue.save_tokens(be_budget);

            if queue.is_empty() {
                doomed.push(*tenant_id);
            }
        }

        manager.be_active_mut().deactivate_many(&doomed);
        manager.be_active_mut().advance_cursor();
        pool.donate(be_budget);
        outcome.donated += be_budget;
    }
}
