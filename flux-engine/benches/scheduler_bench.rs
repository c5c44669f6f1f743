use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use quanta::Clock;

use flux_engine::{
    CostModel, DeviceModel, Dispatcher, Request, Scheduler, SchedulerMode, SoftwareQueueTable,
    TenantManager, TenantRegistry, WorkerId,
};

struct SinkDispatcher {
    room: usize,
    dispatched: u64,
}

impl Dispatcher for SinkDispatcher {
    fn has_room(&self) -> bool {
        self.dispatched < self.room as u64
    }
    fn dispatch(&mut self, request: Request) {
        black_box(request);
        self.dispatched += 1;
    }
}

fn build_worker(num_lc: u64, num_be: u64) -> (TenantManager, SoftwareQueueTable, TenantRegistry) {
    let device = DeviceModel::from_points(vec![(500, 10_000_000.0, 10_000_000.0)]);
    let registry = TenantRegistry::new(device, CostModel::new(100, 2000));
    let mut manager = TenantManager::new();
    let mut queues = SoftwareQueueTable::new();

    for id in 0..num_lc {
        let handle = registry
            .register_flow(flux_engine::TenantId(id), 500, 10_000, 80, WorkerId(0))
            .unwrap();
        manager.adopt(handle);
        manager.lc_active_mut().activate(flux_engine::TenantId(id));
        queues.create(flux_engine::TenantId(id), 4096);
        for i in 0..256 {
            queues
                .enqueue(Request {
                    tenant_id: flux_engine::TenantId(id),
                    opcode: flux_engine::Opcode::Read,
                    lba: i,
                    len_sectors: 8,
                    cost_tokens: 100,
                    payload_handle: 0,
                    client_cookie: i,
                    enqueue_ts: 0,
                })
                .unwrap();
        }
    }
    for id in num_lc..num_lc + num_be {
        let handle = registry
            .register_flow(flux_engine::TenantId(id), 0, 5_000, 50, WorkerId(0))
            .unwrap();
        manager.adopt(handle);
        manager.be_active_mut().activate(flux_engine::TenantId(id));
        queues.create(flux_engine::TenantId(id), 4096);
        for i in 0..256 {
            queues
                .enqueue(Request {
                    tenant_id: flux_engine::TenantId(id),
                    opcode: flux_engine::Opcode::Write,
                    lba: i,
                    len_sectors: 8,
                    cost_tokens: 2000,
                    payload_handle: 0,
                    client_cookie: i,
                    enqueue_ts: 0,
                })
                .unwrap();
        }
    }
    (manager, queues, registry)
}

fn bench_schedule_tick(c: &mut Criterion) {
    let mut group = c.benchmark_group("scheduler-tick");

    for &(num_lc, num_be) in &[(4u64, 4u64), (16, 16), (64, 64)] {
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("lc{num_lc}-be{num_be}")),
            &(num_lc, num_be),
            |b, &(num_lc, num_be)| {
                let pool = flux_engine::GlobalTokenPool::new(1);
                b.iter_batched(
                    || build_worker(num_lc, num_be),
                    |(mut manager, mut queues, registry)| {
                        let clock = Clock::new();
                        let mut scheduler = Scheduler::new(SchedulerMode::LessV0, clock, 20_000);
                        let mut dispatcher = SinkDispatcher { room: 64, dispatched: 0 };
                        scheduler.schedule(
                            &mut manager,
                            &mut queues,
                            registry.snapshot(),
                            &pool,
                            WorkerId(0),
                            1,
                            &mut dispatcher,
                        );
                        black_box(dispatcher.dispatched)
                    },
                    criterion::BatchSize::SmallInput,
                );
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_schedule_tick);
criterion_main!(benches);
