//! `AdmissionService` (ambient, SPEC_FULL §2): wraps
//! [`flux_engine::TenantRegistry::register_flow`] — a synchronous decision —
//! as a `tower::Service<RegisterFlow>`, the same move `tower-shot::service`
//! makes for `Strategy::process()`: a plain function becomes a `Service` at
//! the boundary where a host needs to compose it with other `tower`
//! middleware (timeouts, load shedding, concurrency limits) rather than call
//! it directly.
//!
//! Admission never blocks (§4.3's algorithm is O(1) under the registry
//! mutex), so unlike `RateLimitService` there is no `sleep`/retry state
//! machine here: `poll_ready` is always immediately ready and `call` returns
//! an already-resolved future.

use std::future::{ready, Ready};
use std::sync::Arc;
use std::task::{Context, Poll};

use flux_engine::{TenantHandle, TenantId, TenantRegistry, WorkerId};
use tower::Service;

use crate::error::ControlError;
use crate::metrics::WorkerMetrics;

/// A decoded REG request (§6.1), translated from [`crate::wire::RegRequest`]
/// plus the `tenant_id`/`owner_worker` the control plane assigns.
#[derive(Debug, Clone, Copy)]
pub struct RegisterFlow {
    pub tenant_id: TenantId,
    pub latency_us_slo: u32,
    pub iops_slo: u64,
    pub rw_ratio_pct: u8,
    pub owner_worker: WorkerId,
}

/// A `tower::Service` facade over the registry's admission gate.
#[derive(Clone)]
pub struct AdmissionService {
    registry: Arc<TenantRegistry>,
    metrics: Arc<WorkerMetrics>,
}

impl AdmissionService {
    pub fn new(registry: Arc<TenantRegistry>, metrics: Arc<WorkerMetrics>) -> Self {
        Self { registry, metrics }
    }
}

impl Service<RegisterFlow> for AdmissionService {
    type Response = TenantHandle;
    type Error = ControlError;
    type Future = Ready<Result<TenantHandle, ControlError>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: RegisterFlow) -> Self::Future {
        let result = self
            .registry
            .register_flow(
                req.tenant_id,
                req.latency_us_slo,
                req.iops_slo,
                req.rw_ratio_pct,
                req.owner_worker,
            )
            .map_err(ControlError::from);
        if result.is_err() {
            self.metrics.record_admission_rejection();
        }
        ready(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flux_engine::{CostModel, DeviceModel};
    use tower::ServiceExt;

    #[tokio::test]
    async fn admits_a_flow_within_the_device_budget() {
        let device = DeviceModel::from_points(vec![(500, 100_000.0, 100_000.0)]);
        let registry = Arc::new(TenantRegistry::new(device, CostModel::fake()));
        let mut svc = AdmissionService::new(registry, Arc::new(WorkerMetrics::new()));

        let handle = svc
            .ready()
            .await
            .unwrap()
            .call(RegisterFlow {
                tenant_id: TenantId(1),
                latency_us_slo: 500,
                iops_slo: 500,
                rw_ratio_pct: 100,
                owner_worker: WorkerId(0),
            })
            .await
            .unwrap();
        assert_eq!(handle.scaled_iops_limit, 50_000.0);
    }

    #[tokio::test]
    async fn rejects_a_flow_that_would_overrun_the_budget() {
        let device = DeviceModel::from_points(vec![(500, 100_000.0, 100_000.0)]);
        let registry = Arc::new(TenantRegistry::new(device, CostModel::fake()));
        let metrics = Arc::new(WorkerMetrics::new());
        let mut svc = AdmissionService::new(registry, metrics.clone());

        svc.ready()
            .await
            .unwrap()
            .call(RegisterFlow {
                tenant_id: TenantId(1),
                latency_us_slo: 500,
                iops_slo: 500,
                rw_ratio_pct: 100,
                owner_worker: WorkerId(0),
            })
            .await
            .unwrap();

        let err = svc
            .ready()
            .await
            .unwrap()
            .call(RegisterFlow {
                tenant_id: TenantId(2),
                latency_us_slo: 500,
                iops_slo: 600,
                rw_ratio_pct: 100,
                owner_worker: WorkerId(0),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ControlError::CannotMeetSlo));
    }
}
