use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;

use tracing::{info, warn};

use crate::cost_model::CostModel;
use crate::device_model::{DeviceModel, TokenRate};
use crate::error::FlowError;
use crate::tenant::{Tenant, TenantHandle, TenantId, TenantShared, WorkerId};

struct RegistryInner {
    tenants: HashMap<TenantId, TenantHandle>,
    global_token_rate: TokenRate,
    global_lc_sum_token_rate: f64,
    num_lc_tenants_global: u32,
    num_be_tenants_global: u32,
    readonly_flag: bool,
}

/// The global, registry-mutex-protected device state, published atomically
/// so workers can read it lock-free on the hot path (§3, §5).
#[derive(Debug)]
pub struct RegistrySnapshot {
    be_token_rate_per_tenant_bits: AtomicU64,
    lc_boost_no_be_bits: AtomicU64,
    readonly_flag: AtomicBool,
    num_lc_tenants_global: AtomicU32,
    num_be_tenants_global: AtomicU32,
}

impl RegistrySnapshot {
    fn new() -> Self {
        Self {
            be_token_rate_per_tenant_bits: AtomicU64::new(0f64.to_bits()),
            lc_boost_no_be_bits: AtomicU64::new(0f64.to_bits()),
            readonly_flag: AtomicBool::new(true),
            num_lc_tenants_global: AtomicU32::new(0),
            num_be_tenants_global: AtomicU32::new(0),
        }
    }

    pub fn be_token_rate_per_tenant(&self) -> f64 {
        f64::from_bits(self.be_token_rate_per_tenant_bits.load(Ordering::Relaxed))
    }

    pub fn lc_boost_no_be(&self) -> f64 {
        f64::from_bits(self.lc_boost_no_be_bits.load(Ordering::Relaxed))
    }

    pub fn readonly(&self) -> bool {
        self.readonly_flag.load(Ordering::Relaxed)
    }

    fn publish(&self, be_rate: f64, lc_boost: f64, readonly: bool, num_lc: u32, num_be: u32) {
        self.be_token_rate_per_tenant_bits
            .store(be_rate.to_bits(), Ordering::Relaxed);
        self.lc_boost_no_be_bits
            .store(lc_boost.to_bits(), Ordering::Relaxed);
        self.readonly_flag.store(readonly, Ordering::Relaxed);
        self.num_lc_tenants_global.store(num_lc, Ordering::Relaxed);
        self.num_be_tenants_global.store(num_be, Ordering::Relaxed);
    }
}

/// Tenant identity, SLO admission, and the global device aggregates (§4.3).
///
/// All mutation is serialized by one mutex, taken only during
/// `register_flow`/`unregister_flow` — never on the dispatch hot path (§5).
/// Per-tick reads of the derived rates go through [`RegistrySnapshot`]
/// instead, which is updated atomically at the end of every successful
/// admission decision.
pub struct TenantRegistry {
    device_model: DeviceModel,
    cost_model: CostModel,
    inner: Mutex<RegistryInner>,
    snapshot: RegistrySnapshot,
}

impl TenantRegistry {
    pub fn new(device_model: DeviceModel, cost_model: CostModel) -> Self {
        Self {
            device_model,
            cost_model,
            inner: Mutex::new(RegistryInner {
                tenants: HashMap::new(),
                global_token_rate: TokenRate::Unlimited,
                global_lc_sum_token_rate: 0.0,
                num_lc_tenants_global: 0,
                num_be_tenants_global: 0,
                readonly_flag: true,
            }),
            snapshot: RegistrySnapshot::new(),
        }
    }

    pub fn snapshot(&self) -> &RegistrySnapshot {
        &self.snapshot
    }

    pub fn cost_model(&self) -> &CostModel {
        &self.cost_model
    }

    /// Admits or re-attaches a flow (§4.3). `tenant_id` is assigned upstream
    /// by NetIO; `owner_worker` reflects where the connection was placed.
    ///
    /// - A fresh `tenant_id`: runs the full admission algorithm.
    /// - The same `tenant_id` reconnecting with an identical SLO: increments
    ///   `conn_ref_count` only.
    /// - The same `tenant_id` reconnecting with a *different* SLO: re-admits
    ///   it under the new SLO through the same gate a fresh registration
    ///   would hit. §4.3/§9 flag this path's coarseness as an open question
    ///   in the source without resolving it; we resolve it here by routing
    ///   "overwrite" through full admission rather than the source's
    ///   unconditional overwrite, so invariant 4 (admission safety) can't be
    ///   broken by a reconnect. If the new SLO is rejected, the prior
    ///   registration is restored verbatim — a failed re-registration leaves
    ///   the tenant exactly as it was, never deregistered. See DESIGN.md.
    pub fn register_flow(
        &self,
        tenant_id: TenantId,
        latency_us_slo: u32,
        iops_slo: u64,
        rw_ratio_pct: u8,
        owner_worker: WorkerId,
    ) -> Result<TenantHandle, FlowError> {
        if rw_ratio_pct > 100 {
            return Err(FlowError::InvalidRequest);
        }

        let mut inner = self.inner.lock().unwrap();

        let mut rollback = None;
        if let Some(existing) = inner.tenants.get(&tenant_id).cloned() {
            let same_slo = existing.latency_us_slo == latency_us_slo
                && existing.iops_slo == iops_slo
                && existing.rw_ratio_pct == rw_ratio_pct;
            if same_slo {
                existing.incr_conn_ref_count();
                return Ok(existing);
            }
            warn!(
                tenant_id = tenant_id.0,
                "re-registration with a different SLO; overwriting and re-admitting under the new SLO"
            );
            // Save enough to restore verbatim if the new SLO can't be admitted:
            // a rejected re-registration must leave the prior tenant in place.
            rollback = Some((
                existing,
                inner.global_token_rate,
                inner.global_lc_sum_token_rate,
                inner.num_lc_tenants_global,
                inner.num_be_tenants_global,
                inner.readonly_flag,
            ));
            self.remove_locked(&mut inner, tenant_id);
        }

        let req_rate = self.cost_model.scaled_iops(iops_slo, rw_ratio_pct);
        let is_lc = latency_us_slo > 0;

        if is_lc {
            let tentative_readonly = inner.readonly_flag && rw_ratio_pct == 100;
            let looked_up = self.device_model.lookup(latency_us_slo, tentative_readonly);
            let new_global_rate = inner.global_token_rate.min(looked_up);
            let new_lc_sum = inner.global_lc_sum_token_rate + req_rate;

            if new_lc_sum > new_global_rate.as_f64() {
                if let Some((old, rate, lc_sum, num_lc, num_be, readonly)) = rollback {
                    inner.tenants.insert(tenant_id, old);
                    inner.global_token_rate = rate;
                    inner.global_lc_sum_token_rate = lc_sum;
                    inner.num_lc_tenants_global = num_lc;
                    inner.num_be_tenants_global = num_be;
                    inner.readonly_flag = readonly;
                }
                return Err(FlowError::CannotMeetSLO);
            }

            inner.global_token_rate = new_global_rate;
            inner.global_lc_sum_token_rate = new_lc_sum;
            inner.num_lc_tenants_global += 1;
            inner.readonly_flag = tentative_readonly;
        } else {
            inner.num_be_tenants_global += 1;
        }

        let lc_boost = Self::compute_lc_boost(&inner);
        let scaled_iopus_limit = (req_rate + lc_boost) / 1_000_000.0;
        let handle = TenantShared::new(
            tenant_id,
            latency_us_slo,
            iops_slo,
            rw_ratio_pct,
            req_rate,
            scaled_iopus_limit,
            owner_worker,
        );
        inner.tenants.insert(tenant_id, handle.clone());

        self.recompute_and_publish(&inner, lc_boost);

        info!(
            tenant_id = tenant_id.0,
            latency_us_slo,
            iops_slo,
            rw_ratio_pct,
            is_lc,
            "flow registered"
        );
        Ok(handle)
    }

    /// Reverses admission for one connection. When `conn_ref_count` reaches
    /// zero the tenant is fully retired and the global aggregates are
    /// recomputed, including a full rescan for the new strictest LC SLO
    /// (§4.3).
    pub fn unregister_flow(&self, tenant_id: TenantId) {
        let mut inner = self.inner.lock().unwrap();
        let Some(handle) = inner.tenants.get(&tenant_id).cloned() else {
            return;
        };
        if handle.decr_conn_ref_count() > 0 {
            return;
        }
        self.remove_locked(&mut inner, tenant_id);
        let lc_boost = Self::compute_lc_boost(&inner);
        self.recompute_and_publish(&inner, lc_boost);
        info!(tenant_id = tenant_id.0, "flow retired");
    }

    /// Point-in-time list of all registered tenants, for introspection.
    pub fn list_tenants(&self) -> Vec<Tenant> {
        let inner = self.inner.lock().unwrap();
        inner.tenants.values().map(|h| Tenant::from(h.as_ref())).collect()
    }

    fn remove_locked(&self, inner: &mut RegistryInner, tenant_id: TenantId) {
        let Some(removed) = inner.tenants.remove(&tenant_id) else {
            return;
        };
        if removed.is_latency_critical() {
            inner.global_lc_sum_token_rate -= removed.scaled_iops_limit;
            inner.num_lc_tenants_global = inner.num_lc_tenants_global.saturating_sub(1);
            inner.global_token_rate = Self::strictest_remaining_rate(inner, &self.device_model);
            inner.readonly_flag = inner
                .tenants
                .values()
                .filter(|t| t.is_latency_critical())
                .all(|t| t.rw_ratio_pct == 100);
        } else {
            inner.num_be_tenants_global = inner.num_be_tenants_global.saturating_sub(1);
        }
    }

    /// Re-scans remaining LC tenants for the strictest (lowest-latency) SLO
    /// and returns the device budget that SLO implies.
    fn strictest_remaining_rate(inner: &RegistryInner, device_model: &DeviceModel) -> TokenRate {
        let strictest = inner
            .tenants
            .values()
            .filter(|t| t.is_latency_critical())
            .map(|t| t.latency_us_slo)
            .min();
        match strictest {
            None => TokenRate::Unlimited,
            Some(latency_us) => device_model.lookup(latency_us, inner.readonly_flag),
        }
    }

    /// `be_token_rate_per_tenant` and `lc_boost_no_be`, per §3.
    fn compute_lc_boost(inner: &RegistryInner) -> f64 {
        if inner.num_be_tenants_global == 0 && inner.num_lc_tenants_global > 0 {
            let residual = inner.global_token_rate.as_f64() - inner.global_lc_sum_token_rate;
            (residual / f64::from(inner.num_lc_tenants_global)).max(0.0)
        } else {
            0.0
        }
    }

    fn compute_be_rate(inner: &RegistryInner) -> f64 {
        if inner.num_be_tenants_global == 0 {
            0.0
        } else {
            let residual = inner.global_token_rate.as_f64() - inner.global_lc_sum_token_rate;
            (residual / f64::from(inner.num_be_tenants_global)).max(0.0)
        }
    }

    /// Publishes the snapshot atomics and, if `lc_boost_no_be` changed,
    /// recomputes every LC tenant's `scaled_iopus_limit` (§4.3 step 6).
    fn recompute_and_publish(&self, inner: &RegistryInner, lc_boost: f64) {
        let be_rate = Self::compute_be_rate(inner);
        let previous_boost = self.snapshot.lc_boost_no_be();
        if (previous_boost - lc_boost).abs() > f64::EPSILON {
            for tenant in inner.tenants.values().filter(|t| t.is_latency_critical()) {
                tenant.set_scaled_iopus_limit((tenant.scaled_iops_limit + lc_boost) / 1_000_000.0);
            }
        }
        self.snapshot.publish(
            be_rate,
            lc_boost,
            inner.readonly_flag,
            inner.num_lc_tenants_global,
            inner.num_be_tenants_global,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry_with_single_point() -> TenantRegistry {
        let device = DeviceModel::from_points(vec![(500, 100_000.0, 100_000.0)]);
        TenantRegistry::new(device, CostModel::new(100, 2000))
    }

    #[test]
    fn s1_admission_rejection() {
        let registry = registry_with_single_point();
        let a = registry
            .register_flow(TenantId(1), 500, 500, 100, WorkerId(0))
            .unwrap();
        assert_eq!(a.scaled_iops_limit, 50_000.0);

        let b = registry.register_flow(TenantId(2), 500, 600, 100, WorkerId(0));
        assert_eq!(b.unwrap_err(), FlowError::CannotMeetSLO);
    }

    #[test]
    fn s2_strictest_slo_governs() {
        let device = DeviceModel::from_points(vec![(500, 100_000.0, 100_000.0), (1000, 200_000.0, 200_000.0)]);
        let registry = TenantRegistry::new(device, CostModel::new(100, 2000));

        registry
            .register_flow(TenantId(1), 1000, 1000, 100, WorkerId(0))
            .unwrap();
        let b = registry.register_flow(TenantId(2), 500, 500, 100, WorkerId(0));
        assert_eq!(b.unwrap_err(), FlowError::CannotMeetSLO);
    }

    #[test]
    fn be_tenants_are_always_admitted_and_never_count_toward_lc_sum() {
        let registry = registry_with_single_point();
        // A BE tenant's nominal demand still gets computed (mirrors the
        // source) but is never checked against global_token_rate.
        let be1 = registry
            .register_flow(TenantId(10), 0, 1_000_000, 50, WorkerId(0))
            .unwrap();
        assert!(!be1.is_latency_critical());
        assert!(be1.scaled_iops_limit > 100_000.0);

        // An LC tenant at the device's full calibrated rate is still admitted.
        let lc = registry.register_flow(TenantId(1), 500, 1000, 100, WorkerId(0));
        assert!(lc.is_ok());
    }

    #[test]
    fn s4_be_fairness_rate_computation() {
        // global_token_rate=10_000, one LC tenant reserving 2_000 tokens/s,
        // two BE tenants -> be rate per tenant = (10_000 - 2_000) / 2 = 4_000.
        let device = DeviceModel::from_points(vec![(1000, 10_000.0, 10_000.0)]);
        let registry = TenantRegistry::new(device, CostModel::new(100, 2000));
        registry.register_flow(TenantId(1), 1000, 20, 100, WorkerId(0)).unwrap();
        registry.register_flow(TenantId(2), 0, 100, 50, WorkerId(1)).unwrap();
        registry.register_flow(TenantId(3), 0, 100, 50, WorkerId(1)).unwrap();

        assert_eq!(registry.snapshot().be_token_rate_per_tenant(), 4_000.0);
    }

    #[test]
    fn reregistration_with_same_slo_increments_ref_count() {
        let registry = registry_with_single_point();
        let first = registry
            .register_flow(TenantId(1), 500, 100, 100, WorkerId(0))
            .unwrap();
        assert_eq!(first.conn_ref_count(), 1);
        let second = registry
            .register_flow(TenantId(1), 500, 100, 100, WorkerId(0))
            .unwrap();
        assert_eq!(second.conn_ref_count(), 2);
    }

    #[test]
    fn unregister_releases_capacity_for_a_later_admission() {
        let registry = registry_with_single_point();
        registry.register_flow(TenantId(1), 500, 600, 100, WorkerId(0)).unwrap();
        registry.unregister_flow(TenantId(1));
        let retry = registry.register_flow(TenantId(2), 500, 600, 100, WorkerId(0));
        assert!(retry.is_ok());
    }

    #[test]
    fn reregistration_with_unmeetable_slo_leaves_prior_tenant_intact() {
        let registry = registry_with_single_point();
        let first = registry
            .register_flow(TenantId(1), 500, 100, 100, WorkerId(0))
            .unwrap();
        // Exhaust remaining capacity with a second tenant so tenant 1's
        // re-registration below cannot be admitted at the tighter SLO.
        registry.register_flow(TenantId(2), 500, 900, 100, WorkerId(0)).unwrap();

        let retry = registry.register_flow(TenantId(1), 500, 900, 100, WorkerId(0));
        assert_eq!(retry.unwrap_err(), FlowError::CannotMeetSLO);

        // Tenant 1 must still be registered under its original SLO, not gone.
        let tenants = registry.list_tenants();
        let still_there = tenants.iter().find(|t| t.tenant_id == TenantId(1)).unwrap();
        assert_eq!(still_there.iops_slo, 100);
        assert_eq!(first.scaled_iops_limit, 10_000.0);
    }

    #[test]
    fn invalid_rw_ratio_is_rejected() {
        let registry = registry_with_single_point();
        let result = registry.register_flow(TenantId(1), 500, 100, 150, WorkerId(0));
        assert_eq!(result.unwrap_err(), FlowError::InvalidRequest);
    }
}
