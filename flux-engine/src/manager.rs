use std::collections::HashMap;

use crate::active_ring::ActiveRing;
use crate::tenant::{TenantHandle, TenantId};

/// Per-worker tracker of which tenants currently have work, split into
/// latency-critical and best-effort rings (§3, §4.5), plus this worker's
/// cached [`TenantHandle`]s for lock-free reads of `scaled_iopus_limit` on
/// the dispatch hot path.
///
/// A tenant is owned by exactly one worker for its lifetime (§5), so each
/// worker holds its own `TenantManager`; there is no cross-worker sharing and
/// therefore no locking here. The "re-queue side-buffer" the data model calls
/// for is realized by [`ActiveRing`]'s persistent cursor: a sub-round that
/// stops mid-lap on a `BUSY` return snapshots the cursor at the tenant it
/// stopped on, and the next tick's lap resumes exactly there, which is the
/// same "reinsert after a pass" effect without a second buffer to keep in
/// sync.
#[derive(Debug, Default)]
pub struct TenantManager {
    lc_active: ActiveRing,
    be_active: ActiveRing,
    handles: HashMap<TenantId, TenantHandle>,
    num_lc_tenants: u32,
    num_be_tenants: u32,
}

impl TenantManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lc_active(&self) -> &ActiveRing {
        &self.lc_active
    }

    pub fn be_active(&self) -> &ActiveRing {
        &self.be_active
    }

    pub fn lc_active_mut(&mut self) -> &mut ActiveRing {
        &mut self.lc_active
    }

    pub fn be_active_mut(&mut self) -> &mut ActiveRing {
        &mut self.be_active
    }

    pub fn num_lc_tenants(&self) -> u32 {
        self.num_lc_tenants
    }

    pub fn num_be_tenants(&self) -> u32 {
        self.num_be_tenants
    }

    pub fn handle(&self, tenant_id: TenantId) -> Option<&TenantHandle> {
        self.handles.get(&tenant_id)
    }

    /// Registers a brand-new tenant with this worker (called once, at
    /// admission time, from the worker the connection was placed on). Does
    /// not activate it — activation happens on first enqueue.
    pub fn adopt(&mut self, handle: TenantHandle) {
        if handle.is_latency_critical() {
            self.num_lc_tenants += 1;
        } else {
            self.num_be_tenants += 1;
        }
        self.handles.insert(handle.tenant_id, handle);
    }

    /// Retires a tenant whose `conn_ref_count` reached zero.
    pub fn retire(&mut self, tenant_id: TenantId) {
        let Some(handle) = self.handles.remove(&tenant_id) else {
            return;
        };
        if handle.is_latency_critical() {
            self.lc_active.deactivate_many(&[tenant_id]);
            self.num_lc_tenants = self.num_lc_tenants.saturating_sub(1);
        } else {
            self.be_active.deactivate_many(&[tenant_id]);
            self.num_be_tenants = self.num_be_tenants.saturating_sub(1);
        }
    }

    /// Marks `tenant_id` active on enqueue (INACTIVE -> ACTIVE_LC/ACTIVE_BE,
    /// §4.5 state machine). Idempotent. No-op if this worker never adopted
    /// the tenant.
    pub fn activate(&mut self, tenant_id: TenantId) {
        let Some(handle) = self.handles.get(&tenant_id) else {
            return;
        };
        if handle.is_latency_critical() {
            self.lc_active.activate(tenant_id);
        } else {
            self.be_active.activate(tenant_id);
        }
    }
}
