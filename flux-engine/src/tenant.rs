use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

/// Stable identifier assigned by the control plane (NetIO) at registration
/// time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TenantId(pub u64);

/// Identifies the single worker thread allowed to mutate a tenant's queue and
/// credit state (§5 — every tenant is owned by exactly one worker for its
/// lifetime).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkerId(pub usize);

/// Block I/O direction. The device's cost asymmetry (reads are cheap, writes
/// are expensive — typical ratios 1:20) is what makes the token currency
/// meaningful.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    Read,
    Write,
}

/// The mutable-but-lock-free slice of a tenant's state that the scheduler
/// reads on every tick: `scaled_iopus_limit` and `conn_ref_count`.
///
/// Everything else about a tenant is immutable after registration (§3). These
/// two fields are the documented exceptions — `conn_ref_count` moves
/// monotonically up then down as connections attach/detach, and
/// `scaled_iopus_limit` is recomputed for every LC tenant whenever
/// `lc_boost_no_be` changes (§4.3 step 6). Both changes originate from
/// [`crate::TenantRegistry`] under its registration mutex, but must be
/// *readable* by the owning worker every tick without taking that mutex
/// (§5 — "no locks on the hot path except admission"), hence the atomics
/// rather than a `Mutex<Tenant>`.
#[derive(Debug)]
pub struct TenantShared {
    pub tenant_id: TenantId,
    pub latency_us_slo: u32,
    pub iops_slo: u64,
    pub rw_ratio_pct: u8,
    /// Reserved token rate in tokens/second. Zero for best-effort tenants.
    /// Immutable after registration (unlike `scaled_iopus_limit`, this is
    /// never touched by the `lc_boost_no_be` recompute).
    pub scaled_iops_limit: f64,
    pub owner_worker: WorkerId,
    scaled_iopus_limit_bits: AtomicU64,
    conn_ref_count: AtomicU32,
    // TODO(LessV1): nothing computes this yet — `LessV1` falls back to
    // `LessV0` ordering (see SPEC_FULL.md §4 open question 3). Carried now
    // so a future smoothed weighted-share implementation has a field to
    // write into without another registry-wide layout change.
    smoothy_share_bits: AtomicU64,
}

/// A tenant's shared, hot-path-readable record. Cloning a `TenantHandle`
/// clones the `Arc`, not the state.
pub type TenantHandle = Arc<TenantShared>;

impl TenantShared {
    pub fn new(
        tenant_id: TenantId,
        latency_us_slo: u32,
        iops_slo: u64,
        rw_ratio_pct: u8,
        scaled_iops_limit: f64,
        scaled_iopus_limit: f64,
        owner_worker: WorkerId,
    ) -> TenantHandle {
        Arc::new(Self {
            tenant_id,
            latency_us_slo,
            iops_slo,
            rw_ratio_pct,
            scaled_iops_limit,
            owner_worker,
            scaled_iopus_limit_bits: AtomicU64::new(scaled_iopus_limit.to_bits()),
            conn_ref_count: AtomicU32::new(1),
            smoothy_share_bits: AtomicU64::new(0.0f64.to_bits()),
        })
    }

    pub fn is_latency_critical(&self) -> bool {
        self.latency_us_slo > 0
    }

    pub fn scaled_iopus_limit(&self) -> f64 {
        f64::from_bits(self.scaled_iopus_limit_bits.load(Ordering::Relaxed))
    }

    pub fn set_scaled_iopus_limit(&self, value: f64) {
        self.scaled_iopus_limit_bits
            .store(value.to_bits(), Ordering::Relaxed);
    }

    /// `LessV1`'s smoothed weighted share. Always `0.0` until that mode's
    /// ordering is implemented.
    pub fn smoothy_share(&self) -> f64 {
        f64::from_bits(self.smoothy_share_bits.load(Ordering::Relaxed))
    }

    pub fn set_smoothy_share(&self, value: f64) {
        self.smoothy_share_bits
            .store(value.to_bits(), Ordering::Relaxed);
    }

    pub fn conn_ref_count(&self) -> u32 {
        self.conn_ref_count.load(Ordering::Relaxed)
    }

    pub fn incr_conn_ref_count(&self) -> u32 {
        self.conn_ref_count.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Decrements the ref count, returning the new value. Zero means this
    /// tenant should be retired once its in-flight requests drain.
    pub fn decr_conn_ref_count(&self) -> u32 {
        self.conn_ref_count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |v| {
                Some(v.saturating_sub(1))
            })
            .unwrap()
            .saturating_sub(1)
    }
}

/// A point-in-time, owned copy of a tenant's state, for introspection
/// (the admin surface, tests, logging) where an `Arc` handle would be
/// awkward to serialize.
#[derive(Debug, Clone, PartialEq)]
pub struct Tenant {
    pub tenant_id: TenantId,
    pub latency_us_slo: u32,
    pub iops_slo: u64,
    pub rw_ratio_pct: u8,
    pub scaled_iops_limit: f64,
    pub scaled_iopus_limit: f64,
    pub owner_worker: WorkerId,
    pub conn_ref_count: u32,
    pub smoothy_share: f64,
}

impl Tenant {
    pub fn is_latency_critical(&self) -> bool {
        self.latency_us_slo > 0
    }
}

impl From<&TenantShared> for Tenant {
    fn from(shared: &TenantShared) -> Self {
        Tenant {
            tenant_id: shared.tenant_id,
            latency_us_slo: shared.latency_us_slo,
            iops_slo: shared.iops_slo,
            rw_ratio_pct: shared.rw_ratio_pct,
            scaled_iops_limit: shared.scaled_iops_limit,
            scaled_iopus_limit: shared.scaled_iopus_limit(),
            owner_worker: shared.owner_worker,
            conn_ref_count: shared.conn_ref_count(),
            smoothy_share: shared.smoothy_share(),
        }
    }
}
