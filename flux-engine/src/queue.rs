use std::collections::{HashMap, VecDeque};

use crate::error::FlowError;
use crate::tenant::{Opcode, TenantId};

/// Opaque identity for a request's payload buffer, owned by the runtime's
/// buffer pool. `flux-engine` never dereferences it.
pub type PayloadHandle = u64;

/// A single pending block I/O, queued on its tenant's [`SoftwareQueue`].
/// `cost_tokens` is frozen at enqueue time (§3) — it is never recomputed,
/// even if the tenant's rates change later.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Request {
    pub tenant_id: TenantId,
    pub opcode: Opcode,
    pub lba: u64,
    pub len_sectors: u32,
    pub cost_tokens: u64,
    pub payload_handle: PayloadHandle,
    pub client_cookie: u64,
    pub enqueue_ts: u64,
}

/// One tenant's bounded FIFO plus its credit/demand/saved-tokens scalars
/// (§3, §4.4).
///
/// Invariants maintained by every mutator in this type:
/// - `saved_tokens <= total_token_demand`
/// - `total_token_demand == sum(cost_tokens for pending requests)`
#[derive(Debug)]
pub struct SoftwareQueue {
    capacity: usize,
    requests: VecDeque<Request>,
    total_token_demand: u64,
    /// Best-effort only: leftover tokens carried forward across ticks,
    /// capped by current demand.
    saved_tokens: u64,
    /// Latency-critical only: signed token account. Positive means the
    /// tenant may dispatch without fresh tokens; negative means it is
    /// running on a bounded loan, floored at `-token_deficit_limit`.
    token_credit: i64,
}

impl SoftwareQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            requests: VecDeque::new(),
            total_token_demand: 0,
            saved_tokens: 0,
            token_credit: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn total_token_demand(&self) -> u64 {
        self.total_token_demand
    }

    pub fn saved_tokens(&self) -> u64 {
        self.saved_tokens
    }

    pub fn token_credit(&self) -> i64 {
        self.token_credit
    }

    pub fn set_token_credit(&mut self, credit: i64) {
        self.token_credit = credit;
    }

    pub fn add_token_credit(&mut self, delta: i64) {
        self.token_credit += delta;
    }

    /// Enqueues `req`, failing with [`FlowError::NoSpace`] if the ring is
    /// full. The caller (the `NetIo` collaborator, in the runtime) must apply
    /// backpressure on that error.
    pub fn enqueue(&mut self, req: Request) -> Result<(), FlowError> {
        if self.requests.len() >= self.capacity {
            return Err(FlowError::NoSpace);
        }
        self.total_token_demand += req.cost_tokens;
        self.requests.push_back(req);
        Ok(())
    }

    /// Cost of the request at the head of the queue, for best-effort budget
    /// gating (`peek_head_cost` in §4.4). Zero when empty.
    pub fn peek_head_cost(&self) -> u64 {
        self.requests.front().map(|r| r.cost_tokens).unwrap_or(0)
    }

    pub fn pop_front(&mut self) -> Option<Request> {
        let req = self.requests.pop_front()?;
        self.total_token_demand -= req.cost_tokens;
        Some(req)
    }

    /// Best-effort only. Increases `saved_tokens` by up to
    /// `min(n, total_token_demand - saved_tokens)`, returning the amount
    /// actually absorbed; the rest should be returned to the caller (and
    /// ultimately to the global leftover pool) — this is the invariant
    /// enforcer that stops an idle BE tenant from hoarding credit.
    pub fn save_tokens(&mut self, n: u64) -> u64 {
        let room = self.total_token_demand.saturating_sub(self.saved_tokens);
        let absorbed = n.min(room);
        self.saved_tokens += absorbed;
        absorbed
    }

    /// Returns and zeroes `saved_tokens`.
    pub fn take_saved_tokens(&mut self) -> u64 {
        std::mem::take(&mut self.saved_tokens)
    }
}

/// Per-worker table of software queues, one per tenant owned by this worker.
///
/// Keyed by tenant id rather than a bitmap-indexed parallel array (§9):
/// a dense array with a generation counter would out-perform this for a
/// fixed, small tenant cardinality, but a tenant population that can churn
/// arbitrarily (connections come and go) is a better fit for a map than for
/// hand-rolled slot reuse.
#[derive(Debug, Default)]
pub struct SoftwareQueueTable {
    queues: HashMap<TenantId, SoftwareQueue>,
}

impl SoftwareQueueTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&mut self, tenant_id: TenantId, capacity: usize) {
        self.queues.insert(tenant_id, SoftwareQueue::new(capacity));
    }

    pub fn remove(&mut self, tenant_id: TenantId) {
        self.queues.remove(&tenant_id);
    }

    pub fn get(&self, tenant_id: TenantId) -> Option<&SoftwareQueue> {
        self.queues.get(&tenant_id)
    }

    pub fn get_mut(&mut self, tenant_id: TenantId) -> Option<&mut SoftwareQueue> {
        self.queues.get_mut(&tenant_id)
    }

    pub fn enqueue(&mut self, req: Request) -> Result<(), FlowError> {
        self.queues
            .get_mut(&req.tenant_id)
            .ok_or(FlowError::UnknownTenant)?
            .enqueue(req)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(tenant_id: u64, cost: u64) -> Request {
        Request {
            tenant_id: TenantId(tenant_id),
            opcode: Opcode::Read,
            lba: 0,
            len_sectors: 8,
            cost_tokens: cost,
            payload_handle: 0,
            client_cookie: 0,
            enqueue_ts: 0,
        }
    }

    #[test]
    fn queue_integrity_after_enqueue_dequeue() {
        let mut q = SoftwareQueue::new(4);
        q.enqueue(req(1, 100)).unwrap();
        q.enqueue(req(1, 200)).unwrap();
        assert_eq!(q.total_token_demand(), 300);
        let popped = q.pop_front().unwrap();
        assert_eq!(popped.cost_tokens, 100);
        assert_eq!(q.total_token_demand(), 200);
    }

    #[test]
    fn enqueue_fails_with_no_space_when_full() {
        let mut q = SoftwareQueue::new(1);
        q.enqueue(req(1, 1)).unwrap();
        assert_eq!(q.enqueue(req(1, 1)), Err(FlowError::NoSpace));
    }

    #[test]
    fn saved_tokens_never_exceeds_demand() {
        let mut q = SoftwareQueue::new(4);
        q.enqueue(req(1, 100)).unwrap();
        let absorbed = q.save_tokens(500);
        assert_eq!(absorbed, 100);
        assert_eq!(q.saved_tokens(), 100);
        more_asserts::assert_le!(q.saved_tokens(), q.total_token_demand());
    }

    #[test]
    fn take_saved_tokens_zeroes_the_account() {
        let mut q = SoftwareQueue::new(4);
        q.enqueue(req(1, 100)).unwrap();
        q.save_tokens(50);
        assert_eq!(q.take_saved_tokens(), 50);
        assert_eq!(q.saved_tokens(), 0);
    }

    #[test]
    fn peek_head_cost_is_zero_when_empty() {
        let q = SoftwareQueue::new(4);
        assert_eq!(q.peek_head_cost(), 0);
    }
}
