//! The `NetIo` collaborator seam (§1): "delivers decoded requests
//! `(tenant-id, opcode, lba, len, payload)` and accepts completions
//! `(cookie, status, payload)`; guarantees at-most-once delivery per
//! request."
//!
//! Modeled per §9's "control-plane callback fan-out" guidance as a typed
//! outbound channel carrying variant records, rather than calling directly
//! into "user-space" callbacks the way the source's `usys_nvme_*` functions
//! do.

use flux_engine::{Opcode, PayloadHandle, TenantId};

use crate::flashio::DeviceStatus;
use crate::wire::RegRespCode;

/// A request decoded off the wire by the network front-end, ready to be
/// frozen into a [`flux_engine::Request`] (cost assignment happens at
/// enqueue, not here — this type predates that step).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedRequest {
    pub tenant_id: TenantId,
    pub opcode: Opcode,
    pub lba: u64,
    pub len_sectors: u32,
    pub payload_handle: PayloadHandle,
    pub client_cookie: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionStatus {
    Ok,
    DeviceError(DeviceStatus),
}

/// Outbound event: `Completed` (a finished data-plane I/O), `Registered` (a
/// REG response), or `Closed` (connection teardown acknowledgment) — the
/// three variants §9 calls out in place of direct callback invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutboundEvent {
    Completed {
        client_cookie: u64,
        status: CompletionStatus,
        payload_handle: Option<PayloadHandle>,
        service_time_us: u32,
    },
    Registered {
        flow_handle: u64,
        resp_code: RegRespCode,
        tenant_id: Option<TenantId>,
    },
    Closed {
        tenant_id: TenantId,
    },
}

/// The collaborator seam the `TickDriver` (§4.7) drives once per tick:
/// "drain NetIO into queues" and "flush completions."
pub trait NetIo: Send {
    /// Pulls whatever decoded requests arrived since the last call.
    /// At-most-once delivery is NetIO's guarantee (§1) — `flux-runtime`
    /// never re-delivers or deduplicates here.
    fn drain_into_queues(&mut self) -> Vec<DecodedRequest>;
    /// Queues an outbound event for the next flush.
    fn enqueue_outbound(&mut self, event: OutboundEvent);
    /// Flushes all outbound events queued since the last flush.
    fn flush_responses(&mut self);
}

/// An in-process test double: decoded requests and outbound events both
/// travel through plain `Vec` buffers a test can push into / inspect,
/// mirroring `tower-shot::tests::MockService`'s role of standing in for a
/// real collaborator without any actual I/O.
#[derive(Debug, Default)]
pub struct ChannelNetIo {
    inbound: Vec<DecodedRequest>,
    outbound_pending: Vec<OutboundEvent>,
    outbound_flushed: Vec<OutboundEvent>,
}

impl ChannelNetIo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test/front-end hook: makes a decoded request available to the next
    /// `drain_into_queues` call.
    pub fn deliver(&mut self, request: DecodedRequest) {
        self.inbound.push(request);
    }

    /// Everything flushed so far, in flush order.
    pub fn flushed(&self) -> &[OutboundEvent] {
        &self.outbound_flushed
    }
}

impl NetIo for ChannelNetIo {
    fn drain_into_queues(&mut self) -> Vec<DecodedRequest> {
        std::mem::take(&mut self.inbound)
    }

    fn enqueue_outbound(&mut self, event: OutboundEvent) {
        self.outbound_pending.push(event);
    }

    fn flush_responses(&mut self) {
        self.outbound_flushed.append(&mut self.outbound_pending);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drain_returns_everything_delivered_since_last_drain() {
        let mut net = ChannelNetIo::new();
        net.deliver(DecodedRequest {
            tenant_id: TenantId(1),
            opcode: Opcode::Read,
            lba: 0,
            len_sectors: 8,
            payload_handle: 0,
            client_cookie: 7,
        });
        let drained = net.drain_into_queues();
        assert_eq!(drained.len(), 1);
        assert!(net.drain_into_queues().is_empty());
    }

    #[test]
    fn flush_moves_pending_to_flushed_in_order() {
        let mut net = ChannelNetIo::new();
        net.enqueue_outbound(OutboundEvent::Closed { tenant_id: TenantId(1) });
        net.enqueue_outbound(OutboundEvent::Closed { tenant_id: TenantId(2) });
        assert!(net.flushed().is_empty());
        net.flush_responses();
        assert_eq!(net.flushed().len(), 2);
    }
}
